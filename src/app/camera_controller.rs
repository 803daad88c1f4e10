use winit::keyboard::KeyCode;

use crate::renderer::camera::Camera;

use super::input_queue::InputEvent;

/// Degrees of yaw/pitch applied per mouse-motion event.
const MOUSE_ROTATION_STEP_DEG: f32 = 0.8;
/// Translation applied per tick while a run state is held.
const RUN_TRANSLATION_STEP: f32 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    None,
    Positive,
    Negative,
}

impl RunState {
    fn from_pressed(pressed: bool, direction: RunState) -> Self {
        if pressed { direction } else { RunState::None }
    }
}

/// Turns drained input events into camera state: run states for held keys,
/// absolute yaw/pitch rebuilt on every mouse motion.
pub struct CameraController {
    forward_run: RunState,
    aside_run: RunState,
    yaw_deg: f32,
    pitch_deg: f32,
    prev_mouse: Option<(f32, f32)>,
    quit_requested: bool,
}

impl CameraController {
    pub fn new() -> Self {
        Self {
            forward_run: RunState::None,
            aside_run: RunState::None,
            yaw_deg: 0.0,
            pitch_deg: 0.0,
            prev_mouse: None,
            quit_requested: false,
        }
    }

    pub fn handle_event(&mut self, event: InputEvent, camera: &mut Camera) {
        match event {
            InputEvent::Quit => self.quit_requested = true,
            InputEvent::Key { code, pressed } => match code {
                KeyCode::KeyW => {
                    self.forward_run = RunState::from_pressed(pressed, RunState::Positive);
                }
                KeyCode::KeyS => {
                    self.forward_run = RunState::from_pressed(pressed, RunState::Negative);
                }
                KeyCode::KeyD => {
                    self.aside_run = RunState::from_pressed(pressed, RunState::Positive);
                }
                KeyCode::KeyA => {
                    self.aside_run = RunState::from_pressed(pressed, RunState::Negative);
                }
                KeyCode::Escape => {
                    if pressed {
                        self.quit_requested = true;
                    }
                }
                _ => {}
            },
            InputEvent::MouseMotion { x, y } => {
                if let Some((prev_x, prev_y)) = self.prev_mouse {
                    let delta_x = x - prev_x;
                    let delta_y = y - prev_y;

                    if delta_x < 0.0 {
                        self.yaw_deg += MOUSE_ROTATION_STEP_DEG;
                    } else if delta_x > 0.0 {
                        self.yaw_deg -= MOUSE_ROTATION_STEP_DEG;
                    }

                    if delta_y < 0.0 {
                        self.pitch_deg += MOUSE_ROTATION_STEP_DEG;
                    } else if delta_y > 0.0 {
                        self.pitch_deg -= MOUSE_ROTATION_STEP_DEG;
                    }

                    self.sync_orientation(camera);
                }
                self.prev_mouse = Some((x, y));
            }
            _ => {}
        }
    }

    /// Applies held run states once; called one time per loop tick.
    pub fn apply_run_states(&self, camera: &mut Camera) {
        match self.forward_run {
            RunState::None => {}
            RunState::Positive => camera.translate_forward(RUN_TRANSLATION_STEP),
            RunState::Negative => camera.translate_forward(-RUN_TRANSLATION_STEP),
        }

        match self.aside_run {
            RunState::None => {}
            RunState::Positive => camera.translate_aside(RUN_TRANSLATION_STEP),
            RunState::Negative => camera.translate_aside(-RUN_TRANSLATION_STEP),
        }
    }

    pub fn sync_orientation(&self, camera: &mut Camera) {
        camera.set_orientation(self.yaw_deg, self.pitch_deg);
    }

    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }
}

impl Default for CameraController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn key(code: KeyCode, pressed: bool) -> InputEvent {
        InputEvent::Key { code, pressed }
    }

    #[test]
    fn held_keys_translate_along_the_rotation_basis() {
        let mut controller = CameraController::new();
        let mut camera = Camera::new();

        controller.handle_event(key(KeyCode::KeyW, true), &mut camera);
        controller.apply_run_states(&mut camera);
        controller.apply_run_states(&mut camera);
        assert!(camera.view_translation().abs_diff_eq(
            Vec3::new(0.0, 0.0, 2.0 * RUN_TRANSLATION_STEP),
            1e-6
        ));

        controller.handle_event(key(KeyCode::KeyW, false), &mut camera);
        controller.apply_run_states(&mut camera);
        assert!(camera.view_translation().abs_diff_eq(
            Vec3::new(0.0, 0.0, 2.0 * RUN_TRANSLATION_STEP),
            1e-6
        ));
    }

    #[test]
    fn opposite_keys_flip_the_direction() {
        let mut controller = CameraController::new();
        let mut camera = Camera::new();

        controller.handle_event(key(KeyCode::KeyA, true), &mut camera);
        controller.apply_run_states(&mut camera);
        assert!(
            camera
                .view_translation()
                .abs_diff_eq(Vec3::new(-RUN_TRANSLATION_STEP, 0.0, 0.0), 1e-6)
        );
    }

    #[test]
    fn mouse_motion_rebuilds_orientation_from_deltas() {
        let mut controller = CameraController::new();
        let mut camera = Camera::new();

        // The first event only seeds the previous position.
        controller.handle_event(InputEvent::MouseMotion { x: 100.0, y: 100.0 }, &mut camera);
        assert!(camera.forward().abs_diff_eq(Vec3::Z, 1e-6));

        // Moving left turns by one fixed step.
        controller.handle_event(InputEvent::MouseMotion { x: 90.0, y: 100.0 }, &mut camera);
        let mut expected = Camera::new();
        expected.set_orientation(MOUSE_ROTATION_STEP_DEG, 0.0);
        assert!(camera.forward().abs_diff_eq(expected.forward(), 1e-6));

        // Moving down pitches by one fixed step on top of the yaw.
        controller.handle_event(InputEvent::MouseMotion { x: 90.0, y: 110.0 }, &mut camera);
        expected.set_orientation(MOUSE_ROTATION_STEP_DEG, -MOUSE_ROTATION_STEP_DEG);
        assert!(camera.forward().abs_diff_eq(expected.forward(), 1e-6));
    }

    #[test]
    fn escape_and_close_request_quit() {
        let mut controller = CameraController::new();
        let mut camera = Camera::new();

        assert!(!controller.quit_requested());
        controller.handle_event(key(KeyCode::Escape, true), &mut camera);
        assert!(controller.quit_requested());

        let mut controller = CameraController::new();
        controller.handle_event(InputEvent::Quit, &mut camera);
        assert!(controller.quit_requested());
    }
}
