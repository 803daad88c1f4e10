use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// One engine-facing input event, decoupled from the window backend's
/// delivery shape. The window handler enqueues; the orchestrator drains the
/// queue once per loop tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    Quit,
    Key { code: KeyCode, pressed: bool },
    MouseMotion { x: f32, y: f32 },
    MouseWheel { delta_y: f32 },
    MouseButton { button: MouseButton, pressed: bool },
    Resized { width: u32, height: u32 },
}

#[derive(Default)]
pub struct InputQueue {
    events: Vec<InputEvent>,
}

impl InputQueue {
    pub fn push(&mut self, event: InputEvent) {
        self.events.push(event);
    }

    pub fn push_window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.push(InputEvent::Quit),
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    self.push(InputEvent::Key {
                        code,
                        pressed: event.state == ElementState::Pressed,
                    });
                }
            }
            WindowEvent::CursorMoved { position, .. } => self.push(InputEvent::MouseMotion {
                x: position.x as f32,
                y: position.y as f32,
            }),
            WindowEvent::MouseWheel { delta, .. } => {
                let delta_y = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(position) => position.y as f32,
                };
                self.push(InputEvent::MouseWheel { delta_y });
            }
            WindowEvent::MouseInput { state, button, .. } => self.push(InputEvent::MouseButton {
                button: *button,
                pressed: *state == ElementState::Pressed,
            }),
            WindowEvent::Resized(size) => self.push(InputEvent::Resized {
                width: size.width,
                height: size.height,
            }),
            _ => {}
        }
    }

    pub fn drain(&mut self) -> impl Iterator<Item = InputEvent> + '_ {
        self.events.drain(..)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_preserves_order_and_empties_the_queue() {
        let mut queue = InputQueue::default();
        queue.push(InputEvent::MouseMotion { x: 1.0, y: 2.0 });
        queue.push(InputEvent::Key {
            code: KeyCode::KeyW,
            pressed: true,
        });
        queue.push(InputEvent::Quit);

        let drained = queue.drain().collect::<Vec<_>>();
        assert_eq!(
            drained,
            vec![
                InputEvent::MouseMotion { x: 1.0, y: 2.0 },
                InputEvent::Key {
                    code: KeyCode::KeyW,
                    pressed: true,
                },
                InputEvent::Quit,
            ]
        );

        assert_eq!(queue.drain().count(), 0);
    }
}
