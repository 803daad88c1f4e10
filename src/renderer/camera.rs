use glam::{Mat4, Vec3};

/// Point-of-view state fed to the pipeline once per frame.
///
/// Projection, view rotation and view translation are kept as independent
/// pieces and recomposed on every call to [`Camera::view_projection`]. The
/// rotation is always rebuilt absolutely from yaw/pitch instead of being
/// accumulated, so repeated small updates do not drift.
pub struct Camera {
    projection: Mat4,
    view_rotation: Mat4,
    view_translation: Vec3,
}

impl Camera {
    pub fn new() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            view_rotation: Mat4::IDENTITY,
            view_translation: Vec3::ZERO,
        }
    }

    pub fn set_perspective(&mut self, near: f32, far: f32, fov_y_deg: f32, aspect_ratio: f32) {
        self.projection = Mat4::perspective_rh(fov_y_deg.to_radians(), aspect_ratio, near, far);
    }

    /// One model-view-projection matrix for the current state.
    pub fn view_projection(&self) -> Mat4 {
        self.projection
            * self.view_rotation.transpose()
            * Mat4::from_translation(-self.view_translation)
    }

    pub fn aside(&self) -> Vec3 {
        self.view_rotation.col(0).truncate()
    }

    pub fn up(&self) -> Vec3 {
        self.view_rotation.col(1).truncate()
    }

    pub fn forward(&self) -> Vec3 {
        self.view_rotation.col(2).truncate()
    }

    pub fn translate_forward(&mut self, factor: f32) {
        self.view_translation += self.forward() * factor;
    }

    pub fn translate_aside(&mut self, factor: f32) {
        self.view_translation += self.aside() * factor;
    }

    pub fn translate_up(&mut self, factor: f32) {
        self.view_translation += self.up() * factor;
    }

    /// Rebuilds the view rotation from absolute yaw and pitch angles:
    /// yaw about world up, then pitch about the yawed aside axis.
    pub fn set_orientation(&mut self, yaw_deg: f32, pitch_deg: f32) {
        let yaw = Mat4::from_axis_angle(Vec3::Y, yaw_deg.to_radians());
        let yawed_aside = yaw.transform_vector3(Vec3::X);
        let pitch = Mat4::from_axis_angle(yawed_aside, pitch_deg.to_radians());
        self.view_rotation = pitch * yaw;
    }

    pub fn view_translation(&self) -> Vec3 {
        self.view_translation
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composition_is_rebuilt_from_pieces() {
        let mut camera = Camera::new();
        camera.view_translation += Vec3::new(1.0, 2.0, 3.0);

        let expected = Mat4::from_translation(Vec3::new(-1.0, -2.0, -3.0));
        assert!(camera.view_projection().abs_diff_eq(expected, 1e-6));

        camera.set_perspective(0.1, 100.0, 90.0, 4.0 / 3.0);
        let expected = Mat4::perspective_rh(90f32.to_radians(), 4.0 / 3.0, 0.1, 100.0)
            * Mat4::from_translation(Vec3::new(-1.0, -2.0, -3.0));
        assert!(camera.view_projection().abs_diff_eq(expected, 1e-6));
    }

    #[test]
    fn translation_follows_rotation_basis() {
        let mut camera = Camera::new();
        camera.translate_forward(2.0);
        assert!(camera.view_translation().abs_diff_eq(Vec3::new(0.0, 0.0, 2.0), 1e-6));

        // After a quarter turn about world up the forward axis lands on +X
        // and the aside axis on -Z.
        camera.set_orientation(90.0, 0.0);
        assert!(camera.forward().abs_diff_eq(Vec3::new(1.0, 0.0, 0.0), 1e-5));
        assert!(camera.aside().abs_diff_eq(Vec3::new(0.0, 0.0, -1.0), 1e-5));
    }

    #[test]
    fn orientation_is_rederived_not_accumulated() {
        let mut a = Camera::new();
        let mut b = Camera::new();

        a.set_orientation(33.5, -12.25);
        for _ in 0..100 {
            b.set_orientation(33.5, -12.25);
        }

        assert_eq!(
            a.view_projection().to_cols_array(),
            b.view_projection().to_cols_array()
        );
    }

    #[test]
    fn zero_orientation_is_identity() {
        let mut camera = Camera::new();
        camera.set_orientation(0.0, 0.0);
        assert!(camera.view_projection().abs_diff_eq(Mat4::IDENTITY, 1e-6));
    }
}
