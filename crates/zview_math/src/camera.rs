use glam::{Mat4, Vec3};

/// Perspective camera for 3D rendering.
///
/// Field of view is vertical and stored in degrees. The projection matrix is
/// cached: after changing `fov_y_degrees`, `aspect`, `near` or `far`, call
/// [`Camera::update_projection`] for the change to reach the renderer.
#[derive(Debug, Clone, Copy)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    projection: Mat4,
}

impl Camera {
    /// Create a new camera
    pub fn new(position: Vec3, target: Vec3, fov_y_degrees: f32, aspect: f32) -> Self {
        let mut camera = Self {
            position,
            target,
            up: Vec3::Y,
            fov_y_degrees,
            aspect,
            near: 0.25,
            far: 100.0,
            projection: Mat4::IDENTITY,
        };
        camera.update_projection();
        camera
    }

    /// Get the view matrix (world → camera space)
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// Projection matrix as of the last [`Camera::update_projection`].
    pub fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    /// Get the combined view-projection matrix
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection * self.view_matrix()
    }

    /// Recompute the projection from fov, aspect and clip planes.
    pub fn update_projection(&mut self) {
        self.projection = Mat4::perspective_rh(
            self.fov_y_degrees.to_radians(),
            self.aspect,
            self.near,
            self.far,
        );
    }

    /// Update aspect ratio (e.g., on window resize)
    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
    }

    /// Aspect ratio of a viewport, falling back to 1.0 for a zero height.
    pub fn aspect_for(width: u32, height: u32) -> f32 {
        if height == 0 {
            1.0
        } else {
            width as f32 / height as f32
        }
    }

    /// Distance between the camera and the point it looks at.
    pub fn distance(&self) -> f32 {
        self.position.distance(self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_creation() {
        let camera = Camera::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, 27.0, 16.0 / 9.0);

        assert_eq!(camera.position, Vec3::new(0.0, 0.0, 5.0));
        assert_eq!(camera.target, Vec3::ZERO);
        assert_eq!(camera.aspect, 16.0 / 9.0);
        assert!((camera.distance() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_view_matrix() {
        let camera = Camera::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, 27.0, 1.0);

        let view = camera.view_matrix();
        // Camera moved back
        assert!(view.w_axis.z < 0.0);
    }

    #[test]
    fn test_projection_is_cached_until_update() {
        let mut camera = Camera::new(Vec3::Z, Vec3::ZERO, 27.0, 1.0);
        let before = camera.projection_matrix();

        camera.set_aspect(2.0);
        assert_eq!(camera.projection_matrix(), before);

        camera.update_projection();
        let after = camera.projection_matrix();
        assert!((after.x_axis.x * 2.0 - before.x_axis.x).abs() < 1e-5);
    }

    #[test]
    fn test_aspect_for() {
        assert_eq!(Camera::aspect_for(1920, 1080), 1920.0 / 1080.0);
        assert_eq!(Camera::aspect_for(800, 0), 1.0);
    }
}
