//! Camera framing: position the camera so a bounding box is fully visible.

use glam::Vec3;

use crate::{Aabb, Camera, OrbitControls};

/// Margin multiplier applied to the tight framing distance.
pub const DEFAULT_FIT_OFFSET: f32 = 1.5;

/// What a fit did, mostly for logging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitResult {
    pub distance: f32,
    pub center: Vec3,
    pub size: Vec3,
}

/// Frame `bounds` with `camera`, keeping the current viewing angle.
///
/// The camera moves along the line from its position to the controls' target
/// until the largest box dimension fits both vertically and horizontally, with
/// `fit_offset` of margin. Orbit max distance, target, near/far planes and the
/// projection matrix are all updated.
///
/// Degenerate boxes are not guarded against: an empty box produces non-finite
/// distances.
pub fn fit_camera_to_bounds(
    camera: &mut Camera,
    controls: &mut OrbitControls,
    bounds: &Aabb,
    fit_offset: f32,
) -> FitResult {
    let size = bounds.size();
    let center = bounds.centroid();

    let max_size = size.x.max(size.y).max(size.z);
    let fit_height_distance =
        max_size / (2.0 * (std::f32::consts::PI * camera.fov_y_degrees / 360.0).tan());
    let fit_width_distance = fit_height_distance / camera.aspect;
    let distance = fit_offset * fit_height_distance.max(fit_width_distance);

    // Camera sitting on its target has no viewing angle to keep; look down -Z.
    let direction = (controls.target - camera.position)
        .try_normalize()
        .unwrap_or(Vec3::NEG_Z)
        * distance;

    controls.max_distance = distance * 10.0;
    controls.target = center;

    camera.near = distance / 100.0;
    camera.far = distance * 100.0;
    camera.position = controls.target - direction;
    controls.sync(camera);
    camera.update_projection();

    FitResult {
        distance,
        center,
        size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_cube() -> Aabb {
        Aabb::from_points(Vec3::splat(-1.0), Vec3::splat(1.0))
    }

    fn expected_height_distance(max_size: f32, fov_degrees: f32) -> f32 {
        max_size / (2.0 * (fov_degrees.to_radians() / 2.0).tan())
    }

    #[test]
    fn test_fit_cube_square_viewport() {
        let mut camera = Camera::new(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, 27.0, 1.0);
        let mut controls = OrbitControls::default();

        let fit = fit_camera_to_bounds(&mut camera, &mut controls, &unit_cube(), DEFAULT_FIT_OFFSET);

        let height = expected_height_distance(2.0, 27.0);
        assert!((height - 4.165).abs() < 1e-2);
        assert!((fit.distance - 1.5 * height).abs() < 1e-4);
        assert!((controls.max_distance - 10.0 * fit.distance).abs() < 1e-3);
        assert!((camera.near - fit.distance / 100.0).abs() < 1e-6);
        assert!((camera.far - fit.distance * 100.0).abs() < 1e-2);
        assert_eq!(controls.target, Vec3::ZERO);
        assert_eq!(camera.target, Vec3::ZERO);
    }

    #[test]
    fn test_fit_keeps_viewing_angle() {
        let start = Vec3::new(3.0, 4.0, 5.0);
        let mut camera = Camera::new(start, Vec3::ZERO, 27.0, 1.0);
        let mut controls = OrbitControls::default();

        let fit = fit_camera_to_bounds(&mut camera, &mut controls, &unit_cube(), DEFAULT_FIT_OFFSET);

        let dir_before = start.normalize();
        let dir_after = (camera.position - controls.target).normalize();
        assert!((dir_before - dir_after).length() < 1e-5);
        assert!((camera.distance() - fit.distance).abs() < 1e-3);
    }

    #[test]
    fn test_fit_moves_target_to_box_center() {
        let mut camera = Camera::new(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, 27.0, 1.0);
        let mut controls = OrbitControls::default();
        let bounds = Aabb::from_points(Vec3::new(9.0, 0.0, -1.0), Vec3::new(11.0, 4.0, 1.0));

        let fit = fit_camera_to_bounds(&mut camera, &mut controls, &bounds, DEFAULT_FIT_OFFSET);

        assert_eq!(fit.center, Vec3::new(10.0, 2.0, 0.0));
        assert_eq!(controls.target, fit.center);
        // Looking straight down -Z from +Z
        assert!((camera.position - Vec3::new(10.0, 2.0, fit.distance)).length() < 1e-3);
    }

    #[test]
    fn test_narrow_viewport_backs_off() {
        let mut wide = Camera::new(Vec3::Z, Vec3::ZERO, 27.0, 2.0);
        let mut narrow = Camera::new(Vec3::Z, Vec3::ZERO, 27.0, 0.5);

        let wide_fit = fit_camera_to_bounds(
            &mut wide,
            &mut OrbitControls::default(),
            &unit_cube(),
            DEFAULT_FIT_OFFSET,
        );
        let narrow_fit = fit_camera_to_bounds(
            &mut narrow,
            &mut OrbitControls::default(),
            &unit_cube(),
            DEFAULT_FIT_OFFSET,
        );

        // Width distance only wins below aspect 1.0
        let height = expected_height_distance(2.0, 27.0) * DEFAULT_FIT_OFFSET;
        assert!((wide_fit.distance - height).abs() < 1e-4);
        assert!((narrow_fit.distance - height * 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let make = || {
            (
                Camera::new(Vec3::new(1.0, 1.0, 8.0), Vec3::ZERO, 27.0, 1.6),
                OrbitControls::default(),
            )
        };
        let bounds = Aabb::from_points(Vec3::new(-2.0, 0.0, -0.5), Vec3::new(2.0, 3.0, 0.5));

        let (mut cam_a, mut ctl_a) = make();
        let (mut cam_b, mut ctl_b) = make();
        let a = fit_camera_to_bounds(&mut cam_a, &mut ctl_a, &bounds, DEFAULT_FIT_OFFSET);
        let b = fit_camera_to_bounds(&mut cam_b, &mut ctl_b, &bounds, DEFAULT_FIT_OFFSET);

        assert_eq!(a, b);
        assert_eq!(cam_a.near, cam_b.near);
        assert_eq!(cam_a.far, cam_b.far);
        assert_eq!(cam_a.position, cam_b.position);
    }

    #[test]
    fn test_camera_on_target_falls_back_to_negative_z() {
        let mut camera = Camera::new(Vec3::ZERO, Vec3::ZERO, 27.0, 1.0);
        let mut controls = OrbitControls::default();

        let fit = fit_camera_to_bounds(&mut camera, &mut controls, &unit_cube(), DEFAULT_FIT_OFFSET);

        assert!(camera.position.is_finite());
        assert!((camera.position.z - fit.distance).abs() < 1e-4);
    }
}
