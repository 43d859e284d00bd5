//! Math types for zview: bounding volumes, the perspective camera,
//! orbit controls and camera framing.

// Re-export glam for convenience
pub use glam::*;

mod aabb;
mod camera;
mod framing;
mod orbit;
mod transform;

pub use aabb::Aabb;
pub use camera::Camera;
pub use framing::{fit_camera_to_bounds, FitResult, DEFAULT_FIT_OFFSET};
pub use orbit::OrbitControls;
pub use transform::Mat4Ext;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3_operations() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(4.0, 5.0, 6.0);
        let c = a + b;
        assert_eq!(c, Vec3::new(5.0, 7.0, 9.0));
    }
}
