// Transform utilities for Mat4
//
// glam::Mat4 already provides transform_point3() and inverse()

use glam::Mat4;

use crate::Aabb;

/// Extension trait for Mat4 to provide additional transform utilities
pub trait Mat4Ext {
    /// Transform an axis-aligned bounding box.
    /// Computes the bounding box of all 8 transformed corners.
    fn transform_aabb(&self, aabb: &Aabb) -> Aabb;
}

impl Mat4Ext for Mat4 {
    fn transform_aabb(&self, aabb: &Aabb) -> Aabb {
        if aabb.is_empty() {
            return Aabb::EMPTY;
        }

        let corners = aabb.corners().map(|c| self.transform_point3(c));
        Aabb::from_point_cloud(&corners)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_transform_aabb_translation() {
        let aabb = Aabb::from_points(Vec3::ZERO, Vec3::ONE);
        let moved = Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0)).transform_aabb(&aabb);

        assert!((moved.min().x - 2.0).abs() < 1e-5);
        assert!((moved.max().x - 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_transform_aabb_rotation_grows_box() {
        let aabb = Aabb::from_points(Vec3::splat(-1.0), Vec3::splat(1.0));
        let rotated =
            Mat4::from_rotation_y(std::f32::consts::FRAC_PI_4).transform_aabb(&aabb);

        let expected = 2.0_f32.sqrt();
        assert!((rotated.max().x - expected).abs() < 1e-4);
        assert!((rotated.max().y - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_transform_empty_stays_empty() {
        let moved = Mat4::from_scale(Vec3::splat(3.0)).transform_aabb(&Aabb::EMPTY);
        assert!(moved.is_empty());
    }
}
