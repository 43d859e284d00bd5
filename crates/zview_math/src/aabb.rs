use crate::Vec3;

/// Smallest extent kept on any axis, so flat content still has a volume.
const MIN_EXTENT: f32 = 1e-4;

/// Axis-aligned bounding box used to size the camera's view.
///
/// [`Aabb::EMPTY`] has inverted corners and contains nothing; it is the
/// identity for [`Aabb::surrounding`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    min: Vec3,
    max: Vec3,
}

impl Aabb {
    pub const EMPTY: Aabb = Aabb {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    /// Box spanned by two opposite corners, in any order.
    ///
    /// Zero-width axes are widened to a tiny extent.
    pub fn from_points(a: Vec3, b: Vec3) -> Self {
        let mut min = a.min(b);
        let mut max = a.max(b);

        let flat = (max - min).cmplt(Vec3::splat(MIN_EXTENT));
        let pad = Vec3::select(flat, Vec3::splat(MIN_EXTENT * 0.5), Vec3::ZERO);
        min -= pad;
        max += pad;

        Self { min, max }
    }

    /// Bound an arbitrary set of points. Returns `EMPTY` for no points.
    pub fn from_point_cloud<'a>(points: impl IntoIterator<Item = &'a Vec3>) -> Self {
        let (min, max) = points.into_iter().fold(
            (Vec3::splat(f32::INFINITY), Vec3::splat(f32::NEG_INFINITY)),
            |(min, max), p| (min.min(*p), max.max(*p)),
        );

        if min.x > max.x {
            Self::EMPTY
        } else {
            Self::from_points(min, max)
        }
    }

    /// The box enclosing both inputs. Empty inputs contribute nothing.
    pub fn surrounding(a: &Aabb, b: &Aabb) -> Self {
        Self {
            min: a.min.min(b.min),
            max: a.max.max(b.max),
        }
    }

    /// Union of every box in the iterator (`EMPTY` if there are none).
    pub fn union_all<'a>(boxes: impl IntoIterator<Item = &'a Aabb>) -> Self {
        boxes
            .into_iter()
            .fold(Self::EMPTY, |acc, b| Self::surrounding(&acc, b))
    }

    /// True if the box contains no point.
    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    pub fn min(&self) -> Vec3 {
        self.min
    }

    pub fn max(&self) -> Vec3 {
        self.max
    }

    /// Extent along each axis; zero for an empty box.
    pub fn size(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            self.max - self.min
        }
    }

    pub fn centroid(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// The 8 corners, min corner first.
    pub fn corners(&self) -> [Vec3; 8] {
        let (lo, hi) = (self.min, self.max);
        [
            lo,
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            hi,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corners_in_any_order() {
        let aabb = Aabb::from_points(Vec3::new(10.0, 0.0, 10.0), Vec3::new(0.0, 10.0, 0.0));

        assert_eq!(aabb.min(), Vec3::ZERO);
        assert_eq!(aabb.max(), Vec3::splat(10.0));
        assert_eq!(aabb.corners()[0], Vec3::ZERO);
        assert_eq!(aabb.corners()[7], Vec3::splat(10.0));
    }

    #[test]
    fn test_surrounding() {
        let a = Aabb::from_points(Vec3::ZERO, Vec3::splat(5.0));
        let b = Aabb::from_points(Vec3::splat(3.0), Vec3::splat(10.0));
        let both = Aabb::surrounding(&a, &b);

        assert_eq!(both.min(), Vec3::ZERO);
        assert_eq!(both.max(), Vec3::splat(10.0));
    }

    #[test]
    fn test_union_all_of_nothing_is_empty() {
        let union = Aabb::union_all(std::iter::empty());
        assert!(union.is_empty());
        assert_eq!(union.size(), Vec3::ZERO);
    }

    #[test]
    fn test_union_all_ignores_empty_boxes() {
        let cube = Aabb::from_points(Vec3::splat(-1.0), Vec3::splat(1.0));
        let union = Aabb::union_all([&Aabb::EMPTY, &cube, &Aabb::EMPTY]);

        assert_eq!(union, cube);
        assert_eq!(union.size(), Vec3::splat(2.0));
        assert_eq!(union.centroid(), Vec3::ZERO);
    }

    #[test]
    fn test_from_point_cloud() {
        let points = [Vec3::new(1.0, -2.0, 0.5), Vec3::new(-3.0, 4.0, 0.0)];
        let aabb = Aabb::from_point_cloud(&points);

        assert_eq!(aabb.min(), Vec3::new(-3.0, -2.0, 0.0));
        assert_eq!(aabb.max(), Vec3::new(1.0, 4.0, 0.5));
        assert!(Aabb::from_point_cloud(&[]).is_empty());
    }

    #[test]
    fn test_flat_box_is_padded() {
        let aabb = Aabb::from_points(Vec3::ZERO, Vec3::new(1.0, 1.0, 0.0));

        assert!(aabb.size().z > 0.0);
        assert!(!aabb.is_empty());
        assert_eq!(aabb.size().x, 1.0);
    }
}
