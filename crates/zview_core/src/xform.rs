//! Transform operations, optionally animated over time codes.
//!
//! These mirror USD xformOps: a prim's local matrix is the product of its
//! ops in `xformOpOrder`, each op either a constant or a set of time samples.

use zview_math::{Mat4, Quat, Vec3};

/// A single transform operation.
#[derive(Clone, Debug, PartialEq)]
pub enum XformOp {
    /// Translation (xformOp:translate)
    Translate(Vec3),

    /// Rotation in degrees around X axis
    RotateX(f32),

    /// Rotation in degrees around Y axis
    RotateY(f32),

    /// Rotation in degrees around Z axis
    RotateZ(f32),

    /// Euler rotation in degrees, X applied first
    RotateXYZ(Vec3),

    /// Orientation quaternion (xformOp:orient)
    Orient(Quat),

    /// Scale (uniform or non-uniform)
    Scale(Vec3),

    /// Full 4x4 transform matrix
    Transform(Mat4),
}

impl XformOp {
    /// Convert this operation to a transformation matrix.
    pub fn to_matrix(&self) -> Mat4 {
        match self {
            XformOp::Translate(t) => Mat4::from_translation(*t),
            XformOp::RotateX(deg) => Mat4::from_rotation_x(deg.to_radians()),
            XformOp::RotateY(deg) => Mat4::from_rotation_y(deg.to_radians()),
            XformOp::RotateZ(deg) => Mat4::from_rotation_z(deg.to_radians()),
            XformOp::RotateXYZ(euler) => {
                Mat4::from_rotation_z(euler.z.to_radians())
                    * Mat4::from_rotation_y(euler.y.to_radians())
                    * Mat4::from_rotation_x(euler.x.to_radians())
            }
            XformOp::Orient(q) => Mat4::from_quat(*q),
            XformOp::Scale(s) => Mat4::from_scale(*s),
            XformOp::Transform(m) => *m,
        }
    }

    /// Interpolate toward `other`. Mismatched op kinds hold `self`.
    pub fn lerp(&self, other: &XformOp, t: f32) -> XformOp {
        match (self, other) {
            (XformOp::Translate(a), XformOp::Translate(b)) => XformOp::Translate(a.lerp(*b, t)),
            (XformOp::RotateX(a), XformOp::RotateX(b)) => XformOp::RotateX(a + (b - a) * t),
            (XformOp::RotateY(a), XformOp::RotateY(b)) => XformOp::RotateY(a + (b - a) * t),
            (XformOp::RotateZ(a), XformOp::RotateZ(b)) => XformOp::RotateZ(a + (b - a) * t),
            (XformOp::RotateXYZ(a), XformOp::RotateXYZ(b)) => XformOp::RotateXYZ(a.lerp(*b, t)),
            (XformOp::Orient(a), XformOp::Orient(b)) => XformOp::Orient(a.slerp(*b, t)),
            (XformOp::Scale(a), XformOp::Scale(b)) => XformOp::Scale(a.lerp(*b, t)),
            (XformOp::Transform(a), XformOp::Transform(b)) => {
                let (sa, ra, ta) = a.to_scale_rotation_translation();
                let (sb, rb, tb) = b.to_scale_rotation_translation();
                XformOp::Transform(Mat4::from_scale_rotation_translation(
                    sa.lerp(sb, t),
                    ra.slerp(rb, t),
                    ta.lerp(tb, t),
                ))
            }
            _ => self.clone(),
        }
    }
}

/// An op value that is either constant or sampled at time codes.
#[derive(Clone, Debug, PartialEq)]
pub enum AnimatedXformOp {
    Static(XformOp),

    /// Samples sorted by time code.
    Sampled(Vec<(f64, XformOp)>),
}

impl AnimatedXformOp {
    /// Build a sampled op, sorting samples by time. A single sample collapses
    /// to a static op; no samples yields `None`.
    pub fn from_samples(mut samples: Vec<(f64, XformOp)>) -> Option<Self> {
        samples.sort_by(|a, b| a.0.total_cmp(&b.0));
        match samples.len() {
            0 => None,
            1 => samples.pop().map(|(_, op)| AnimatedXformOp::Static(op)),
            _ => Some(AnimatedXformOp::Sampled(samples)),
        }
    }

    pub fn is_animated(&self) -> bool {
        matches!(self, AnimatedXformOp::Sampled(_))
    }

    /// Value at `time`, held constant outside the sampled range and linearly
    /// interpolated between neighbouring samples.
    pub fn sample(&self, time: f64) -> XformOp {
        let samples = match self {
            AnimatedXformOp::Static(op) => return op.clone(),
            AnimatedXformOp::Sampled(samples) => samples,
        };

        let upper = samples.partition_point(|(t, _)| *t <= time);
        if upper == 0 {
            return samples[0].1.clone();
        }
        if upper == samples.len() {
            return samples[upper - 1].1.clone();
        }

        let (t0, a) = &samples[upper - 1];
        let (t1, b) = &samples[upper];
        let span = t1 - t0;
        if span <= f64::EPSILON {
            return a.clone();
        }
        a.lerp(b, ((time - t0) / span) as f32)
    }

    /// First and last sample time, if sampled.
    pub fn time_range(&self) -> Option<(f64, f64)> {
        match self {
            AnimatedXformOp::Static(_) => None,
            AnimatedXformOp::Sampled(samples) => {
                let first = samples.first()?.0;
                let last = samples.last()?.0;
                Some((first, last))
            }
        }
    }
}

/// One entry of an op stack, optionally inverted (`!invert!` in xformOpOrder).
#[derive(Clone, Debug, PartialEq)]
pub struct StackedOp {
    pub op: AnimatedXformOp,
    pub invert: bool,
}

/// Ordered list of ops composing a local transform.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct XformStack {
    pub ops: Vec<StackedOp>,
}

impl XformStack {
    /// A stack of constant ops applied in order.
    pub fn from_static(ops: impl IntoIterator<Item = XformOp>) -> Self {
        Self {
            ops: ops
                .into_iter()
                .map(|op| StackedOp {
                    op: AnimatedXformOp::Static(op),
                    invert: false,
                })
                .collect(),
        }
    }

    pub fn push(&mut self, op: AnimatedXformOp, invert: bool) {
        self.ops.push(StackedOp { op, invert });
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn is_animated(&self) -> bool {
        self.ops.iter().any(|entry| entry.op.is_animated())
    }

    /// Compose the local matrix at `time`.
    pub fn matrix_at(&self, time: f64) -> Mat4 {
        self.ops.iter().fold(Mat4::IDENTITY, |acc, entry| {
            let m = entry.op.sample(time).to_matrix();
            if entry.invert {
                acc * m.inverse()
            } else {
                acc * m
            }
        })
    }

    /// Union of the sampled ranges of every animated op.
    pub fn time_range(&self) -> Option<(f64, f64)> {
        self.ops
            .iter()
            .filter_map(|entry| entry.op.time_range())
            .reduce(|a, b| (a.0.min(b.0), a.1.max(b.1)))
    }
}
