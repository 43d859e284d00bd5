//! Grouping node populated by a model loader.
//!
//! A [`Group`] holds shared prototypes (mesh + display color), a transform
//! hierarchy that may be animated, and the instances placing prototypes in
//! the world. This maps closely to a composed USD stage while remaining
//! renderer-agnostic.

use std::sync::Arc;

use rayon::prelude::*;
use zview_math::{Aabb, Mat4, Mat4Ext, Vec3};

use crate::mesh::Mesh;
use crate::xform::XformStack;

/// Color used when a mesh authors no display color.
pub const DEFAULT_COLOR: Vec3 = Vec3::new(0.5, 0.5, 0.5);

/// A prototype is a shared mesh that can be instanced.
///
/// This corresponds to a `UsdGeomMesh` in USD terminology.
#[derive(Clone, Debug)]
pub struct Prototype {
    /// Unique identifier within the group
    pub id: usize,

    /// Prototype name (from USD prim path)
    pub name: String,

    /// Shared mesh geometry
    pub mesh: Arc<Mesh>,

    /// Base color (linear RGB)
    pub color: Vec3,

    /// Local bounding box (from mesh)
    pub bounds: Aabb,
}

impl Prototype {
    /// Create a new prototype from a mesh.
    pub fn new(id: usize, name: String, mesh: Arc<Mesh>) -> Self {
        let bounds = mesh.bounds;
        Self {
            id,
            name,
            mesh,
            color: DEFAULT_COLOR,
            bounds,
        }
    }

    pub fn with_color(mut self, color: Vec3) -> Self {
        self.color = color;
        self
    }
}

/// Index of a node within its group.
pub type NodeId = usize;

/// A node of the transform hierarchy (an Xform, Mesh or PointInstancer prim).
#[derive(Clone, Debug)]
pub struct TransformNode {
    pub name: String,

    /// Parent node; always has a lower index than this node.
    pub parent: Option<NodeId>,

    /// Local transform ops
    pub xform: XformStack,
}

/// An instance of a prototype placed by a transform node.
///
/// This corresponds to a point in a `UsdGeomPointInstancer` or a
/// transformed `UsdGeomMesh`.
#[derive(Clone, Debug)]
pub struct Instance {
    /// Index of the prototype this instance references
    pub prototype_id: usize,

    /// Node whose world matrix places this instance (`None` = group root)
    pub node: Option<NodeId>,

    /// Fixed transform below the node (instancer point, prototype offset)
    pub offset: Mat4,

    /// Current world matrix, refreshed by [`Group::evaluate`].
    /// Kept whole so sheared hierarchies render as authored.
    pub world: Mat4,
}

impl Instance {
    /// Create a root-level instance of a prototype with a fixed matrix.
    pub fn new(prototype_id: usize, offset: Mat4) -> Self {
        Self {
            prototype_id,
            node: None,
            offset,
            world: offset,
        }
    }

    /// Get the 4x4 model matrix for this instance.
    pub fn model_matrix(&self) -> Mat4 {
        self.world
    }
}

/// Root grouping node for one loaded model.
#[derive(Clone, Debug, Default)]
pub struct Group {
    /// Group name (usually from the file name)
    pub name: String,

    /// Whether the renderer should draw this group
    pub visible: bool,

    /// Shared prototype definitions (meshes)
    pub prototypes: Vec<Arc<Prototype>>,

    /// Transform hierarchy, parents before children
    pub nodes: Vec<TransformNode>,

    /// Instances referencing prototypes
    pub instances: Vec<Instance>,
}

impl Group {
    /// Create an empty, hidden group.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a prototype and return its ID.
    pub fn add_prototype(&mut self, mesh: Arc<Mesh>, name: String, color: Vec3) -> usize {
        let id = self.prototypes.len();
        let prototype = Prototype::new(id, name, mesh).with_color(color);
        self.prototypes.push(Arc::new(prototype));
        id
    }

    /// Add a transform node. A parent that does not exist yet is ignored.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        parent: Option<NodeId>,
        xform: XformStack,
    ) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(TransformNode {
            name: name.into(),
            parent: parent.filter(|&p| p < id),
            xform,
        });
        id
    }

    /// Add an instance of a prototype under `node`.
    pub fn add_instance(&mut self, prototype_id: usize, node: Option<NodeId>, offset: Mat4) {
        self.instances.push(Instance {
            prototype_id,
            node,
            offset,
            world: offset,
        });
    }

    /// World matrix of every node at `time_code`.
    pub fn node_matrices(&self, time_code: f64) -> Vec<Mat4> {
        let mut worlds: Vec<Mat4> = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let local = node.xform.matrix_at(time_code);
            let world = match node.parent.and_then(|p| worlds.get(p)) {
                Some(parent) => *parent * local,
                None => local,
            };
            worlds.push(world);
        }
        worlds
    }

    /// Recompute every instance transform at `time_code`.
    pub fn evaluate(&mut self, time_code: f64) {
        let worlds = self.node_matrices(time_code);

        self.instances.par_iter_mut().for_each(|instance| {
            let base = instance
                .node
                .and_then(|n| worlds.get(n))
                .copied()
                .unwrap_or(Mat4::IDENTITY);
            instance.world = base * instance.offset;
        });
    }

    /// True if any node carries time samples.
    pub fn is_animated(&self) -> bool {
        self.nodes.iter().any(|node| node.xform.is_animated())
    }

    /// First and last time code sampled by any node.
    pub fn time_range(&self) -> Option<(f64, f64)> {
        self.nodes
            .iter()
            .filter_map(|node| node.xform.time_range())
            .reduce(|a, b| (a.0.min(b.0), a.1.max(b.1)))
    }

    /// Drop all content. The group itself stays allocated.
    pub fn clear(&mut self) {
        self.prototypes.clear();
        self.nodes.clear();
        self.instances.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Get total triangle count across all instances.
    pub fn total_triangle_count(&self) -> usize {
        self.instances
            .iter()
            .filter_map(|instance| self.prototypes.get(instance.prototype_id))
            .map(|proto| proto.mesh.triangle_count())
            .sum()
    }

    /// Get total instance count.
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Get prototype count.
    pub fn prototype_count(&self) -> usize {
        self.prototypes.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Compute the world-space bounding box of all instances as last evaluated.
    ///
    /// Returns `Aabb::EMPTY` for a group without content.
    pub fn world_bounds(&self) -> Aabb {
        let boxes: Vec<Aabb> = self
            .instances
            .iter()
            .filter_map(|instance| {
                let proto = self.prototypes.get(instance.prototype_id)?;
                Some(instance.model_matrix().transform_aabb(&proto.bounds))
            })
            .collect();

        Aabb::union_all(&boxes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xform::{AnimatedXformOp, XformOp};
    use zview_math::Quat;

    fn triangle() -> Arc<Mesh> {
        Arc::new(Mesh::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vec![0, 1, 2],
            None,
        ))
    }

    #[test]
    fn test_group_creation() {
        let mut group = Group::new("test");
        let proto_id = group.add_prototype(triangle(), "triangle".to_string(), DEFAULT_COLOR);
        assert_eq!(proto_id, 0);

        group.add_instance(proto_id, None, Mat4::IDENTITY);
        group.add_instance(proto_id, None, Mat4::from_translation(Vec3::X));

        assert!(!group.visible);
        assert_eq!(group.prototype_count(), 1);
        assert_eq!(group.instance_count(), 2);
        assert_eq!(group.total_triangle_count(), 2);
    }

    #[test]
    fn test_instance_keeps_fixed_matrix() {
        let offset = Mat4::from_scale_rotation_translation(
            Vec3::splat(2.0),
            Quat::from_rotation_y(std::f32::consts::FRAC_PI_4),
            Vec3::new(1.0, 2.0, 3.0),
        );
        let instance = Instance::new(0, offset);

        assert_eq!(instance.node, None);
        assert_eq!(instance.model_matrix(), offset);
    }

    #[test]
    fn test_sheared_hierarchy_is_not_decomposed() {
        // Non-uniform parent scale over a rotated child yields shear
        let mut group = Group::new("shear");
        let proto = group.add_prototype(triangle(), "tri".to_string(), DEFAULT_COLOR);
        let parent = group.add_node(
            "stretch",
            None,
            XformStack::from_static([XformOp::Scale(Vec3::new(4.0, 1.0, 1.0))]),
        );
        let child = group.add_node(
            "tilt",
            Some(parent),
            XformStack::from_static([XformOp::RotateZ(45.0)]),
        );
        group.add_instance(proto, Some(child), Mat4::IDENTITY);
        group.evaluate(0.0);

        let world = group.instances[0].model_matrix();
        let expected = Mat4::from_scale(Vec3::new(4.0, 1.0, 1.0))
            * Mat4::from_rotation_z(std::f32::consts::FRAC_PI_4);
        assert!(world.abs_diff_eq(expected, 1e-5));

        let h = std::f32::consts::FRAC_1_SQRT_2;
        let x = world.transform_point3(Vec3::X);
        let y = world.transform_point3(Vec3::Y);
        assert!((x - Vec3::new(4.0 * h, h, 0.0)).length() < 1e-4);
        assert!((y - Vec3::new(-4.0 * h, h, 0.0)).length() < 1e-4);
        // Basis vectors are no longer perpendicular
        assert!(x.dot(y).abs() > 1.0);
    }

    #[test]
    fn test_empty_group_bounds() {
        let group = Group::new("empty");
        assert!(group.world_bounds().is_empty());
        assert!(group.is_empty());
    }

    #[test]
    fn test_world_bounds_follow_node_chain() {
        let mut group = Group::new("chain");
        let proto = group.add_prototype(triangle(), "tri".to_string(), DEFAULT_COLOR);
        let root = group.add_node(
            "root",
            None,
            XformStack::from_static([XformOp::Translate(Vec3::new(10.0, 0.0, 0.0))]),
        );
        let child = group.add_node(
            "child",
            Some(root),
            XformStack::from_static([XformOp::Scale(Vec3::splat(2.0))]),
        );
        group.add_instance(proto, Some(child), Mat4::IDENTITY);
        group.evaluate(0.0);

        let bounds = group.world_bounds();
        assert!((bounds.min() - Vec3::new(10.0, 0.0, 0.0)).length() < 1e-3);
        assert!((bounds.max().x - 12.0).abs() < 1e-3);
        assert!((bounds.max().y - 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_evaluate_animated_node() {
        let mut group = Group::new("anim");
        let proto = group.add_prototype(triangle(), "tri".to_string(), DEFAULT_COLOR);

        let mut xform = XformStack::default();
        xform.push(
            AnimatedXformOp::from_samples(vec![
                (0.0, XformOp::Translate(Vec3::ZERO)),
                (10.0, XformOp::Translate(Vec3::new(0.0, 10.0, 0.0))),
            ])
            .unwrap(),
            false,
        );
        let node = group.add_node("mover", None, xform);
        group.add_instance(proto, Some(node), Mat4::from_translation(Vec3::X));

        assert!(group.is_animated());
        assert_eq!(group.time_range(), Some((0.0, 10.0)));

        group.evaluate(5.0);
        let t = group.instances[0].model_matrix().w_axis.truncate();
        assert!((t - Vec3::new(1.0, 5.0, 0.0)).length() < 1e-4);
    }

    #[test]
    fn test_clear_drops_content() {
        let mut group = Group::new("g");
        let proto = group.add_prototype(triangle(), "tri".to_string(), DEFAULT_COLOR);
        group.add_node("n", None, XformStack::default());
        group.add_instance(proto, None, Mat4::IDENTITY);

        group.clear();

        assert_eq!(group.prototype_count(), 0);
        assert_eq!(group.node_count(), 0);
        assert_eq!(group.name, "g");
    }

    #[test]
    fn test_missing_parent_is_ignored() {
        let mut group = Group::new("g");
        let id = group.add_node("orphan", Some(7), XformStack::default());
        assert_eq!(group.nodes[id].parent, None);
    }
}
