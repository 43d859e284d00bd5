//! Conversion of parsed USD layers into a renderable [`Group`].
//!
//! The builder walks the prim hierarchy once, turning every transformable
//! prim with authored ops into a node of the group's transform hierarchy,
//! every mesh into a shared prototype and every placement of a mesh into an
//! instance. References are read through an [`AssetSource`] so the same code
//! serves USDZ packages and loose files on disk.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use zview_math::Mat4;

use crate::group::{Group, NodeId, DEFAULT_COLOR};
use crate::mesh::Mesh;
use crate::usd::archive::{parse_layer, resolve_asset_path, AssetSource};
use crate::usd::parser::ParseError;
use crate::usd::types::{UpAxis, UsdLayer, UsdMesh, UsdPointInstancer, UsdPrim, UsdReference};
use crate::xform::{XformOp, XformStack};

/// Errors that can occur during USD loading.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Invalid USDZ archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("USDZ package contains no USD layer")]
    NoLayer,

    #[error("Binary USD layers are not supported: {0}")]
    UnsupportedLayer(String),

    #[error("Unsupported file type: {0} (expected .usdz or .usda)")]
    UnsupportedFile(String),

    #[error("Missing asset: {0}")]
    MissingAsset(String),

    #[error("Layer is not valid UTF-8 text: {0}")]
    InvalidText(String),

    #[error("No geometry found in USD file")]
    NoGeometry,

    #[error("Target group no longer exists")]
    MissingGroup,
}

/// Result type for loading operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Build a [`Group`] from a parsed root layer.
///
/// `layer_path` is where the layer lives within `source`; references are
/// resolved relative to it. The returned group is evaluated at the stage's
/// start time code and still hidden.
///
/// # Example
///
/// ```ignore
/// use zview_core::usd::{build_group, UsdzArchive};
///
/// let mut archive = UsdzArchive::open("chair.usdz")?;
/// let (path, layer) = archive.root_layer()?;
/// let group = build_group(layer, &path, &mut archive, "chair")?;
/// ```
pub fn build_group(
    layer: UsdLayer,
    layer_path: &str,
    source: &mut dyn AssetSource,
    name: &str,
) -> LoadResult<Group> {
    let start_time = layer.metadata.start_time_code.unwrap_or(0.0);
    let up_axis = layer.metadata.up_axis;

    let root = LayerContext {
        path: layer_path.to_string(),
        layer: Arc::new(layer),
    };

    let mut builder = GroupBuilder::new(name, source, start_time);
    builder.layer_stack.push(root.path.clone());

    // Z-up stages are rotated into the viewer's Y-up frame
    let up_node = match up_axis {
        UpAxis::Y => None,
        UpAxis::Z => Some(builder.group.add_node(
            "upAxis",
            None,
            XformStack::from_static([XformOp::RotateX(-90.0)]),
        )),
    };

    let layer = Arc::clone(&root.layer);
    for prim in &layer.prims {
        builder.process_prim(prim, &root, up_node)?;
    }

    builder.finish(root.layer.metadata.start_time_code)
}

/// A layer being walked, with the path used to resolve its references.
#[derive(Clone)]
struct LayerContext {
    path: String,
    layer: Arc<UsdLayer>,
}

/// Internal builder for constructing a Group from USD prims.
struct GroupBuilder<'a> {
    group: Group,
    source: &'a mut dyn AssetSource,
    /// Map from "layer:prim path" to prototype ID
    prototype_map: HashMap<String, usize>,
    /// Parsed layers by resolved path
    layer_cache: HashMap<String, Arc<UsdLayer>>,
    /// Layers currently being expanded, for cycle detection
    layer_stack: Vec<String>,
    /// Time code used to flatten transforms inside instancer prototypes
    start_time: f64,
}

impl<'a> GroupBuilder<'a> {
    fn new(name: &str, source: &'a mut dyn AssetSource, start_time: f64) -> Self {
        Self {
            group: Group::new(name),
            source,
            prototype_map: HashMap::new(),
            layer_cache: HashMap::new(),
            layer_stack: Vec::new(),
            start_time,
        }
    }

    /// Process a USD prim recursively.
    fn process_prim(
        &mut self,
        prim: &UsdPrim,
        ctx: &LayerContext,
        parent: Option<NodeId>,
    ) -> LoadResult<()> {
        match prim {
            UsdPrim::Xform(xform) => {
                let node = self.node_for(&xform.name, parent, &xform.xform);
                for child in &xform.children {
                    self.process_prim(child, ctx, node)?;
                }
                Ok(())
            }
            UsdPrim::Mesh(mesh) => {
                let node = self.node_for(&mesh.name, parent, &mesh.xform);
                if let Some(proto_id) = self.prototype_for(mesh, ctx) {
                    self.group.add_instance(proto_id, node, Mat4::IDENTITY);
                }
                Ok(())
            }
            UsdPrim::PointInstancer(instancer) => {
                self.process_point_instancer(instancer, ctx, parent)
            }
            UsdPrim::Reference(reference) => self.process_reference(reference, ctx, parent),
            UsdPrim::Unknown(_) => Ok(()), // Skip unknown prims
        }
    }

    /// A node for a prim with authored ops; prims without ops share their parent's.
    fn node_for(&mut self, name: &str, parent: Option<NodeId>, xform: &XformStack) -> Option<NodeId> {
        if xform.is_empty() {
            parent
        } else {
            Some(self.group.add_node(name, parent, xform.clone()))
        }
    }

    /// Get (or create) the prototype for a mesh. Meshes without faces yield `None`.
    fn prototype_for(&mut self, usd_mesh: &UsdMesh, ctx: &LayerContext) -> Option<usize> {
        let key = format!("{}:{}", ctx.path, usd_mesh.path);
        if let Some(&id) = self.prototype_map.get(&key) {
            return Some(id);
        }

        let indices = usd_mesh.triangulate();
        if indices.is_empty() {
            log::warn!("Mesh {} has no renderable faces, skipping", usd_mesh.path);
            return None;
        }

        let mut mesh = Mesh::new(usd_mesh.points.clone(), indices, usd_mesh.normals.clone());
        mesh.ensure_normals();

        let color = usd_mesh.display_color.unwrap_or(DEFAULT_COLOR);
        let id = self
            .group
            .add_prototype(Arc::new(mesh), usd_mesh.name.clone(), color);
        self.prototype_map.insert(key, id);
        Some(id)
    }

    /// Process a PointInstancer prim.
    fn process_point_instancer(
        &mut self,
        instancer: &UsdPointInstancer,
        ctx: &LayerContext,
        parent: Option<NodeId>,
    ) -> LoadResult<()> {
        let node = self.node_for(&instancer.name, parent, &instancer.xform);

        // Each prototype slot flattens to one or more (prototype, offset) parts
        let mut slots: Vec<Vec<(usize, Mat4)>> = Vec::new();

        if instancer.prototypes.is_empty() {
            // No rel authored: inline mesh children stand in, in order
            for child in &instancer.children {
                slots.push(self.collect_parts(child, ctx, Mat4::IDENTITY)?);
            }
        } else {
            for proto_path in &instancer.prototypes {
                let prim = instancer
                    .children
                    .iter()
                    .find_map(|child| child.find(proto_path))
                    .or_else(|| ctx.layer.find(proto_path));

                match prim {
                    Some(prim) => slots.push(self.collect_parts(prim, ctx, Mat4::IDENTITY)?),
                    None => {
                        log::warn!("Could not resolve prototype path: {}", proto_path);
                        slots.push(Vec::new());
                    }
                }
            }
        }

        let mut skipped = 0usize;
        for i in 0..instancer.instance_count() {
            let slot = instancer.proto_indices.get(i).copied().unwrap_or(0);
            let parts = match usize::try_from(slot).ok().and_then(|s| slots.get(s)) {
                Some(parts) => parts,
                None => {
                    skipped += 1;
                    continue;
                }
            };

            let instance_matrix = instancer.instance_matrix(i);
            for &(proto_id, offset) in parts {
                self.group
                    .add_instance(proto_id, node, instance_matrix * offset);
            }
        }

        if skipped > 0 {
            log::warn!(
                "Instancer {} skipped {} points with invalid prototype indices",
                instancer.path,
                skipped
            );
        }

        Ok(())
    }

    /// Flatten a prototype subtree into meshes placed relative to its root.
    ///
    /// Transforms inside prototypes are taken at the start time code.
    fn collect_parts(
        &mut self,
        prim: &UsdPrim,
        ctx: &LayerContext,
        parent: Mat4,
    ) -> LoadResult<Vec<(usize, Mat4)>> {
        let local = prim
            .xform()
            .map(|xform| xform.matrix_at(self.start_time))
            .unwrap_or(Mat4::IDENTITY);
        let matrix = parent * local;

        let mut parts = Vec::new();
        match prim {
            UsdPrim::Mesh(mesh) => {
                if let Some(proto_id) = self.prototype_for(mesh, ctx) {
                    parts.push((proto_id, matrix));
                }
            }
            UsdPrim::Xform(xform) => {
                for child in &xform.children {
                    parts.extend(self.collect_parts(child, ctx, matrix)?);
                }
            }
            UsdPrim::Reference(reference) => {
                if let Some(target) = self.enter_reference(reference, ctx)? {
                    for root in reference_roots(reference, &target.layer) {
                        parts.extend(self.collect_parts(root, &target, matrix)?);
                    }
                    self.layer_stack.pop();
                }
                for child in &reference.children {
                    parts.extend(self.collect_parts(child, ctx, matrix)?);
                }
            }
            UsdPrim::PointInstancer(nested) => {
                log::warn!("Nested point instancer {} is not supported", nested.path);
            }
            UsdPrim::Unknown(_) => {}
        }

        Ok(parts)
    }

    /// Process a Reference prim by expanding the referenced layer under it.
    fn process_reference(
        &mut self,
        reference: &UsdReference,
        ctx: &LayerContext,
        parent: Option<NodeId>,
    ) -> LoadResult<()> {
        let node = self.node_for(&reference.name, parent, &reference.xform);

        if let Some(target) = self.enter_reference(reference, ctx)? {
            for root in reference_roots(reference, &target.layer) {
                self.process_prim(root, &target, node)?;
            }
            self.layer_stack.pop();
        }

        // Process any child overrides
        for child in &reference.children {
            self.process_prim(child, ctx, node)?;
        }

        Ok(())
    }

    /// Load the layer a reference points at and push it on the layer stack.
    ///
    /// Returns `None` (after logging) when the reference cannot be expanded:
    /// cycles, missing assets, binary layers. The caller must pop the stack
    /// after a `Some`.
    fn enter_reference(
        &mut self,
        reference: &UsdReference,
        ctx: &LayerContext,
    ) -> LoadResult<Option<LayerContext>> {
        if reference.asset_path.is_empty() {
            log::debug!("Reference {} has no asset path, skipping", reference.path);
            return Ok(None);
        }

        let path = resolve_asset_path(&ctx.path, &reference.asset_path);
        if self.layer_stack.contains(&path) {
            log::warn!("Reference cycle through {} at {}, skipping", path, reference.path);
            return Ok(None);
        }

        let layer = match self.load_layer(&path) {
            Ok(layer) => layer,
            Err(err @ (LoadError::MissingAsset(_) | LoadError::UnsupportedLayer(_))) => {
                log::warn!("Skipping reference {}: {}", reference.path, err);
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        self.layer_stack.push(path.clone());
        Ok(Some(LayerContext { path, layer }))
    }

    /// Parse a layer through the asset source, caching by path.
    fn load_layer(&mut self, path: &str) -> LoadResult<Arc<UsdLayer>> {
        if let Some(layer) = self.layer_cache.get(path) {
            return Ok(Arc::clone(layer));
        }

        let bytes = self.source.read_asset(path)?;
        let layer = Arc::new(parse_layer(path, &bytes)?);
        log::debug!("Loaded referenced layer {} ({} root prims)", path, layer.prims.len());

        self.layer_cache.insert(path.to_string(), Arc::clone(&layer));
        Ok(layer)
    }

    /// Finish building, evaluate at the first time code and return the Group.
    fn finish(mut self, start_time_code: Option<f64>) -> LoadResult<Group> {
        if self.group.prototypes.is_empty() || self.group.instances.is_empty() {
            return Err(LoadError::NoGeometry);
        }

        let start = start_time_code
            .or_else(|| self.group.time_range().map(|(start, _)| start))
            .unwrap_or(0.0);
        self.group.evaluate(start);

        log::info!(
            "Built group '{}': {} prototypes, {} instances, {} triangles{}",
            self.group.name,
            self.group.prototype_count(),
            self.group.instance_count(),
            self.group.total_triangle_count(),
            if self.group.is_animated() { " (animated)" } else { "" }
        );

        Ok(self.group)
    }
}

/// The prims a reference brings in from its target layer.
fn reference_roots<'l>(reference: &UsdReference, layer: &'l UsdLayer) -> Vec<&'l UsdPrim> {
    match &reference.target_prim_path {
        Some(target) => match layer.find(target) {
            Some(prim) => vec![prim],
            None => {
                log::warn!(
                    "Reference {} targets missing prim {}",
                    reference.path,
                    target
                );
                Vec::new()
            }
        },
        None => layer.default_roots(),
    }
}
