//! Parsed USDA layer contents, kept close to the text and converted into a
//! [`Group`](crate::Group) by the loader.

use zview_math::{Mat4, Quat, Vec3};

use crate::xform::XformStack;

/// One prim as written in a layer.
#[derive(Clone, Debug)]
pub enum UsdPrim {
    /// `Xform` and `Scope`
    Xform(UsdXform),

    Mesh(UsdMesh),

    PointInstancer(UsdPointInstancer),

    /// A reference to another layer
    Reference(UsdReference),

    /// Any other prim type, by name
    Unknown(String),
}

impl UsdPrim {
    /// Full prim path, if the prim kind carries one.
    pub fn path(&self) -> Option<&str> {
        match self {
            UsdPrim::Xform(x) => Some(&x.path),
            UsdPrim::Mesh(m) => Some(&m.path),
            UsdPrim::PointInstancer(p) => Some(&p.path),
            UsdPrim::Reference(r) => Some(&r.path),
            UsdPrim::Unknown(_) => None,
        }
    }

    /// Local transform stack, if the prim kind carries one.
    pub fn xform(&self) -> Option<&XformStack> {
        match self {
            UsdPrim::Xform(x) => Some(&x.xform),
            UsdPrim::Mesh(m) => Some(&m.xform),
            UsdPrim::PointInstancer(p) => Some(&p.xform),
            UsdPrim::Reference(r) => Some(&r.xform),
            UsdPrim::Unknown(_) => None,
        }
    }

    /// Direct children.
    pub fn children(&self) -> &[UsdPrim] {
        match self {
            UsdPrim::Xform(x) => &x.children,
            UsdPrim::PointInstancer(p) => &p.children,
            UsdPrim::Reference(r) => &r.children,
            UsdPrim::Mesh(_) | UsdPrim::Unknown(_) => &[],
        }
    }

    /// Depth-first search for a prim by full path (or path suffix).
    pub fn find(&self, target_path: &str) -> Option<&UsdPrim> {
        if let Some(path) = self.path() {
            if path == target_path || path.ends_with(target_path) {
                return Some(self);
            }
        }
        self.children().iter().find_map(|child| child.find(target_path))
    }
}

/// A USD Reference (or payload) to another layer.
/// Syntax: `references = @path/to/file.usda@</PrimPath>`
#[derive(Clone, Debug, Default)]
pub struct UsdReference {
    /// Prim path in current file
    pub path: String,

    /// Prim name
    pub name: String,

    /// Path to the referenced layer (relative to the referencing layer)
    pub asset_path: String,

    /// Optional prim path within the referenced layer (e.g., "/Lucy")
    pub target_prim_path: Option<String>,

    /// Local transform applied to the reference
    pub xform: XformStack,

    /// Child prims (overrides or additional content)
    pub children: Vec<UsdPrim>,
}

/// A USD Xform (transform) prim.
#[derive(Clone, Debug, Default)]
pub struct UsdXform {
    /// Prim path (e.g., "/World/Model")
    pub path: String,

    /// Prim name (last component of path)
    pub name: String,

    /// xformOps in evaluation order
    pub xform: XformStack,

    /// Child prims
    pub children: Vec<UsdPrim>,
}

/// A USD Mesh prim.
#[derive(Clone, Debug, Default)]
pub struct UsdMesh {
    /// Prim path
    pub path: String,

    /// Prim name
    pub name: String,

    /// Vertex positions
    pub points: Vec<Vec3>,

    /// Vertex count of each face
    pub face_vertex_counts: Vec<i32>,

    /// Flattened point indices of all faces
    pub face_vertex_indices: Vec<i32>,

    /// Authored `normals`, per vertex or face-varying
    pub normals: Option<Vec<Vec3>>,

    /// First entry of `primvars:displayColor`, if authored
    pub display_color: Option<Vec3>,

    /// `orientation = "leftHanded"`
    pub left_handed: bool,

    /// Local transform
    pub xform: XformStack,
}

impl UsdMesh {
    /// Fan-triangulated index list.
    ///
    /// Faces with fewer than three corners or with out-of-range point
    /// indices are dropped; left-handed meshes have their winding flipped.
    pub fn triangulate(&self) -> Vec<u32> {
        let mut indices = Vec::new();
        let mut vertex_offset = 0usize;
        let point_count = self.points.len();

        for &count in &self.face_vertex_counts {
            let count = count.max(0) as usize;
            let end = vertex_offset + count;
            if end > self.face_vertex_indices.len() {
                log::warn!(
                    "Mesh {} has more face vertices than indices, truncating",
                    self.path
                );
                break;
            }
            if count < 3 {
                vertex_offset = end;
                continue;
            }

            let face = &self.face_vertex_indices[vertex_offset..end];
            let in_range = face
                .iter()
                .all(|&i| i >= 0 && (i as usize) < point_count);

            if in_range {
                // Fan triangulation: (0,1,2), (0,2,3), ... (0,n-2,n-1)
                for i in 1..(count - 1) {
                    let i0 = face[0] as u32;
                    let i1 = face[i] as u32;
                    let i2 = face[i + 1] as u32;
                    if self.left_handed {
                        indices.extend_from_slice(&[i0, i2, i1]);
                    } else {
                        indices.extend_from_slice(&[i0, i1, i2]);
                    }
                }
            }

            vertex_offset = end;
        }

        indices
    }
}

/// A USD PointInstancer prim.
#[derive(Clone, Debug, Default)]
pub struct UsdPointInstancer {
    /// Prim path
    pub path: String,

    /// Prim name
    pub name: String,

    /// `protoIndices`: the prototype slot of each instance
    pub proto_indices: Vec<i32>,

    /// Instance positions
    pub positions: Vec<Vec3>,

    /// `orientations`, one per instance when authored
    pub orientations: Option<Vec<Quat>>,

    /// `scales`, one per instance when authored
    pub scales: Option<Vec<Vec3>>,

    /// `prototypes` relationship targets
    pub prototypes: Vec<String>,

    /// Local transform
    pub xform: XformStack,

    /// Child prims, usually the prototype definitions
    pub children: Vec<UsdPrim>,
}

impl UsdPointInstancer {
    /// Local matrix of instance `index`; identity past the end.
    ///
    /// Missing or short `orientations`/`scales` arrays default per instance.
    pub fn instance_matrix(&self, index: usize) -> Mat4 {
        let Some(&translation) = self.positions.get(index) else {
            return Mat4::IDENTITY;
        };

        Mat4::from_scale_rotation_translation(
            per_instance(&self.scales, index).unwrap_or(Vec3::ONE),
            per_instance(&self.orientations, index).unwrap_or(Quat::IDENTITY),
            translation,
        )
    }

    pub fn instance_count(&self) -> usize {
        self.positions.len()
    }
}

fn per_instance<T: Copy>(values: &Option<Vec<T>>, index: usize) -> Option<T> {
    values.as_deref().and_then(|v| v.get(index)).copied()
}

/// Stage up axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UpAxis {
    #[default]
    Y,
    Z,
}

/// Layer header metadata (the parenthesised block after `#usda 1.0`).
#[derive(Clone, Debug, PartialEq)]
pub struct StageMetadata {
    pub up_axis: UpAxis,
    pub meters_per_unit: f64,
    pub default_prim: Option<String>,
    pub start_time_code: Option<f64>,
    pub end_time_code: Option<f64>,
    pub time_codes_per_second: f64,
}

impl Default for StageMetadata {
    fn default() -> Self {
        Self {
            up_axis: UpAxis::Y,
            meters_per_unit: 0.01,
            default_prim: None,
            start_time_code: None,
            end_time_code: None,
            time_codes_per_second: 24.0,
        }
    }
}

/// A parsed USDA layer: header metadata plus root prims.
#[derive(Clone, Debug, Default)]
pub struct UsdLayer {
    pub metadata: StageMetadata,
    pub prims: Vec<UsdPrim>,
}

impl UsdLayer {
    /// Find a prim anywhere in the layer by full path (or path suffix).
    pub fn find(&self, target_path: &str) -> Option<&UsdPrim> {
        self.prims.iter().find_map(|prim| prim.find(target_path))
    }

    /// The prims a reference without an explicit target brings in:
    /// the `defaultPrim` if it resolves, otherwise every root prim.
    pub fn default_roots(&self) -> Vec<&UsdPrim> {
        let default = self
            .metadata
            .default_prim
            .as_deref()
            .and_then(|name| {
                self.prims
                    .iter()
                    .find(|p| p.path().is_some_and(|path| path.trim_start_matches('/') == name))
            });

        match default {
            Some(prim) => vec![prim],
            None => self.prims.iter().collect(),
        }
    }
}
