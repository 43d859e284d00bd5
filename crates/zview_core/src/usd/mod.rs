//! USD (Universal Scene Description) support.
//!
//! This module reads USDZ packages and USDA (ASCII) layers and converts
//! them into a renderable [`Group`](crate::Group).
//!
//! ## Supported USD Features
//!
//! - `UsdGeomMesh`: polygon meshes with points, normals, `displayColor`
//! - `UsdGeomPointInstancer`: instanced geometry with per-point transforms
//! - `Xform` / `Scope`: transform hierarchies with xformOps and `xformOpOrder`
//! - xformOp `timeSamples` (linear interpolation)
//! - References and payloads, resolved inside the package or next to the layer
//! - Stage metadata: `upAxis`, `defaultPrim`, time code range
//!
//! ## Not Supported
//!
//! - Binary `.usdc` crate layers
//! - Materials and textures (`UsdShade`)
//! - Variants and other composition arcs

mod archive;
mod loader;
mod parser;
mod types;

pub use archive::*;
pub use loader::*;
pub use parser::*;
pub use types::*;
