//! zview core - scene model, USDZ loading and load orchestration.
//!
//! This crate provides:
//!
//! - **Scene types**: `Scene`, `Group`, `Prototype`, `Instance`, `Mesh`
//! - **USD support**: USDZ archive access, USDA layer parsing, group building
//! - **Loading**: the `ModelLoader` seam, file intake and the `LoadOrchestrator`
//!
//! # Example
//!
//! ```ignore
//! use zview_core::{FileIntake, IntakeEvent, LoadOrchestrator, Scene, SceneSettings, UsdzLoader};
//!
//! let mut scene = Scene::bootstrap(&SceneSettings::default());
//! let mut orchestrator = LoadOrchestrator::new(UsdzLoader::new());
//! let mut intake = FileIntake::new();
//!
//! if let Some(file) = intake.handle(IntakeEvent::Dropped("chair.usdz".into())) {
//!     orchestrator.load_file(&mut scene, file);
//! }
//! orchestrator.poll(&mut scene, &mut camera, &mut controls);
//! ```

pub mod environment;
pub mod group;
pub mod intake;
pub mod loader;
pub mod mesh;
pub mod orchestrator;
pub mod scene;
pub mod usd;
pub mod xform;

// Re-export commonly used types
pub use environment::{EnvironmentError, EnvironmentMap};
pub use group::{Group, Instance, Prototype};
pub use intake::{FileIntake, IntakeEvent, SelectedFile};
pub use loader::{LoadedModel, ModelLoader, Timeline, UsdzLoader, UsdzModel};
pub use mesh::Mesh;
pub use orchestrator::{LoadOrchestrator, LoadOutcome};
pub use scene::{DirectionalLight, GroupId, HemisphereLight, LightRig, Scene, SceneSettings};
pub use usd::{LoadError, LoadResult};
pub use xform::{AnimatedXformOp, XformOp, XformStack};
