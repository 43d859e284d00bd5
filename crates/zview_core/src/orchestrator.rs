//! Load orchestration: one load at a time, previous content torn down first,
//! camera framed on success, failures kept as a single display string.
//!
//! A load runs in two steps on the event-loop thread. [`LoadOrchestrator::load_file`]
//! tears down old content, attaches a fresh group and parks the request;
//! [`LoadOrchestrator::poll`] decodes it on the next turn of the loop so the
//! window can show the loading state in between.

use zview_math::{fit_camera_to_bounds, Camera, FitResult, OrbitControls, DEFAULT_FIT_OFFSET};

use crate::intake::SelectedFile;
use crate::loader::{LoadedModel, ModelLoader};
use crate::scene::{GroupId, Scene};

/// What a completed [`LoadOrchestrator::poll`] did.
#[derive(Clone, Debug, PartialEq)]
pub enum LoadOutcome {
    Loaded {
        file: String,
        /// `None` when the content had no extent to frame
        fit: Option<FitResult>,
    },
    Failed {
        file: String,
        error: String,
    },
}

/// A load waiting for the next poll.
#[derive(Debug)]
struct PendingLoad {
    file: SelectedFile,
    group: GroupId,
}

/// Owns the loader and everything it has loaded.
pub struct LoadOrchestrator<L: ModelLoader> {
    loader: L,
    models: Vec<L::Model>,
    loading: bool,
    content_visible: bool,
    error: Option<String>,
    pending: Option<PendingLoad>,
    current_file: Option<SelectedFile>,
    fit_offset: f32,
}

impl<L: ModelLoader> LoadOrchestrator<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            models: Vec::new(),
            loading: false,
            content_visible: false,
            error: None,
            pending: None,
            current_file: None,
            fit_offset: DEFAULT_FIT_OFFSET,
        }
    }

    /// Margin multiplier used when framing loaded content.
    pub fn with_fit_offset(mut self, fit_offset: f32) -> Self {
        self.fit_offset = fit_offset;
        self
    }

    /// Start loading `file`.
    ///
    /// Returns `false` without touching anything when a load is already in
    /// flight. Otherwise every loaded model is cleared and detached, a fresh
    /// group is attached, and the decode runs on the next [`poll`](Self::poll).
    pub fn load_file(&mut self, scene: &mut Scene, file: SelectedFile) -> bool {
        if self.loading {
            log::debug!("Load in progress, ignoring {}", file.name);
            return false;
        }

        self.loading = true;
        self.error = None;
        self.content_visible = false;

        for mut model in self.models.drain(..) {
            model.clear(scene);
            scene.remove_group(model.root());
        }

        let group = scene.add_group(file.name.clone());
        log::info!("Loading {}", file.path.display());

        self.current_file = Some(file.clone());
        self.pending = Some(PendingLoad { file, group });
        true
    }

    /// Run the pending decode, if any.
    pub fn poll(
        &mut self,
        scene: &mut Scene,
        camera: &mut Camera,
        controls: &mut OrbitControls,
    ) -> Option<LoadOutcome> {
        let PendingLoad { file, group } = self.pending.take()?;

        match self.loader.load(&file, scene, group) {
            Ok(model) => {
                if let Some(root) = scene.group_mut(model.root()) {
                    root.visible = true;
                }
                self.models.push(model);

                let fit = self.fit(scene, camera, controls);
                self.loading = false;
                self.content_visible = true;

                match &fit {
                    Some(fit) => log::info!(
                        "Loaded {} (framed at distance {:.3})",
                        file.name,
                        fit.distance
                    ),
                    None => log::info!("Loaded {}", file.name),
                }

                Some(LoadOutcome::Loaded {
                    file: file.name,
                    fit,
                })
            }
            Err(err) => {
                let message = err.to_string();
                log::error!("Failed to load {}: {}", file.name, message);

                scene.remove_group(group);
                self.error = Some(message.clone());
                self.loading = false;

                Some(LoadOutcome::Failed {
                    file: file.name,
                    error: message,
                })
            }
        }
    }

    /// Advance every loaded model's clock.
    pub fn update(&mut self, scene: &mut Scene, time_seconds: f64) {
        for model in &mut self.models {
            model.update(scene, time_seconds);
        }
    }

    /// Frame the current content again.
    pub fn refit(
        &self,
        scene: &Scene,
        camera: &mut Camera,
        controls: &mut OrbitControls,
    ) -> Option<FitResult> {
        self.fit(scene, camera, controls)
    }

    fn fit(
        &self,
        scene: &Scene,
        camera: &mut Camera,
        controls: &mut OrbitControls,
    ) -> Option<FitResult> {
        let roots: Vec<GroupId> = self.models.iter().map(|model| model.root()).collect();
        let bounds = scene.union_bounds(&roots);

        if bounds.is_empty() {
            log::warn!("Loaded content has no extent, camera left unchanged");
            return None;
        }

        Some(fit_camera_to_bounds(camera, controls, &bounds, self.fit_offset))
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_content_visible(&self) -> bool {
        self.content_visible
    }

    /// The last load error, cleared when a new load starts.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn models(&self) -> &[L::Model] {
        &self.models
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    /// The file of the most recent accepted load.
    pub fn current_file(&self) -> Option<&SelectedFile> {
        self.current_file.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::sync::Arc;

    use zview_math::{Mat4, Vec3};

    use crate::environment::EnvironmentMap;
    use crate::group::{Group, DEFAULT_COLOR};
    use crate::intake::{FileIntake, IntakeEvent};
    use crate::loader::UsdzLoader;
    use crate::mesh::Mesh;
    use crate::scene::LightRig;
    use crate::usd::{LoadError, LoadResult};

    /// Counters shared between a fake loader and its models.
    #[derive(Clone, Default)]
    struct Counters {
        loads: Rc<Cell<usize>>,
        clears: Rc<Cell<usize>>,
        updates: Rc<Cell<usize>>,
    }

    struct FakeModel {
        root: GroupId,
        counters: Counters,
    }

    impl LoadedModel for FakeModel {
        fn update(&mut self, _scene: &mut Scene, _time_seconds: f64) {
            self.counters.updates.set(self.counters.updates.get() + 1);
        }

        fn clear(&mut self, scene: &mut Scene) {
            self.counters.clears.set(self.counters.clears.get() + 1);
            scene.clear_group(self.root);
        }

        fn root(&self) -> GroupId {
            self.root
        }
    }

    /// Loads a 2x2x2 cube centered at the origin; files named `broken*` fail.
    struct FakeLoader {
        counters: Counters,
    }

    impl ModelLoader for FakeLoader {
        type Model = FakeModel;

        fn load(
            &mut self,
            file: &SelectedFile,
            scene: &mut Scene,
            group: GroupId,
        ) -> LoadResult<FakeModel> {
            self.counters.loads.set(self.counters.loads.get() + 1);
            if file.name.starts_with("broken") {
                return Err(LoadError::NoGeometry);
            }

            scene.fill_group(group, cube_group(&file.name));
            Ok(FakeModel {
                root: group,
                counters: self.counters.clone(),
            })
        }
    }

    fn cube_group(name: &str) -> Group {
        let corners = Vec::from(
            zview_math::Aabb::from_points(Vec3::splat(-1.0), Vec3::splat(1.0)).corners(),
        );
        let mesh = Mesh::new(corners, vec![0, 1, 2, 5, 6, 7], None);

        let mut group = Group::new(name);
        let proto = group.add_prototype(Arc::new(mesh), "cube".to_string(), DEFAULT_COLOR);
        group.add_instance(proto, None, Mat4::IDENTITY);
        group
    }

    struct Harness {
        scene: Scene,
        camera: Camera,
        controls: OrbitControls,
        counters: Counters,
        orchestrator: LoadOrchestrator<FakeLoader>,
    }

    impl Harness {
        fn new() -> Self {
            let counters = Counters::default();
            Self {
                scene: Scene::with_environment(
                    EnvironmentMap::constant(Vec3::ONE),
                    LightRig::default(),
                ),
                camera: Camera::new(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, 27.0, 1.0),
                controls: OrbitControls::default(),
                orchestrator: LoadOrchestrator::new(FakeLoader {
                    counters: counters.clone(),
                }),
                counters,
            }
        }

        fn load(&mut self, name: &str) -> bool {
            self.orchestrator
                .load_file(&mut self.scene, SelectedFile::new(name))
        }

        fn poll(&mut self) -> Option<LoadOutcome> {
            self.orchestrator
                .poll(&mut self.scene, &mut self.camera, &mut self.controls)
        }
    }

    #[test]
    fn test_load_while_loading_is_ignored() {
        let mut h = Harness::new();

        assert!(h.load("first.usdz"));
        assert!(h.orchestrator.is_loading());
        assert!(!h.load("second.usdz"));
        assert!(!h.load("broken.usdz"));

        assert_eq!(h.orchestrator.current_file().unwrap().name, "first.usdz");
        assert_eq!(h.orchestrator.model_count(), 0);
        assert!(h.orchestrator.error().is_none());
        assert_eq!(h.scene.group_count(), 1);

        h.poll();
        assert_eq!(h.counters.loads.get(), 1);
        assert_eq!(h.orchestrator.model_count(), 1);
        assert!(h.poll().is_none());
    }

    #[test]
    fn test_failed_load() {
        let mut h = Harness::new();
        let camera_before = h.camera.position;

        h.load("broken.usdz");
        let outcome = h.poll();

        assert!(matches!(outcome, Some(LoadOutcome::Failed { .. })));
        assert!(!h.orchestrator.is_loading());
        assert!(!h.orchestrator.is_content_visible());
        assert_eq!(h.orchestrator.error(), Some("No geometry found in USD file"));
        assert_eq!(h.orchestrator.model_count(), 0);
        // The empty group does not linger
        assert_eq!(h.scene.group_count(), 0);
        assert_eq!(h.camera.position, camera_before);
    }

    #[test]
    fn test_error_cleared_by_next_attempt() {
        let mut h = Harness::new();
        h.load("broken.usdz");
        h.poll();
        assert!(h.orchestrator.error().is_some());

        h.load("good.usdz");
        assert!(h.orchestrator.error().is_none());
        h.poll();
        assert!(h.orchestrator.error().is_none());
        assert!(h.orchestrator.is_content_visible());
    }

    #[test]
    fn test_sequential_loads_keep_one_model() {
        let mut h = Harness::new();

        h.load("a.usdz");
        h.poll();
        assert_eq!(h.counters.clears.get(), 0);

        h.load("b.usdz");
        assert_eq!(h.counters.clears.get(), 1);
        h.poll();

        assert_eq!(h.orchestrator.model_count(), 1);
        assert_eq!(h.counters.clears.get(), 1);
        assert_eq!(h.scene.group_count(), 1);

        let root = h.orchestrator.models()[0].root();
        let group = h.scene.group(root).unwrap();
        assert_eq!(group.name, "b.usdz");
        assert!(group.visible);
    }

    #[test]
    fn test_cube_framing() {
        let mut h = Harness::new();
        h.load("cube.usdz");

        let fit = match h.poll() {
            Some(LoadOutcome::Loaded { fit: Some(fit), .. }) => fit,
            other => panic!("unexpected outcome: {:?}", other),
        };

        let height_distance = 2.0 / (2.0 * (27.0f32.to_radians() / 2.0).tan());
        let expected = 1.5 * height_distance;

        assert!((fit.distance - expected).abs() < 1e-2);
        assert!((fit.center - Vec3::ZERO).length() < 1e-3);
        assert!((h.camera.distance() - expected).abs() < 1e-2);
        assert!((h.controls.max_distance - 10.0 * expected).abs() < 1e-1);
        assert!((h.camera.near - expected / 100.0).abs() < 1e-3);
        assert!((h.camera.far - expected * 100.0).abs() < 1.0);

        // Same content, same inputs: same framing
        let again = h
            .orchestrator
            .refit(&h.scene, &mut h.camera, &mut h.controls)
            .unwrap();
        assert_eq!(again.distance, fit.distance);
    }

    #[test]
    fn test_update_reaches_models() {
        let mut h = Harness::new();
        h.orchestrator.update(&mut h.scene, 1.0);
        assert_eq!(h.counters.updates.get(), 0);

        h.load("a.usdz");
        h.poll();
        h.orchestrator.update(&mut h.scene, 1.0);
        h.orchestrator.update(&mut h.scene, 2.0);
        assert_eq!(h.counters.updates.get(), 2);
    }

    #[test]
    fn test_dropped_non_usdz_file_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"not a scene").unwrap();

        let mut scene =
            Scene::with_environment(EnvironmentMap::constant(Vec3::ONE), LightRig::default());
        let mut camera = Camera::new(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, 27.0, 1.0);
        let mut controls = OrbitControls::default();
        let mut orchestrator = LoadOrchestrator::new(UsdzLoader::new());
        let mut intake = FileIntake::new();

        let file = intake.handle(IntakeEvent::Dropped(path)).unwrap();
        assert!(orchestrator.load_file(&mut scene, file));
        orchestrator.poll(&mut scene, &mut camera, &mut controls);

        let error = orchestrator.error().unwrap();
        assert!(error.contains("notes.txt"));
        assert!(!orchestrator.is_content_visible());
        assert!(!orchestrator.is_loading());
    }
}
