//! The process-lifetime scene container.
//!
//! A [`Scene`] is created once at startup by [`Scene::bootstrap`] and holds
//! every group a loader populates, the light rig and the environment map
//! used for reflections.

use std::path::PathBuf;

use zview_math::{Aabb, Vec3};

use crate::environment::EnvironmentMap;
use crate::group::Group;

/// Environment color used when the HDR image cannot be loaded.
const FALLBACK_ENVIRONMENT: Vec3 = Vec3::new(0.5, 0.5, 0.5);

/// Stable handle to a group in the scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GroupId(u64);

/// Sky/ground ambient light.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HemisphereLight {
    pub sky_color: Vec3,
    pub ground_color: Vec3,
    pub intensity: f32,
}

impl Default for HemisphereLight {
    fn default() -> Self {
        Self {
            sky_color: Vec3::ONE,
            ground_color: Vec3::splat(0.27),
            intensity: 1.0,
        }
    }
}

/// Light arriving from a single direction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirectionalLight {
    /// Direction the light travels (normalized)
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        // Key light above and in front of the origin
        Self {
            direction: -Vec3::new(0.0, 20.0, 10.0).normalize(),
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LightRig {
    pub hemisphere: HemisphereLight,
    pub directional: DirectionalLight,
}

/// Startup settings for [`Scene::bootstrap`].
#[derive(Clone, Debug)]
pub struct SceneSettings {
    /// Equirectangular HDR used for reflections
    pub environment_path: PathBuf,
    pub lights: LightRig,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            environment_path: PathBuf::from("assets/environment.hdr"),
            lights: LightRig::default(),
        }
    }
}

/// All visual content of the viewer.
pub struct Scene {
    /// Groups in insertion order
    groups: Vec<(GroupId, Group)>,
    next_id: u64,
    lights: LightRig,
    environment: EnvironmentMap,
    revision: u64,
}

impl Scene {
    /// Build the scene, lights and environment. Runs once at startup.
    ///
    /// A missing or unreadable environment image is not fatal: a neutral
    /// constant environment is used instead.
    pub fn bootstrap(settings: &SceneSettings) -> Self {
        let environment = match EnvironmentMap::load(&settings.environment_path) {
            Ok(env) => env,
            Err(err) => {
                log::warn!(
                    "Could not load environment map {}: {}. Using a constant environment.",
                    settings.environment_path.display(),
                    err
                );
                EnvironmentMap::constant(FALLBACK_ENVIRONMENT)
            }
        };

        Self::with_environment(environment, settings.lights)
    }

    /// Build a scene around an already decoded environment.
    pub fn with_environment(environment: EnvironmentMap, lights: LightRig) -> Self {
        log::info!(
            "Scene ready: environment {} ({}x{})",
            environment.source,
            environment.width,
            environment.height
        );

        Self {
            groups: Vec::new(),
            next_id: 0,
            lights,
            environment,
            revision: 0,
        }
    }

    /// Attach a fresh, empty and hidden group.
    pub fn add_group(&mut self, name: impl Into<String>) -> GroupId {
        let id = GroupId(self.next_id);
        self.next_id += 1;
        self.groups.push((id, Group::new(name)));
        self.revision += 1;
        id
    }

    /// Detach a group, returning it if it existed.
    pub fn remove_group(&mut self, id: GroupId) -> Option<Group> {
        let index = self.groups.iter().position(|(gid, _)| *gid == id)?;
        self.revision += 1;
        Some(self.groups.remove(index).1)
    }

    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups
            .iter()
            .find(|(gid, _)| *gid == id)
            .map(|(_, group)| group)
    }

    /// Mutable access for per-frame changes (visibility, animation).
    ///
    /// Does not bump the revision; use [`Scene::fill_group`] or
    /// [`Scene::clear_group`] when geometry changes.
    pub fn group_mut(&mut self, id: GroupId) -> Option<&mut Group> {
        self.groups
            .iter_mut()
            .find(|(gid, _)| *gid == id)
            .map(|(_, group)| group)
    }

    /// Replace a group's content. Returns `false` if the group is gone.
    pub fn fill_group(&mut self, id: GroupId, content: Group) -> bool {
        match self.group_mut(id) {
            Some(group) => {
                *group = content;
                self.revision += 1;
                true
            }
            None => false,
        }
    }

    /// Drop a group's content, keeping the group attached.
    pub fn clear_group(&mut self, id: GroupId) -> bool {
        match self.group_mut(id) {
            Some(group) => {
                group.clear();
                self.revision += 1;
                true
            }
            None => false,
        }
    }

    /// Groups in insertion order.
    pub fn groups(&self) -> impl Iterator<Item = (GroupId, &Group)> {
        self.groups.iter().map(|(id, group)| (*id, group))
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Union of the world bounds of the given groups. Unknown ids are ignored.
    pub fn union_bounds(&self, ids: &[GroupId]) -> Aabb {
        let boxes: Vec<Aabb> = ids
            .iter()
            .filter_map(|id| self.group(*id))
            .map(Group::world_bounds)
            .collect();

        Aabb::union_all(&boxes)
    }

    /// Counter bumped on every structural change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn environment(&self) -> &EnvironmentMap {
        &self.environment
    }

    pub fn lights(&self) -> &LightRig {
        &self.lights
    }
}
