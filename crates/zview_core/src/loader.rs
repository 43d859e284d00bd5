//! Model loading seam.
//!
//! [`ModelLoader`] decodes a selected file into a group the caller already
//! attached to the scene, and hands back a [`LoadedModel`] that drives the
//! model's animation clock and tears its content down again.

use std::path::Path;

use crate::group::Group;
use crate::intake::SelectedFile;
use crate::scene::{GroupId, Scene};
use crate::usd::{
    build_group, parse_layer, DirectorySource, LoadError, LoadResult, StageMetadata, UsdzArchive,
};

/// A model living in the scene.
pub trait LoadedModel {
    /// Advance the model's clock to `time_seconds` of wall-clock time.
    fn update(&mut self, scene: &mut Scene, time_seconds: f64);

    /// Drop the model's content from the scene.
    fn clear(&mut self, scene: &mut Scene);

    /// The group holding the model's content.
    fn root(&self) -> GroupId;
}

/// Decodes files into scene groups.
pub trait ModelLoader {
    type Model: LoadedModel;

    /// Decode `file` into `group`, which must already be attached to `scene`.
    fn load(
        &mut self,
        file: &SelectedFile,
        scene: &mut Scene,
        group: GroupId,
    ) -> LoadResult<Self::Model>;
}

/// Maps wall-clock seconds to a looping time code.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timeline {
    pub start: f64,
    pub end: f64,
    pub time_codes_per_second: f64,
}

impl Timeline {
    /// The playback range of an animated group: authored stage range first,
    /// then the span of its time samples. `None` for static content.
    pub fn for_group(metadata: &StageMetadata, group: &Group) -> Option<Self> {
        if !group.is_animated() {
            return None;
        }

        let sampled = group.time_range();
        let start = metadata
            .start_time_code
            .or(sampled.map(|(start, _)| start))?;
        let end = metadata.end_time_code.or(sampled.map(|(_, end)| end))?;

        Some(Self {
            start,
            end,
            time_codes_per_second: metadata.time_codes_per_second,
        })
    }

    /// Time code at `seconds`, wrapping around `[start, end)`.
    pub fn time_code_at(&self, seconds: f64) -> f64 {
        let span = self.end - self.start;
        if span <= 0.0 || self.time_codes_per_second <= 0.0 {
            return self.start;
        }
        self.start + (seconds * self.time_codes_per_second).rem_euclid(span)
    }
}

/// A USD model produced by [`UsdzLoader`].
#[derive(Debug)]
pub struct UsdzModel {
    root: GroupId,
    timeline: Option<Timeline>,
    last_time_code: Option<f64>,
}

impl UsdzModel {
    pub fn timeline(&self) -> Option<&Timeline> {
        self.timeline.as_ref()
    }
}

impl LoadedModel for UsdzModel {
    fn update(&mut self, scene: &mut Scene, time_seconds: f64) {
        let Some(timeline) = self.timeline else {
            return;
        };

        let time_code = timeline.time_code_at(time_seconds);
        if self.last_time_code == Some(time_code) {
            return;
        }

        if let Some(group) = scene.group_mut(self.root) {
            group.evaluate(time_code);
            self.last_time_code = Some(time_code);
        }
    }

    fn clear(&mut self, scene: &mut Scene) {
        scene.clear_group(self.root);
        self.timeline = None;
    }

    fn root(&self) -> GroupId {
        self.root
    }
}

/// Loads `.usdz` packages, plus loose `.usda` layers for convenience.
#[derive(Debug, Default)]
pub struct UsdzLoader;

impl UsdzLoader {
    pub fn new() -> Self {
        Self
    }
}

impl ModelLoader for UsdzLoader {
    type Model = UsdzModel;

    fn load(
        &mut self,
        file: &SelectedFile,
        scene: &mut Scene,
        group_id: GroupId,
    ) -> LoadResult<UsdzModel> {
        let name = Path::new(&file.name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| file.name.clone());

        let (metadata, group) = match file.extension().as_deref() {
            Some("usdz") => {
                let mut archive = UsdzArchive::from_bytes(file.read()?)?;
                let (layer_path, layer) = archive.root_layer()?;
                log::debug!("{}: root layer {}", file.name, layer_path);

                let metadata = layer.metadata.clone();
                let group = build_group(layer, &layer_path, &mut archive, &name)?;
                (metadata, group)
            }
            Some("usda") | Some("usd") => {
                let bytes = file.read()?;
                let layer = parse_layer(&file.name, &bytes)?;

                let dir = file.path.parent().unwrap_or_else(|| Path::new("."));
                let mut source = DirectorySource::new(dir);

                let metadata = layer.metadata.clone();
                let group = build_group(layer, &file.name, &mut source, &name)?;
                (metadata, group)
            }
            _ => return Err(LoadError::UnsupportedFile(file.name.clone())),
        };

        let timeline = Timeline::for_group(&metadata, &group);
        if let Some(timeline) = &timeline {
            log::info!(
                "{}: animated, time codes {}..{} at {} per second",
                file.name,
                timeline.start,
                timeline.end,
                timeline.time_codes_per_second
            );
        }

        if !scene.fill_group(group_id, group) {
            return Err(LoadError::MissingGroup);
        }

        Ok(UsdzModel {
            root: group_id,
            timeline,
            last_time_code: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};
    use zview_math::Vec3;

    use crate::environment::EnvironmentMap;
    use crate::scene::LightRig;

    const ANIMATED: &str = r#"#usda 1.0
(
    defaultPrim = "Mover"
    startTimeCode = 0
    endTimeCode = 48
    timeCodesPerSecond = 24
)

def Xform "Mover" {
    double3 xformOp:translate.timeSamples = {
        0: (0, 0, 0),
        48: (48, 0, 0),
    }
    uniform token[] xformOpOrder = ["xformOp:translate"]

    def Mesh "Triangle" {
        point3f[] points = [(0, 0, 0), (1, 0, 0), (0.5, 1, 0)]
        int[] faceVertexCounts = [3]
        int[] faceVertexIndices = [0, 1, 2]
    }
}
"#;

    fn scene() -> Scene {
        Scene::with_environment(EnvironmentMap::constant(Vec3::ONE), LightRig::default())
    }

    fn write_usdz(dir: &Path, name: &str, layer: &str) -> SelectedFile {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        writer.start_file("scene.usda", options).unwrap();
        writer.write_all(layer.as_bytes()).unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        SelectedFile::new(path)
    }

    #[test]
    fn test_timeline_loops() {
        let timeline = Timeline {
            start: 10.0,
            end: 34.0,
            time_codes_per_second: 24.0,
        };

        assert_eq!(timeline.time_code_at(0.0), 10.0);
        assert!((timeline.time_code_at(0.5) - 22.0).abs() < 1e-9);
        assert!((timeline.time_code_at(1.25) - 16.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_timeline_holds_start() {
        let timeline = Timeline {
            start: 5.0,
            end: 5.0,
            time_codes_per_second: 24.0,
        };
        assert_eq!(timeline.time_code_at(3.0), 5.0);
    }

    #[test]
    fn test_load_usdz_and_animate() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_usdz(dir.path(), "mover.usdz", ANIMATED);

        let mut scene = scene();
        let id = scene.add_group("pending");
        let mut model = UsdzLoader::new().load(&file, &mut scene, id).unwrap();

        assert_eq!(model.root(), id);
        assert_eq!(scene.group(id).unwrap().name, "mover");
        assert_eq!(model.timeline().unwrap().end, 48.0);

        // One second at 24 tcps: halfway along the path
        model.update(&mut scene, 1.0);
        let x = scene.group(id).unwrap().instances[0].model_matrix().w_axis.x;
        assert!((x - 24.0).abs() < 1e-3);

        model.clear(&mut scene);
        assert!(scene.group(id).unwrap().is_empty());
    }

    #[test]
    fn test_load_loose_usda_with_reference() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("tri.usda"),
            r#"#usda 1.0
def Mesh "Triangle" {
    point3f[] points = [(0, 0, 0), (1, 0, 0), (0.5, 1, 0)]
    int[] faceVertexCounts = [3]
    int[] faceVertexIndices = [0, 1, 2]
}
"#,
        )
        .unwrap();
        let root = dir.path().join("root.usda");
        std::fs::write(
            &root,
            r#"#usda 1.0
def Xform "Prop" (
    references = @./tri.usda@
)
{
}
"#,
        )
        .unwrap();

        let mut scene = scene();
        let id = scene.add_group("pending");
        let model = UsdzLoader::new()
            .load(&SelectedFile::new(root), &mut scene, id)
            .unwrap();

        assert!(model.timeline().is_none());
        assert_eq!(scene.group(id).unwrap().instance_count(), 1);
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.obj");
        std::fs::write(&path, b"v 0 0 0").unwrap();

        let mut scene = scene();
        let id = scene.add_group("pending");
        let result = UsdzLoader::new().load(&SelectedFile::new(path), &mut scene, id);

        assert!(matches!(result, Err(LoadError::UnsupportedFile(_))));
    }

    #[test]
    fn test_missing_group() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_usdz(dir.path(), "mover.usdz", ANIMATED);

        let mut scene = scene();
        let id = scene.add_group("pending");
        scene.remove_group(id);

        let result = UsdzLoader::new().load(&file, &mut scene, id);
        assert!(matches!(result, Err(LoadError::MissingGroup)));
    }
}
