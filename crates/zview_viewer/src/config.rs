//! Viewer configuration: an optional `zview.toml` plus command-line overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use thiserror::Error;

use zview_core::SceneSettings;
use zview_math::{Camera, Vec3, DEFAULT_FIT_OFFSET};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Command-line arguments.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "zview", version, about = "Drag-and-drop USDZ viewer")]
pub struct Args {
    /// File to open at startup
    pub file: Option<PathBuf>,

    /// Configuration file (ignored when missing)
    #[arg(long, default_value = "zview.toml")]
    pub config: PathBuf,

    /// Equirectangular .hdr used for reflections
    #[arg(long)]
    pub environment: Option<PathBuf>,

    /// Vertical field of view in degrees
    #[arg(long)]
    pub fov: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "zview".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fov_degrees: f32,
    /// Framing margin; 1.0 fits the content edge to edge
    pub fit_offset: f32,
    pub near: f32,
    pub far: f32,
    pub initial_position: [f32; 3],
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: 27.0,
            fit_offset: DEFAULT_FIT_OFFSET,
            near: 0.25,
            far: 100.0,
            initial_position: [0.0, 2.0, 8.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub frame_interval_ms: u64,
    /// Linear RGB
    pub clear_color: [f64; 3],
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 10,
            clear_color: [0.1, 0.2, 0.3],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub path: PathBuf,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            path: SceneSettings::default().environment_path,
        }
    }
}

/// Everything the viewer reads at startup.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub window: WindowConfig,
    pub camera: CameraConfig,
    pub render: RenderConfig,
    pub environment: EnvironmentConfig,
}

impl ViewerConfig {
    pub fn from_toml(path: &Path, content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(path, &content)
    }

    /// Load `path`, or fall back to defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let config = Self::load(path)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply command-line flags on top of file values.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(environment) = &args.environment {
            self.environment.path = environment.clone();
        }
        if let Some(fov) = args.fov {
            self.camera.fov_degrees = fov;
        }
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.render.frame_interval_ms.max(1))
    }

    pub fn scene_settings(&self) -> SceneSettings {
        SceneSettings {
            environment_path: self.environment.path.clone(),
            ..Default::default()
        }
    }

    /// The startup camera, looking at the origin.
    pub fn camera(&self) -> Camera {
        let aspect = Camera::aspect_for(self.window.width, self.window.height);
        let mut camera = Camera::new(
            Vec3::from_array(self.camera.initial_position),
            Vec3::ZERO,
            self.camera.fov_degrees,
            aspect,
        );
        camera.near = self.camera.near;
        camera.far = self.camera.far;
        camera.update_projection();
        camera
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = ViewerConfig::from_toml(Path::new("zview.toml"), "").unwrap();
        assert_eq!(config, ViewerConfig::default());
        assert_eq!(config.camera.fov_degrees, 27.0);
        assert_eq!(config.camera.fit_offset, 1.5);
        assert_eq!(config.frame_interval(), Duration::from_millis(10));
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let content = r#"
[window]
title = "Review"

[camera]
fov_degrees = 40.0

[render]
clear_color = [0.0, 0.0, 0.0]
"#;
        let config = ViewerConfig::from_toml(Path::new("zview.toml"), content).unwrap();

        assert_eq!(config.window.title, "Review");
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.camera.fov_degrees, 40.0);
        assert_eq!(config.camera.fit_offset, 1.5);
        assert_eq!(config.render.clear_color, [0.0, 0.0, 0.0]);
        assert_eq!(config.render.frame_interval_ms, 10);
    }

    #[test]
    fn test_invalid_toml_names_the_file() {
        let err = ViewerConfig::from_toml(Path::new("bad.toml"), "[camera\nfov = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ViewerConfig::load_or_default(&dir.path().join("zview.toml")).unwrap();
        assert_eq!(config, ViewerConfig::default());
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zview.toml");
        std::fs::write(&path, "[environment]\npath = \"studio.hdr\"\n").unwrap();

        let config = ViewerConfig::load_or_default(&path).unwrap();
        assert_eq!(config.environment.path, PathBuf::from("studio.hdr"));
        assert_eq!(
            config.scene_settings().environment_path,
            PathBuf::from("studio.hdr")
        );
    }

    #[test]
    fn test_cli_overrides_file_values() {
        let args = Args::parse_from(["zview", "chair.usdz", "--fov", "35", "--environment", "sky.hdr"]);
        assert_eq!(args.file, Some(PathBuf::from("chair.usdz")));
        assert_eq!(args.config, PathBuf::from("zview.toml"));

        let mut config = ViewerConfig::default();
        config.apply_args(&args);

        assert_eq!(config.camera.fov_degrees, 35.0);
        assert_eq!(config.environment.path, PathBuf::from("sky.hdr"));
    }

    #[test]
    fn test_startup_camera() {
        let mut config = ViewerConfig::default();
        config.camera.near = 0.1;

        let camera = config.camera();

        assert_eq!(camera.target, Vec3::ZERO);
        assert_eq!(camera.near, 0.1);
        assert!((camera.aspect - 1280.0 / 720.0).abs() < 1e-6);
    }
}
