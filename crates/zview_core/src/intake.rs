//! File intake: picker, drop-zone click and drag-and-drop all end up as a
//! single [`SelectedFile`].

use std::path::{Path, PathBuf};

/// Extensions the drop zone advertises.
pub const ACCEPTED_EXTENSIONS: &[&str] = &["usdz", "usda", "usd"];

/// A file chosen by the user, by any means.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectedFile {
    /// Display name (file name without directories)
    pub name: String,
    pub path: PathBuf,
}

impl SelectedFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        Self { name, path }
    }

    /// Read the whole file.
    pub fn read(&self) -> std::io::Result<Vec<u8>> {
        std::fs::read(&self.path)
    }

    /// Lower-cased extension, if any.
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
    }
}

/// Raw input from the window or the file dialog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IntakeEvent {
    /// Chosen in the file dialog (toolbar button or drop-zone click)
    Picked(PathBuf),

    /// Dropped onto the window
    Dropped(PathBuf),

    /// Dragged over the window
    Hovered(PathBuf),

    /// Drag left the window without dropping
    HoverCancelled,
}

/// Normalizes intake events and tracks the drag-hover state.
#[derive(Debug, Default)]
pub struct FileIntake {
    hovering: Option<PathBuf>,
}

impl FileIntake {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one event; returns the selected file for picks and drops.
    pub fn handle(&mut self, event: IntakeEvent) -> Option<SelectedFile> {
        match event {
            IntakeEvent::Picked(path) => Some(SelectedFile::new(path)),
            IntakeEvent::Dropped(path) => {
                self.hovering = None;
                log::debug!("File dropped: {}", path.display());
                Some(SelectedFile::new(path))
            }
            IntakeEvent::Hovered(path) => {
                self.hovering = Some(path);
                None
            }
            IntakeEvent::HoverCancelled => {
                self.hovering = None;
                None
            }
        }
    }

    /// True while a file is dragged over the window.
    pub fn is_hovering(&self) -> bool {
        self.hovering.is_some()
    }

    /// Whether the hovered file looks loadable (drop-zone hint only).
    pub fn hover_accepted(&self) -> bool {
        self.hovering.as_deref().is_some_and(Self::accepts)
    }

    /// Whether `path` has one of the [`ACCEPTED_EXTENSIONS`].
    pub fn accepts(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                ACCEPTED_EXTENSIONS
                    .iter()
                    .any(|accepted| ext.eq_ignore_ascii_case(accepted))
            })
    }
}
