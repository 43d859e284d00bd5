//! USDZ package access.
//!
//! A USDZ file is an uncompressed zip archive whose first layer entry is the
//! root layer. Other entries (sublayers, referenced layers, textures) are
//! addressed by their archive-relative path.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use zip::result::ZipError;
use zip::ZipArchive;

use super::loader::{LoadError, LoadResult};
use super::parser::parse_usda;
use super::types::UsdLayer;

/// Magic bytes at the start of a binary crate (`.usdc`) layer.
const USDC_MAGIC: &[u8] = b"PXR-USDC";

/// Upper bound on the buffer reserved up front for an entry. The declared
/// size comes from the archive and is not trusted beyond this.
const MAX_PREALLOC: u64 = 16 * 1024 * 1024;

/// Extensions that identify a layer entry inside a package.
const LAYER_EXTENSIONS: &[&str] = &["usda", "usdc", "usd"];

/// Somewhere layers and other assets can be read from by path.
pub trait AssetSource {
    /// Read the asset at `path` (relative to the source root).
    fn read_asset(&mut self, path: &str) -> LoadResult<Vec<u8>>;
}

/// An opened USDZ package held in memory.
pub struct UsdzArchive {
    archive: ZipArchive<Cursor<Vec<u8>>>,
    /// Entry names in archive order
    entries: Vec<String>,
}

impl UsdzArchive {
    /// Open a package from its raw bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> LoadResult<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;

        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let entry = archive.by_index(index)?;
            if entry.is_file() {
                entries.push(entry.name().to_string());
            }
        }

        log::debug!("Opened USDZ package with {} entries", entries.len());

        Ok(Self { archive, entries })
    }

    /// Read and open a package from disk.
    pub fn open(path: impl AsRef<Path>) -> LoadResult<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(bytes)
    }

    /// Entry names in archive order.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// The root layer: the first layer entry in the package.
    pub fn root_layer_path(&self) -> LoadResult<&str> {
        self.entries
            .iter()
            .find(|name| has_extension(name, LAYER_EXTENSIONS))
            .map(String::as_str)
            .ok_or(LoadError::NoLayer)
    }

    /// Read an entry's bytes.
    pub fn read(&mut self, path: &str) -> LoadResult<Vec<u8>> {
        let mut entry = match self.archive.by_name(path) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Err(LoadError::MissingAsset(path.to_string())),
            Err(err) => return Err(err.into()),
        };

        let mut bytes = Vec::with_capacity(initial_capacity(entry.size()));
        entry.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// Parse the root layer, returning its path and contents.
    pub fn root_layer(&mut self) -> LoadResult<(String, UsdLayer)> {
        let path = self.root_layer_path()?.to_string();
        let bytes = self.read(&path)?;
        let layer = parse_layer(&path, &bytes)?;
        Ok((path, layer))
    }
}

impl AssetSource for UsdzArchive {
    fn read_asset(&mut self, path: &str) -> LoadResult<Vec<u8>> {
        self.read(path)
    }
}

/// Assets read from a directory on disk (for loose `.usda` files).
#[derive(Clone, Debug)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetSource for DirectorySource {
    fn read_asset(&mut self, path: &str) -> LoadResult<Vec<u8>> {
        match std::fs::read(self.root.join(path)) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(LoadError::MissingAsset(path.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Parse a layer's bytes. Binary crate layers are rejected.
pub fn parse_layer(path: &str, bytes: &[u8]) -> LoadResult<UsdLayer> {
    if bytes.starts_with(USDC_MAGIC) || has_extension(path, &["usdc"]) {
        return Err(LoadError::UnsupportedLayer(path.to_string()));
    }

    let text =
        std::str::from_utf8(bytes).map_err(|_| LoadError::InvalidText(path.to_string()))?;
    Ok(parse_usda(text)?)
}

/// Resolve an asset path authored in the layer at `layer_path`.
///
/// Relative paths are taken from the layer's directory; `.` and `..`
/// segments are folded. A leading `/` anchors at the source root.
pub fn resolve_asset_path(layer_path: &str, asset_path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    if !asset_path.starts_with('/') {
        if let Some((dir, _)) = layer_path.rsplit_once('/') {
            segments.extend(dir.split('/').filter(|s| !s.is_empty()));
        }
    }

    for segment in asset_path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    segments.join("/")
}

fn has_extension(path: &str, extensions: &[&str]) -> bool {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

fn initial_capacity(declared: u64) -> usize {
    usize::try_from(declared.min(MAX_PREALLOC)).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    fn package(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, contents) in files {
            writer.start_file(*name, options).unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_root_layer_is_first_layer_entry() {
        let bytes = package(&[
            ("textures/wood.png", b"png"),
            ("scene.usda", b"#usda 1.0\n"),
            ("props/chair.usda", b"#usda 1.0\n"),
        ]);
        let archive = UsdzArchive::from_bytes(bytes).unwrap();

        assert_eq!(archive.entries().len(), 3);
        assert_eq!(archive.root_layer_path().unwrap(), "scene.usda");
    }

    #[test]
    fn test_package_without_layer() {
        let bytes = package(&[("readme.txt", b"hello")]);
        let archive = UsdzArchive::from_bytes(bytes).unwrap();

        assert!(matches!(archive.root_layer_path(), Err(LoadError::NoLayer)));
    }

    #[test]
    fn test_read_entry_and_missing_entry() {
        let bytes = package(&[("scene.usda", b"#usda 1.0\n")]);
        let mut archive = UsdzArchive::from_bytes(bytes).unwrap();

        assert_eq!(archive.read("scene.usda").unwrap(), b"#usda 1.0\n");
        assert!(matches!(
            archive.read("nope.usda"),
            Err(LoadError::MissingAsset(path)) if path == "nope.usda"
        ));
    }

    #[test]
    fn test_initial_capacity_is_capped() {
        assert_eq!(initial_capacity(0), 0);
        assert_eq!(initial_capacity(1024), 1024);
        assert_eq!(initial_capacity(u64::MAX), MAX_PREALLOC as usize);
    }

    #[test]
    fn test_overstated_entry_size_reads_real_bytes() {
        let mut bytes = package(&[("scene.usda", b"#usda 1.0\n")]);

        // Claim ~2 GiB uncompressed in the central directory record
        let central = bytes
            .windows(4)
            .position(|w| w == b"PK\x01\x02")
            .unwrap();
        bytes[central + 24..central + 28].copy_from_slice(&0x7fff_fff0u32.to_le_bytes());

        let mut archive = UsdzArchive::from_bytes(bytes).unwrap();
        assert_eq!(archive.read("scene.usda").unwrap(), b"#usda 1.0\n");
    }

    #[test]
    fn test_not_a_zip() {
        let result = UsdzArchive::from_bytes(b"definitely not a zip".to_vec());
        assert!(matches!(result, Err(LoadError::Archive(_))));
    }

    #[test]
    fn test_binary_layer_rejected() {
        let mut bytes = USDC_MAGIC.to_vec();
        bytes.extend_from_slice(&[0, 0, 0, 0]);

        assert!(matches!(
            parse_layer("scene.usd", &bytes),
            Err(LoadError::UnsupportedLayer(_))
        ));
        assert!(matches!(
            parse_layer("scene.usdc", b"#usda 1.0\n"),
            Err(LoadError::UnsupportedLayer(_))
        ));
    }

    #[test]
    fn test_invalid_utf8_layer() {
        let result = parse_layer("scene.usda", &[0xff, 0xfe, 0x00]);
        assert!(matches!(result, Err(LoadError::InvalidText(_))));
    }

    #[test]
    fn test_root_layer_parses() {
        let usda = b"#usda 1.0\n(\n    upAxis = \"Z\"\n)\n\ndef Xform \"World\"\n{\n}\n";
        let bytes = package(&[("scene.usda", usda)]);
        let mut archive = UsdzArchive::from_bytes(bytes).unwrap();

        let (path, layer) = archive.root_layer().unwrap();
        assert_eq!(path, "scene.usda");
        assert_eq!(layer.prims.len(), 1);
    }

    #[test]
    fn test_resolve_asset_path() {
        assert_eq!(resolve_asset_path("scene.usda", "./props/a.usda"), "props/a.usda");
        assert_eq!(resolve_asset_path("props/a.usda", "b.usda"), "props/b.usda");
        assert_eq!(resolve_asset_path("props/a.usda", "../c.usda"), "c.usda");
        assert_eq!(resolve_asset_path("props/deep/a.usda", "/top.usda"), "top.usda");
    }

    #[test]
    fn test_directory_source() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cube.usda"), b"#usda 1.0\n").unwrap();
        let mut source = DirectorySource::new(dir.path());

        assert_eq!(source.read_asset("cube.usda").unwrap(), b"#usda 1.0\n");
        assert!(matches!(
            source.read_asset("sphere.usda"),
            Err(LoadError::MissingAsset(_))
        ));
    }
}
