//! Equirectangular environment maps for reflection lighting.
//!
//! Loads a Radiance `.hdr` panorama into linear float RGBA, ready for upload
//! as a float texture by the viewport.

use std::io::{BufRead, BufReader, Cursor};
use std::path::Path;

use image::codecs::hdr::HdrDecoder;
use thiserror::Error;
use zview_math::Vec3;

/// Errors that can occur during environment map loading.
#[derive(Error, Debug)]
pub enum EnvironmentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image decoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Environment map has no pixels")]
    Empty,
}

pub type EnvironmentResult<T> = Result<T, EnvironmentError>;

/// An equirectangular environment map.
///
/// Pixels are linear RGBA, row-major, top row first (+Y at the top).
#[derive(Clone, Debug)]
pub struct EnvironmentMap {
    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Pixel data, [R, G, B, A] per pixel
    pub pixels: Vec<[f32; 4]>,

    /// Source path (for debugging)
    pub source: String,
}

impl EnvironmentMap {
    /// Load a Radiance `.hdr` panorama from disk.
    pub fn load(path: impl AsRef<Path>) -> EnvironmentResult<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        Self::decode(BufReader::new(file), path.to_string_lossy().to_string())
    }

    /// Decode a Radiance HDR image held in memory.
    pub fn from_hdr_bytes(bytes: &[u8]) -> EnvironmentResult<Self> {
        Self::decode(Cursor::new(bytes), "<memory>")
    }

    /// Decode straight to float RGB so radiance above 1.0 survives.
    fn decode(reader: impl BufRead, source: impl Into<String>) -> EnvironmentResult<Self> {
        let decoder = HdrDecoder::new(reader)?;
        let meta = decoder.metadata();
        let (width, height) = (meta.width, meta.height);
        if width == 0 || height == 0 {
            return Err(EnvironmentError::Empty);
        }

        let pixels: Vec<[f32; 4]> = decoder
            .read_image_hdr()?
            .into_iter()
            .map(|p| [p[0], p[1], p[2], 1.0])
            .collect();

        let map = Self {
            width,
            height,
            pixels,
            source: source.into(),
        };

        log::debug!(
            "Loaded environment map: {} ({}x{}, {:.1} KB)",
            map.source,
            map.width,
            map.height,
            map.size_bytes() as f32 / 1024.0
        );

        Ok(map)
    }

    /// A uniform environment (1x1).
    pub fn constant(color: Vec3) -> Self {
        Self {
            width: 1,
            height: 1,
            pixels: vec![[color.x, color.y, color.z, 1.0]],
            source: "<constant>".to_string(),
        }
    }

    /// Mean radiance, used as a flat ambient term.
    pub fn average(&self) -> Vec3 {
        if self.pixels.is_empty() {
            return Vec3::ZERO;
        }
        let sum = self
            .pixels
            .iter()
            .fold(Vec3::ZERO, |acc, p| acc + Vec3::new(p[0], p[1], p[2]));
        sum / self.pixels.len() as f32
    }

    /// Get total size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.pixels.len() * std::mem::size_of::<[f32; 4]>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::hdr::HdrEncoder;
    use image::Rgb;

    /// 4x2 panorama: top row bright sky, bottom row dark ground.
    fn sky_ground_hdr() -> Vec<u8> {
        let mut pixels = vec![Rgb([4.0f32, 4.0, 4.0]); 4];
        pixels.extend(vec![Rgb([0.25f32, 0.25, 0.25]); 4]);

        let mut bytes = Vec::new();
        HdrEncoder::new(&mut bytes).encode(&pixels, 4, 2).unwrap();
        bytes
    }

    #[test]
    fn test_constant_environment() {
        let env = EnvironmentMap::constant(Vec3::new(1.0, 0.5, 0.0));
        assert_eq!(env.width, 1);
        assert_eq!(env.height, 1);

        assert_eq!(env.pixels, vec![[1.0, 0.5, 0.0, 1.0]]);
        assert_eq!(env.average(), Vec3::new(1.0, 0.5, 0.0));
    }

    #[test]
    fn test_decode_hdr_from_memory() {
        let env = EnvironmentMap::from_hdr_bytes(&sky_ground_hdr()).unwrap();

        assert_eq!((env.width, env.height), (4, 2));
        assert_eq!(env.pixels.len(), 8);
        assert!(env.pixels[0][0] > 3.5);
        assert_eq!(env.pixels[0][3], 1.0);
        assert_eq!(env.size_bytes(), 8 * 16);
    }

    #[test]
    fn test_radiance_above_one_is_kept() {
        let env = EnvironmentMap::from_hdr_bytes(&sky_ground_hdr()).unwrap();

        let (sky, ground) = env.pixels.split_at(4);
        assert!(sky.iter().all(|p| p[0] > 3.5 && p[2] > 3.5));
        assert!(ground.iter().all(|p| p[0] < 0.5));
        assert!(env.average().x > 2.0);
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("studio.hdr");
        std::fs::write(&path, sky_ground_hdr()).unwrap();

        let env = EnvironmentMap::load(&path).unwrap();
        assert_eq!(env.width, 4);
        assert!(env.source.ends_with("studio.hdr"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = EnvironmentMap::load("/definitely/not/here.hdr");
        assert!(matches!(result, Err(EnvironmentError::Io(_))));
    }

    #[test]
    fn test_garbage_is_image_error() {
        let result = EnvironmentMap::from_hdr_bytes(b"not an hdr");
        assert!(matches!(result, Err(EnvironmentError::Image(_))));
    }
}
