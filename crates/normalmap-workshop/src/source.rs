use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

/// Decoded source image: tightly packed row-major RGBA8.
///
/// Pixels sit behind an `Arc` so every layer regeneration can borrow the same
/// buffer and the GPU engine can tell whether it already uploaded it.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Arc<[u8]>,
}

impl SourceImage {
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        anyhow::ensure!(width > 0 && height > 0, "image has zero size ({width}x{height})");
        let expected = width as usize * height as usize * 4;
        anyhow::ensure!(
            pixels.len() == expected,
            "expected {expected} bytes for {width}x{height} RGBA, got {}",
            pixels.len()
        );
        Ok(Self {
            width,
            height,
            pixels: pixels.into(),
        })
    }

    /// A single-colour image, handy for tests and as a stand-in source.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels: Vec<u8> = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self {
            width,
            height,
            pixels: pixels.into(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let img = image::open(path)
            .with_context(|| format!("failed to open source image {}", path.display()))?
            .into_rgba8();
        let (width, height) = img.dimensions();
        log::info!("Loaded source image {} ({width}x{height})", path.display());
        Self::from_rgba(width, height, img.into_raw())
    }
}

/// Encodes RGBA8 pixels to `path`; the format follows the extension.
/// JPEG has no alpha channel, so alpha is dropped for it.
pub fn save_rgba(path: &Path, width: u32, height: u32, pixels: Vec<u8>) -> image::ImageResult<()> {
    let Some(img) = image::RgbaImage::from_raw(width, height, pixels) else {
        return Err(image::ImageError::Parameter(
            image::error::ParameterError::from_kind(
                image::error::ParameterErrorKind::DimensionMismatch,
            ),
        ));
    };
    match image::ImageFormat::from_path(path) {
        Ok(image::ImageFormat::Jpeg) => image::DynamicImage::ImageRgba8(img).to_rgb8().save(path),
        _ => img.save(path),
    }
}
