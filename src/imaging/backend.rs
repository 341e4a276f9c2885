//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the three operations the store needs:
//! decode uploaded bytes, load a stored original, and write one resized
//! derivative.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate. Tests use the `MockBackend` in this module, which records
//! operations and can be told to fail specific sizes.

use super::params::ResizeParams;
use image::{DynamicImage, ImageFormat};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cannot decode image: {0}")]
    Decode(String),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Width and height of an image in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// A decoded image together with the container format it came in.
///
/// Derivatives are re-encoded in `format`, so the format travels with the
/// pixels instead of being re-guessed from a file extension.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub format: ImageFormat,
    pub image: DynamicImage,
}

impl SourceImage {
    pub fn new(format: ImageFormat, image: DynamicImage) -> Self {
        Self { format, image }
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.image.width(),
            height: self.image.height(),
        }
    }

    /// Lower-cased format name, used as the stored file extension.
    pub fn format_name(&self) -> &'static str {
        format_name(self.format)
    }
}

/// Lower-cased name of an image format (`jpeg`, `png`, `gif`, ...).
pub fn format_name(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::Png => "png",
        ImageFormat::Gif => "gif",
        ImageFormat::Bmp => "bmp",
        ImageFormat::Tiff => "tiff",
        ImageFormat::WebP => "webp",
        other => other.extensions_str().first().copied().unwrap_or("bin"),
    }
}

/// Trait for image processing backends.
pub trait ImageBackend: Sync {
    /// Decode raw uploaded bytes, detecting the format from content.
    fn decode(&self, bytes: &[u8]) -> Result<SourceImage, BackendError>;

    /// Read and decode a stored file.
    fn load(&self, path: &Path) -> Result<SourceImage, BackendError> {
        let bytes = std::fs::read(path)?;
        self.decode(&bytes)
    }

    /// Resize `source` to `params.width x params.height` and write it to
    /// `params.output` in the source's own format. The output directory
    /// already exists when this is called.
    fn resize(&self, source: &SourceImage, params: &ResizeParams)
    -> Result<Dimensions, BackendError>;
}
