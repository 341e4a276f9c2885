//! Shared test utilities for the imgstore test suite.
//!
//! Provides synthetic image encoding and temp-dir layout helpers so unit
//! tests can exercise the real store without checked-in fixture files.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! let layout = test_layout(tmp.path());
//! let png = encode_test_image(ImageFormat::Png, 120, 80);
//! assert!(files_under(tmp.path()).is_empty());
//! ```

use crate::layout::Layout;
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// =========================================================================
// Synthetic images
// =========================================================================

/// Encode a `width x height` gradient in `format`.
///
/// RGB8 is accepted by every encoder the store enables, so the same helper
/// works for JPEG, PNG, GIF, BMP, TIFF and WebP.
pub fn encode_test_image(format: ImageFormat, width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, format)
        .unwrap();
    buf.into_inner()
}

// =========================================================================
// Storage layout
// =========================================================================

/// Layout rooted at `root/originals` and `root/resizes`, served from
/// `http://img.test/media/`.
pub fn test_layout(root: &Path) -> Layout {
    Layout::new(
        root.join("originals"),
        root.join("resizes"),
        "http://img.test/media/",
    )
}

/// Every regular file below `root`, sorted.
pub fn files_under(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}
