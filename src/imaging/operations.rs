//! High-level image operations.
//!
//! These functions combine calculations with backend execution: they decide
//! the output dimensions, prepare the destination, and hand the pixel work to
//! the backend.

use super::backend::{BackendError, Dimensions, ImageBackend, SourceImage};
use super::calculations::fit_within;
use super::params::ResizeParams;
use crate::size::Size;
use std::path::Path;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Plan a derivative without executing it.
///
/// Useful for testing parameter generation.
pub fn plan_derivative(source: Dimensions, size: Size, output: &Path) -> ResizeParams {
    let (width, height) = fit_within((source.width, source.height), size.as_tuple());
    ResizeParams {
        size,
        width,
        height,
        output: output.to_path_buf(),
    }
}

/// Write one bounding-box-fit derivative of `source` to `output`.
///
/// Missing parent directories are created first. Errors are returned to the
/// caller, which decides whether they are fatal.
pub fn create_derivative(
    backend: &impl ImageBackend,
    source: &SourceImage,
    size: Size,
    output: &Path,
) -> Result<Dimensions> {
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let params = plan_derivative(source.dimensions(), size, output);
    backend.resize(source, &params)
}
