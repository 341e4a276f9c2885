//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the high-level [`operations`](super::operations) module
//! (which decides the output dimensions and path) and the
//! [`backend`](super::backend) (which does the pixel work and encoding). This
//! separation allows swapping backends (e.g. for testing with a mock) without
//! changing operation logic.

use crate::size::Size;
use std::path::PathBuf;

/// Parameters for producing one derivative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeParams {
    /// The requested bounding box.
    pub size: Size,
    /// Final output dimensions, already fitted inside `size`.
    pub width: u32,
    pub height: u32,
    pub output: PathBuf,
}
