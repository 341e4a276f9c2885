//! Image processing for derivative generation.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::ImageReader` with content-based format detection |
//! | **Fit** | [`fit_within`]: bounding box, aspect preserved, never upscaled |
//! | **Resize → source format** | Lanczos3 + the source format's encoder |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: High-level functions combining calculations + backend

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend, SourceImage, format_name};
pub use calculations::fit_within;
pub use operations::{create_derivative, plan_derivative};
pub use params::ResizeParams;
pub use rust_backend::RustBackend;
