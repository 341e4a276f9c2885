//! Where originals and derivatives live, and how they are addressed.
//!
//! ```text
//! {originals_root}/{owner}/{stored_filename}
//! {derivatives_root}/{owner}/{WIDTHxHEIGHT}/{stored_filename}
//! {base_url}/{owner}/{WIDTHxHEIGHT}/{stored_filename}
//! ```
//!
//! Every function here is pure: nothing touches the filesystem.

use crate::records::Owner;
use crate::size::Size;
use std::path::PathBuf;

/// Resolved storage roots and public base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    originals_root: PathBuf,
    derivatives_root: PathBuf,
    base_url: String,
}

impl Layout {
    pub fn new(
        originals_root: impl Into<PathBuf>,
        derivatives_root: impl Into<PathBuf>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            originals_root: originals_root.into(),
            derivatives_root: derivatives_root.into(),
            base_url: base_url.into(),
        }
    }

    pub fn original_path(&self, owner: &Owner, stored_filename: &str) -> PathBuf {
        self.originals_root
            .join(owner.as_str())
            .join(stored_filename)
    }

    /// Directory holding one subdirectory per size for this owner.
    pub fn owner_derivatives_root(&self, owner: &Owner) -> PathBuf {
        self.derivatives_root.join(owner.as_str())
    }

    pub fn derivative_dir(&self, owner: &Owner, size: Size) -> PathBuf {
        self.owner_derivatives_root(owner).join(size.to_string())
    }

    pub fn derivative_path(&self, owner: &Owner, size: Size, stored_filename: &str) -> PathBuf {
        self.derivative_dir(owner, size).join(stored_filename)
    }

    /// Public URL of a derivative. A trailing slash on the base is tolerated.
    pub fn url(&self, owner: &Owner, size: Size, stored_filename: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            owner,
            size,
            stored_filename
        )
    }
}
