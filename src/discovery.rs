//! Reconstruct an image's derivatives from the filesystem.
//!
//! Derivatives are never indexed. An image has a derivative of size `WxH`
//! exactly when `{derivatives_root}/{owner}/WxH/{stored_filename}` exists as
//! a regular file. Discovery lists the owner's size directories (one level,
//! no recursion), keeps those whose names are a [`Size`] in canonical form
//! (`050x050` is skipped, since its URL would name `50x50`), and checks each
//! for the stored filename.
//!
//! Every call reads the filesystem afresh; nothing is memoized, so a
//! derivative written by a concurrent resize is visible on the next call.

use crate::layout::Layout;
use crate::records::Owner;
use crate::size::Size;
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use tracing::debug;
use walkdir::WalkDir;

/// One derivative found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Derivative {
    pub size: Size,
    pub path: PathBuf,
    pub url: String,
}

/// Find all derivatives of `stored_filename`, sorted by size.
///
/// A missing owner directory means "no derivatives", not an error. Entries
/// that are not directories, or whose names are not valid sizes, are skipped.
pub fn discover(
    layout: &Layout,
    owner: &Owner,
    stored_filename: &str,
) -> io::Result<Vec<Derivative>> {
    let root = layout.owner_derivatives_root(owner);
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(&root).min_depth(1).max_depth(1) {
        let entry = entry.map_err(walk_error)?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let Some(size) = entry
            .file_name()
            .to_str()
            .and_then(canonical_size)
        else {
            debug!(dir = %entry.path().display(), "skipping non-size directory");
            continue;
        };
        let path = entry.path().join(stored_filename);
        if path.is_file() {
            found.push(Derivative {
                size,
                url: layout.url(owner, size, stored_filename),
                path,
            });
        }
    }

    found.sort_by_key(|d| d.size);
    Ok(found)
}

/// `name` as a size, only if it is exactly how that size prints.
fn canonical_size(name: &str) -> Option<Size> {
    name.parse::<Size>()
        .ok()
        .filter(|size| size.to_string() == name)
}

fn walk_error(err: walkdir::Error) -> io::Error {
    match err.into_io_error() {
        Some(io) => io,
        None => io::Error::other("filesystem loop while scanning derivatives"),
    }
}
