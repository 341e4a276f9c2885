//! # imgstore
//!
//! Per-user image storage with on-demand resized derivatives.
//! Clients upload an image, optionally asking for a list of bounding-box
//! sizes; later they can request more sizes or delete the image together
//! with everything derived from it.
//!
//! # Storage Model
//!
//! ```text
//! {originals_root}/{owner}/{stored_filename}              original, byte-for-byte
//! {derivatives_root}/{owner}/{WxH}/{stored_filename}      one file per size
//! {base_url}/{owner}/{WxH}/{stored_filename}              public URL of a derivative
//! ```
//!
//! The stored filename is server-generated (`{32 hex}.{format}`) and never
//! derived from the client's name for the file. Image records hold only the
//! owner, both filenames, upload time, size and checksum; derivatives are
//! not indexed anywhere and are rediscovered from the filesystem on demand.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`size`] | `WIDTHxHEIGHT` value type and the comma-separated size list parser |
//! | [`layout`] | Pure path and URL construction for originals and derivatives |
//! | [`imaging`] | Decoding, fit-within math, and resizing via the `image` crate |
//! | [`discovery`] | Finds an image's derivatives by listing size directories |
//! | [`records`] | `ImageRecord` plus in-memory and SQLite repositories |
//! | [`auth`] | Credential → owner resolution |
//! | [`store`] | Upload, resize, and delete orchestration over all of the above |
//! | [`config`] | `imgstore.toml` loading, merging over defaults, and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## The Filesystem Is the Derivative Index
//!
//! A derivative exists exactly when its file exists. There is no table of
//! generated sizes to fall out of sync when files are removed by hand or a
//! resize half-fails, and delete only has to list one directory per size.
//!
//! ## Validate Before Writing
//!
//! An upload parses every requested size and decodes the image before the
//! original is written, so malformed requests leave nothing behind. Once the
//! original is stored, each size is best-effort and reported individually.
//!
//! ## Same Format In, Same Format Out
//!
//! Derivatives are encoded in the format of the original and carry the same
//! stored filename, so a derivative URL differs from its siblings only in
//! the size segment.

pub mod auth;
pub mod config;
pub mod discovery;
pub mod imaging;
pub mod layout;
pub mod output;
pub mod records;
pub mod size;
pub mod store;

#[cfg(test)]
pub(crate) mod test_helpers;
