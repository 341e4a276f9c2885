//! Upload, resize, and delete orchestration.
//!
//! [`ImageStore`] ties the pieces together and keeps the filesystem and the
//! record repository consistent:
//!
//! ```text
//! upload:  validate bytes + sizes → write original → create record → derivatives
//! resize:  load original → write one derivative → URL
//! delete:  discover derivatives → remove files → remove record
//! ```
//!
//! ## Failure model
//!
//! - Validation happens before anything touches the disk. A bad size token or
//!   an undecodable file leaves no original and no record behind.
//! - During upload, each requested size is generated independently. A failed
//!   size is reported as an error string in the outcome map and does not stop
//!   the remaining sizes or fail the upload.
//! - During delete, a file that is already gone is fine. Any other removal
//!   error is logged, reported in [`DeleteReport::failures`], and does not stop
//!   the remaining removals; the record is removed regardless.
//!
//! Every operation is a synchronous unit of work. There is no locking across
//! operations: concurrent resizes of the same size overwrite the same file
//! with identical output, and a resize racing a delete may leave a derivative
//! behind.

use crate::discovery::{self, Derivative};
use crate::imaging::{BackendError, ImageBackend, SourceImage, create_derivative};
use crate::layout::Layout;
use crate::records::{ImageRecord, ImageRepository, NewImage, Owner, RepositoryError};
use crate::size::{Size, SizeError, parse_size_list};
use rayon::prelude::*;
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How many fresh names an upload tries before giving up on collisions.
const MAX_NAME_ATTEMPTS: usize = 5;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("File was not received")]
    EmptyFile,
    #[error("File probably is not an image: {0}")]
    NotAnImage(String),
    #[error("Invalid sizes: {0}")]
    InvalidSizes(#[from] SizeError),
    #[error("Image not found: {owner}/{filename}")]
    ImageNotFound { owner: Owner, filename: String },
    #[error("Original file for {owner}/{filename} is unreadable: {source}")]
    Original {
        owner: Owner,
        filename: String,
        #[source]
        source: BackendError,
    },
    #[error("Resize to {size} failed: {source}")]
    Resize {
        size: Size,
        #[source]
        source: BackendError,
    },
    #[error("Could not allocate a unique filename after {0} attempts")]
    NameExhausted(usize),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl StoreError {
    /// Client input was malformed; nothing was changed.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StoreError::EmptyFile | StoreError::NotAnImage(_) | StoreError::InvalidSizes(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::ImageNotFound { .. })
    }
}

/// Input of [`ImageStore::upload`].
#[derive(Debug, Clone)]
pub struct UploadRequest<'a> {
    pub bytes: &'a [u8],
    /// Client-supplied display name; never used to build paths.
    pub original_filename: &'a str,
    /// Comma-separated `WxH` list; empty for none.
    pub sizes: &'a str,
}

/// Per-size result of an upload: the derivative URL, or why it failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SizeOutcome {
    Created(String),
    Failed(String),
}

impl SizeOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, SizeOutcome::Created(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            SizeOutcome::Created(s) | SizeOutcome::Failed(s) => s,
        }
    }
}

impl Serialize for SizeOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Result of an upload.
///
/// Serializes as `{"filename": "...", "sizes": null | {"WxH": "url-or-error"}}`.
#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub filename: String,
    /// `None` when no sizes were requested, never an empty map.
    pub sizes: Option<BTreeMap<String, SizeOutcome>>,
}

/// What a delete removed and what it could not.
#[derive(Debug, Default)]
pub struct DeleteReport {
    pub removed: Vec<PathBuf>,
    /// Files that were already gone.
    pub missing: Vec<PathBuf>,
    pub failures: Vec<(PathBuf, io::Error)>,
    /// Whether the record was still present when removed.
    pub record_removed: bool,
}

impl DeleteReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Summary of a bulk resize over all of an owner's images.
#[derive(Debug, Default)]
pub struct BulkReport {
    pub created: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// An image record together with its discovered derivatives.
#[derive(Debug, Clone, Serialize)]
pub struct ImageDetails {
    #[serde(flatten)]
    pub record: ImageRecord,
    pub derivatives: Vec<Derivative>,
}

/// Filesystem + repository orchestration over one [`Layout`].
pub struct ImageStore<B, R> {
    layout: Layout,
    backend: B,
    repository: R,
}

impl<B: ImageBackend, R: ImageRepository> ImageStore<B, R> {
    pub fn new(layout: Layout, backend: B, repository: R) -> Self {
        Self {
            layout,
            backend,
            repository,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Store a new original, record it, and generate the requested sizes.
    pub fn upload(
        &self,
        owner: &Owner,
        request: UploadRequest<'_>,
    ) -> Result<UploadOutcome, StoreError> {
        if request.bytes.is_empty() {
            return Err(StoreError::EmptyFile);
        }
        let source = self
            .backend
            .decode(request.bytes)
            .map_err(|e| StoreError::NotAnImage(e.to_string()))?;
        let sizes = parse_size_list(request.sizes)?;

        let checksum = format!("{:x}", Sha256::digest(request.bytes));
        let record = self.store_original(owner, &source, &request, &checksum)?;
        info!(
            owner = %owner,
            filename = %record.stored_filename,
            original = %record.original_filename,
            "stored original"
        );

        let sizes = sizes.map(|sizes| {
            sizes
                .into_iter()
                .map(|size| {
                    let outcome = match self.write_derivative(&record, &source, size) {
                        Ok(url) => SizeOutcome::Created(url),
                        Err(e) => {
                            warn!(filename = %record.stored_filename, %size, error = %e, "derivative failed");
                            SizeOutcome::Failed(e.to_string())
                        }
                    };
                    (size.to_string(), outcome)
                })
                .collect()
        });

        Ok(UploadOutcome {
            filename: record.stored_filename,
            sizes,
        })
    }

    /// Write the original under a fresh name and create its record.
    fn store_original(
        &self,
        owner: &Owner,
        source: &SourceImage,
        request: &UploadRequest<'_>,
        checksum: &str,
    ) -> Result<ImageRecord, StoreError> {
        for _ in 0..MAX_NAME_ATTEMPTS {
            let filename = generate_filename(source);
            let path = self.layout.original_path(owner, &filename);
            match write_new_file(&path, request.bytes) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(%filename, "name already on disk, retrying");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            let created = self.repository.create(NewImage {
                owner,
                stored_filename: &filename,
                original_filename: request.original_filename,
                checksum,
                file_size: request.bytes.len() as u64,
            });
            match created {
                Ok(record) => return Ok(record),
                Err(RepositoryError::Duplicate { .. }) => {
                    debug!(%filename, "name already recorded, retrying");
                    remove_if_exists(&path)?;
                }
                Err(e) => {
                    if let Err(cleanup) = remove_if_exists(&path) {
                        warn!(path = %path.display(), error = %cleanup, "orphaned original");
                    }
                    return Err(e.into());
                }
            }
        }
        Err(StoreError::NameExhausted(MAX_NAME_ATTEMPTS))
    }

    fn write_derivative(
        &self,
        record: &ImageRecord,
        source: &SourceImage,
        size: Size,
    ) -> Result<String, BackendError> {
        let output = self
            .layout
            .derivative_path(&record.owner, size, &record.stored_filename);
        let dims = create_derivative(&self.backend, source, size, &output)?;
        debug!(
            filename = %record.stored_filename,
            %size,
            width = dims.width,
            height = dims.height,
            "wrote derivative"
        );
        Ok(self
            .layout
            .url(&record.owner, size, &record.stored_filename))
    }

    /// Look up an owner's image, failing with [`StoreError::ImageNotFound`].
    pub fn find(&self, owner: &Owner, stored_filename: &str) -> Result<ImageRecord, StoreError> {
        self.repository
            .find(owner, stored_filename)?
            .ok_or_else(|| StoreError::ImageNotFound {
                owner: owner.clone(),
                filename: stored_filename.to_string(),
            })
    }

    /// Generate (or regenerate) one derivative of a stored image.
    pub fn resize(&self, record: &ImageRecord, size: Size) -> Result<String, StoreError> {
        let source = self.load_original(record)?;
        let url = self
            .write_derivative(record, &source, size)
            .map_err(|source| StoreError::Resize { size, source })?;
        info!(owner = %record.owner, filename = %record.stored_filename, %size, "resized");
        Ok(url)
    }

    fn load_original(&self, record: &ImageRecord) -> Result<SourceImage, StoreError> {
        let path = self
            .layout
            .original_path(&record.owner, &record.stored_filename);
        self.backend
            .load(&path)
            .map_err(|source| StoreError::Original {
                owner: record.owner.clone(),
                filename: record.stored_filename.clone(),
                source,
            })
    }

    /// Derivatives currently on disk for a record.
    pub fn derivatives(&self, record: &ImageRecord) -> Result<Vec<Derivative>, StoreError> {
        Ok(discovery::discover(
            &self.layout,
            &record.owner,
            &record.stored_filename,
        )?)
    }

    /// A record with its derivatives.
    pub fn details(&self, record: ImageRecord) -> Result<ImageDetails, StoreError> {
        let derivatives = self.derivatives(&record)?;
        Ok(ImageDetails {
            record,
            derivatives,
        })
    }

    /// All of an owner's images, newest first, with their derivatives.
    pub fn list(&self, owner: &Owner) -> Result<Vec<ImageDetails>, StoreError> {
        self.repository
            .list(owner)?
            .into_iter()
            .map(|record| self.details(record))
            .collect()
    }

    /// Remove the original, every discovered derivative, then the record.
    pub fn delete(&self, record: &ImageRecord) -> Result<DeleteReport, StoreError> {
        let mut report = DeleteReport::default();

        let derivatives = match self.derivatives(record) {
            Ok(found) => found,
            Err(e) => {
                warn!(filename = %record.stored_filename, error = %e, "derivative scan failed");
                let root = self.layout.owner_derivatives_root(&record.owner);
                report.failures.push((root, io::Error::other(e.to_string())));
                Vec::new()
            }
        };

        let original = self
            .layout
            .original_path(&record.owner, &record.stored_filename);
        let targets = std::iter::once(original).chain(derivatives.into_iter().map(|d| d.path));
        for path in targets {
            match std::fs::remove_file(&path) {
                Ok(()) => report.removed.push(path),
                Err(e) if e.kind() == io::ErrorKind::NotFound => report.missing.push(path),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "could not remove file");
                    report.failures.push((path, e));
                }
            }
        }

        report.record_removed = self.repository.delete(record)?;
        info!(
            owner = %record.owner,
            filename = %record.stored_filename,
            removed = report.removed.len(),
            failures = report.failures.len(),
            "deleted image"
        );
        Ok(report)
    }

    /// Generate `size` for every image of `owner`, in parallel on the current
    /// rayon pool. Failures are collected per image.
    pub fn resize_all(&self, owner: &Owner, size: Size) -> Result<BulkReport, StoreError> {
        let records = self.repository.list(owner)?;
        let results: Vec<(String, Result<String, StoreError>)> = records
            .par_iter()
            .map(|record| (record.stored_filename.clone(), self.resize(record, size)))
            .collect();

        let mut report = BulkReport::default();
        for (filename, result) in results {
            match result {
                Ok(url) => report.created.push(url),
                Err(e) => report.failed.push((filename, e.to_string())),
            }
        }
        Ok(report)
    }
}

/// `{32 hex}.{format}` from a random v4 UUID.
fn generate_filename(source: &SourceImage) -> String {
    format!("{}.{}", Uuid::new_v4().simple(), source.format_name())
}

/// Write bytes to a path that must not exist yet, creating parents.
fn write_new_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    create_new_with(path, |file| {
        file.write_all(bytes)?;
        file.sync_all()
    })
}

/// Create `path` exclusively and let `fill` write it. If `fill` fails the
/// partial file is removed; if `path` already exists it is left untouched
/// and the error kind is `AlreadyExists`.
fn create_new_with(
    path: &Path,
    fill: impl FnOnce(&mut File) -> io::Result<()>,
) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    if let Err(e) = fill(&mut file) {
        drop(file);
        if let Err(cleanup) = remove_if_exists(path) {
            warn!(path = %path.display(), error = %cleanup, "orphaned partial original");
        }
        return Err(e);
    }
    Ok(())
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
