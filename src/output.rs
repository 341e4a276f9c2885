//! CLI output formatting for every command.
//!
//! # Output Format
//!
//! ## Upload
//!
//! The upload result is the JSON payload clients consume:
//!
//! ```text
//! {"filename": "3f0c…9a.png", "sizes": {"150x150": "http://…", "200x200": "http://…"}}
//! ```
//!
//! ## Show / List
//!
//! ```text
//! 3f0c…9a.png (holiday.png)
//!     Uploaded: 2024-05-01 12:00:00 UTC
//!     Size: 1.25 Mb
//!     150x150 → http://…/alice/150x150/3f0c…9a.png
//! ```
//!
//! ## Delete
//!
//! ```text
//! Deleted 3f0c…9a.png (3 files removed)
//!     Missing: data/originals/alice/3f0c…9a.png
//!     Failed: data/resizes/alice/10x10/3f0c…9a.png: permission denied
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::store::{BulkReport, DeleteReport, ImageDetails, UploadOutcome};

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Bytes as megabytes with two decimals.
pub fn format_megabytes(bytes: u64) -> String {
    format!("{:.2} Mb", bytes as f64 / (1024.0 * 1024.0))
}

// ============================================================================
// Upload / resize
// ============================================================================

/// Pretty JSON for an upload outcome.
pub fn format_upload(outcome: &UploadOutcome) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(outcome)
}

pub fn print_upload(outcome: &UploadOutcome) -> Result<(), serde_json::Error> {
    println!("{}", format_upload(outcome)?);
    Ok(())
}

pub fn print_resize(url: &str) {
    println!("{}", url);
}

// ============================================================================
// Show / list
// ============================================================================

/// One image: header line, then indented record details and derivatives.
pub fn format_details(details: &ImageDetails) -> Vec<String> {
    let record = &details.record;
    let mut lines = vec![format!(
        "{} ({})",
        record.stored_filename, record.original_filename
    )];
    lines.push(format!(
        "{}Uploaded: {}",
        indent(1),
        record.upload_time.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    lines.push(format!(
        "{}Size: {}",
        indent(1),
        format_megabytes(record.file_size)
    ));
    if details.derivatives.is_empty() {
        lines.push(format!("{}No resizes", indent(1)));
    }
    for derivative in &details.derivatives {
        lines.push(format!(
            "{}{} \u{2192} {}",
            indent(1),
            derivative.size,
            derivative.url
        ));
    }
    lines
}

pub fn print_details(details: &ImageDetails) {
    for line in format_details(details) {
        println!("{}", line);
    }
}

/// All of an owner's images, separated by blank lines, with a count footer.
pub fn format_list(images: &[ImageDetails]) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, details) in images.iter().enumerate() {
        if i > 0 {
            lines.push(String::new());
        }
        lines.extend(format_details(details));
    }
    let total: u64 = images.iter().map(|d| d.record.file_size).sum();
    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(format!(
        "{} images, {}",
        images.len(),
        format_megabytes(total)
    ));
    lines
}

pub fn print_list(images: &[ImageDetails]) {
    for line in format_list(images) {
        println!("{}", line);
    }
}

// ============================================================================
// Delete / bulk resize
// ============================================================================

pub fn format_delete(filename: &str, report: &DeleteReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Deleted {} ({} files removed)",
        filename,
        report.removed.len()
    )];
    for path in &report.missing {
        lines.push(format!("{}Missing: {}", indent(1), path.display()));
    }
    for (path, err) in &report.failures {
        lines.push(format!("{}Failed: {}: {}", indent(1), path.display(), err));
    }
    lines
}

pub fn print_delete(filename: &str, report: &DeleteReport) {
    for line in format_delete(filename, report) {
        println!("{}", line);
    }
}

pub fn format_bulk(report: &BulkReport) -> Vec<String> {
    let mut lines: Vec<String> = report.created.clone();
    for (filename, err) in &report.failed {
        lines.push(format!("Failed {}: {}", filename, err));
    }
    lines.push(format!(
        "Created {} resizes, {} failed",
        report.created.len(),
        report.failed.len()
    ));
    lines
}

pub fn print_bulk(report: &BulkReport) {
    for line in format_bulk(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================
