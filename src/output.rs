//! CLI output formatting.
//!
//! Output is **information-first**: the primary line for every result
//! names what was produced, with the source and byte counts shown as
//! indented context lines.
//!
//! # Output Format
//!
//! ## Single image
//!
//! ```text
//! portrait.jpg → portrait-small.webp
//!     320x240 webp
//!     18234 bytes
//! ```
//!
//! ## Batch
//!
//! ```text
//! Batch transform: 3 succeeded, 1 failed
//! Entries
//! 001 transformed_6f1c….png
//! 002 transformed_9a02….png
//! 003 transformed_c3d4….png
//! Failures
//! 001 missing-id
//!     not_found: not found: asset missing-id
//! Archive: batch.zip (48213 bytes)
//! ```
//!
//! Each `format_*` function is pure and returns lines for testability;
//! the `print_*` wrappers write them to stdout.

use crate::batch::{Archive, FailureRecord};
use crate::pipeline::PipelineOutput;
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ============================================================================
// Single-image results
// ============================================================================

pub fn format_output(source: &Path, destination: &Path, output: &PipelineOutput) -> Vec<String> {
    vec![
        format!("{} → {}", display_name(source), destination.display()),
        format!("{}{}x{} {}", indent(1), output.width, output.height, output.format),
        format!("{}{} bytes", indent(1), output.len()),
    ]
}

pub fn print_output(source: &Path, destination: &Path, output: &PipelineOutput) {
    for line in format_output(source, destination, output) {
        println!("{}", line);
    }
}

// ============================================================================
// Batch results
// ============================================================================

pub fn format_batch_output(operation: &str, archive: &Archive, destination: &Path) -> Vec<String> {
    let mut lines = vec![format!(
        "Batch {}: {} succeeded, {} failed",
        operation,
        archive.entries.len(),
        archive.failures.len()
    )];

    if !archive.entries.is_empty() {
        lines.push("Entries".to_string());
        for (i, entry) in archive.entries.iter().enumerate() {
            lines.push(format!("{} {}", format_index(i + 1), entry));
        }
    }

    push_failures(&mut lines, "Failures", &archive.failures);

    lines.push(format!(
        "Archive: {} ({} bytes)",
        destination.display(),
        archive.bytes.len()
    ));
    lines
}

pub fn print_batch_output(operation: &str, archive: &Archive, destination: &Path) {
    for line in format_batch_output(operation, archive, destination) {
        println!("{}", line);
    }
}

/// Files that were never stored, so never reached the batch.
pub fn format_rejected_uploads(rejected: &[FailureRecord]) -> Vec<String> {
    let mut lines = Vec::new();
    push_failures(&mut lines, "Rejected uploads", rejected);
    lines
}

pub fn print_rejected_uploads(rejected: &[FailureRecord]) {
    for line in format_rejected_uploads(rejected) {
        println!("{}", line);
    }
}

fn push_failures(lines: &mut Vec<String>, heading: &str, failures: &[FailureRecord]) {
    if failures.is_empty() {
        return;
    }
    lines.push(heading.to_string());
    for (i, failure) in failures.iter().enumerate() {
        lines.push(format!("{} {}", format_index(i + 1), failure.id));
        lines.push(format!("{}{}: {}", indent(1), failure.kind, failure.reason));
    }
}
