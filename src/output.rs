//! CLI output formatting for every command.
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.
//!
//! # Output Format
//!
//! ## Intake
//!
//! ```text
//! Loaded 3 images
//! Dropped 2 images (batch limit 20)
//! Skipped broken.jpg: Malformed image broken.jpg: ...
//! ```
//!
//! ## Batch events
//!
//! ```text
//! Processing 3 items
//!     crop-1: processing
//!     crop-1: completed
//!     crop-2: processing
//!     crop-2: failed
//!         Error: Service failed: timeout
//! Done: 1 completed, 1 failed, 1 skipped
//! ```
//!
//! ## Split
//!
//! ```text
//! poster.jpg → 3x3 grid (9 tiles)
//!     001 tile-0 640x360
//!     002 tile-1 640x360 (enhanced 3840x2160)
//! ```
//!
//! ## Export
//!
//! ```text
//! 001 split_image_1.png (640x360)
//! 002 split_image_2.png (640x360)
//! Wrote 2 files → out/
//! ```

use crate::archive::WrittenFile;
use crate::batch::{AddOutcome, BatchEvent};
use crate::imaging::{DecodeError, GridSpec};
use crate::types::WorkItem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

// ============================================================================
// Intake
// ============================================================================

/// Summarize which inputs made it into the batch.
pub fn format_intake(
    outcome: &AddOutcome,
    limit: usize,
    failures: &[(PathBuf, DecodeError)],
) -> Vec<String> {
    let mut lines = vec![format!("Loaded {}", plural(outcome.accepted, "image"))];
    if outcome.dropped > 0 {
        lines.push(format!(
            "Dropped {} (batch limit {})",
            plural(outcome.dropped, "image"),
            limit
        ));
    }
    for (path, err) in failures {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        lines.push(format!("Skipped {}: {}", name, err));
    }
    lines
}

pub fn print_intake(outcome: &AddOutcome, limit: usize, failures: &[(PathBuf, DecodeError)]) {
    for line in format_intake(outcome, limit, failures) {
        println!("{}", line);
    }
}

// ============================================================================
// Batch events
// ============================================================================

/// Format a single batch event as display lines.
pub fn format_batch_event(event: &BatchEvent) -> Vec<String> {
    match event {
        BatchEvent::RunStarted { items } => vec![format!("Processing {}", plural(*items, "item"))],
        BatchEvent::StatusChanged { id, status } => {
            vec![format!("{}{}: {}", indent(1), id, status)]
        }
        BatchEvent::ItemFailed { message, .. } => {
            vec![format!("{}Error: {}", indent(2), message)]
        }
        BatchEvent::RunFinished(summary) => vec![format!(
            "Done: {} completed, {} failed, {} skipped",
            summary.completed, summary.failed, summary.skipped
        )],
        BatchEvent::RunCancelled => vec!["Cancelled".to_string()],
    }
}

// ============================================================================
// Split
// ============================================================================

/// Format the tiles of one split, enhanced sizes shown alongside.
pub fn format_split_output(source: &str, grid: GridSpec, tiles: &[Arc<WorkItem>]) -> Vec<String> {
    let mut lines = vec![format!(
        "{} \u{2192} {}x{} grid ({})",
        source,
        grid.cols,
        grid.rows,
        plural(tiles.len(), "tile")
    )];
    for (i, tile) in tiles.iter().enumerate() {
        let mut line = format!(
            "{}{} {} {}x{}",
            indent(1),
            format_index(i + 1),
            tile.id,
            tile.source.width(),
            tile.source.height()
        );
        if let Some(result) = &tile.result {
            line.push_str(&format!(" (enhanced {}x{})", result.width(), result.height()));
        }
        if let Some(err) = &tile.error {
            line.push_str(&format!(" (failed: {})", err));
        }
        lines.push(line);
    }
    lines
}

pub fn print_split_output(source: &str, grid: GridSpec, tiles: &[Arc<WorkItem>]) {
    for line in format_split_output(source, grid, tiles) {
        println!("{}", line);
    }
}

// ============================================================================
// Export
// ============================================================================

/// Format the files written by an export.
pub fn format_export_output(dir: &Path, written: &[WrittenFile]) -> Vec<String> {
    let mut lines: Vec<String> = written
        .iter()
        .enumerate()
        .map(|(i, file)| {
            format!(
                "{} {} ({}x{})",
                format_index(i + 1),
                file.name,
                file.width,
                file.height
            )
        })
        .collect();
    lines.push(format!(
        "Wrote {} \u{2192} {}",
        plural(written.len(), "file"),
        dir.display()
    ));
    lines
}

pub fn print_export_output(dir: &Path, written: &[WrittenFile]) {
    for line in format_export_output(dir, written) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================
