//! Input discovery and decoding.
//!
//! Turns the paths given on the command line into decoded images ready to be
//! added to a batch:
//!
//! ```text
//! photos/                 # Directory: walked recursively, sorted by path
//! ├── .thumbs/            # Hidden entries are skipped
//! ├── beach.jpg           # Supported extension: collected
//! ├── notes.txt           # Anything else: ignored
//! └── trip/
//!     └── 001-tokyo.png
//! cover.webp              # File argument: collected if its extension is supported
//! ```
//!
//! Decoding happens in parallel and stops at the batch's free slots: files
//! past the limit are counted, never read. A file that fails to decode is
//! reported on its own and never becomes a work item; the rest still load.

use crate::imaging::{DecodeError, Image, open_image, supported_input_extensions};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Input not found: {0}")]
    NotFound(PathBuf),
}

/// A successfully decoded input file.
#[derive(Debug, Clone)]
pub struct DecodedInput {
    pub path: PathBuf,
    /// File name shown in the batch and used to derive download names.
    pub name: String,
    pub image: Image,
}

/// Everything produced by [`decode_inputs`].
#[derive(Debug, Default)]
pub struct DecodedInputs {
    pub images: Vec<DecodedInput>,
    pub failures: Vec<(PathBuf, DecodeError)>,
    /// Files left unread because the batch had no room for them.
    pub skipped: usize,
}

/// Whether `path` has an extension with a decoder compiled in.
pub fn is_supported(path: &Path) -> bool {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    supported_input_extensions().contains(&ext.as_str())
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

/// Expand files and directories into the list of image files to load.
///
/// Argument order is preserved; files found under one directory are sorted.
/// Duplicate paths are kept only once.
pub fn collect_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>, ScanError> {
    let mut files = Vec::new();
    for path in paths {
        if !path.exists() {
            return Err(ScanError::NotFound(path.clone()));
        }
        if path.is_file() {
            if is_supported(path) {
                files.push(path.clone());
            }
            continue;
        }
        let walker = WalkDir::new(path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e));
        for entry in walker {
            let entry = entry?;
            if entry.file_type().is_file() && is_supported(entry.path()) {
                files.push(entry.into_path());
            }
        }
    }

    let mut seen = std::collections::HashSet::new();
    files.retain(|p| seen.insert(p.clone()));
    Ok(files)
}

/// Decode the first `limit` files in parallel, keeping input order for the
/// successes.
pub fn decode_inputs(files: &[PathBuf], limit: usize) -> DecodedInputs {
    let (wanted, rest) = files.split_at(limit.min(files.len()));
    let results: Vec<_> = wanted
        .par_iter()
        .map(|path| (path, open_image(path)))
        .collect();

    let mut out = DecodedInputs {
        skipped: rest.len(),
        ..DecodedInputs::default()
    };
    for (path, result) in results {
        match result {
            Ok(image) => out.images.push(DecodedInput {
                path: path.clone(),
                name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                image,
            }),
            Err(e) => out.failures.push((path.clone(), e)),
        }
    }
    out
}
