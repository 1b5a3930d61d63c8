//! Archive export.
//!
//! An archive holds one PNG per exported image, either as loose files in a
//! directory ([`write_archive`]) or bundled into a single zip file
//! ([`write_zip_archive`]). Entries are encoded in parallel and written under
//! unique names: the first occurrence of a name keeps it, repeats get `-2`,
//! `-3`, ... before the extension. Every entry lands in the archive exactly
//! once.

use crate::imaging::{Image, SampleError, encode_png};
use crate::naming::{split_archive_name, unique_names};
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode {name}: {source}")]
    Encode {
        name: String,
        #[source]
        source: SampleError,
    },
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// One image to export and the name it should get.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub name: String,
    pub image: Image,
}

/// A written archive file. For a zip archive, `path` is the zip itself and
/// `name` the entry inside it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WrittenFile {
    pub name: String,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// Name images `split_image_1.png`, `split_image_2.png`, ... in order.
pub fn numbered_entries(images: impl IntoIterator<Item = Image>) -> Vec<ArchiveEntry> {
    images
        .into_iter()
        .enumerate()
        .map(|(i, image)| ArchiveEntry {
            name: split_archive_name(i + 1),
            image,
        })
        .collect()
}

/// Pick unique names and encode every entry, failing before any I/O.
fn encode_entries(
    entries: &[ArchiveEntry],
) -> Result<Vec<(String, &ArchiveEntry, Vec<u8>)>, ArchiveError> {
    let names = unique_names(&entries.iter().map(|e| e.name.as_str()).collect::<Vec<_>>());

    entries
        .par_iter()
        .zip(names.into_par_iter())
        .map(|(entry, name)| match encode_png(&entry.image) {
            Ok(bytes) => Ok((name, entry, bytes)),
            Err(source) => Err(ArchiveError::Encode { name, source }),
        })
        .collect()
}

fn written(name: String, path: PathBuf, entry: &ArchiveEntry) -> WrittenFile {
    WrittenFile {
        name,
        path,
        width: entry.image.width(),
        height: entry.image.height(),
    }
}

/// Encode every entry and write it into `dir`, creating `dir` if needed.
///
/// Encoding finishes for all entries before anything is written, so an
/// encode failure leaves the directory untouched.
pub fn write_archive(dir: &Path, entries: &[ArchiveEntry]) -> Result<Vec<WrittenFile>, ArchiveError> {
    let encoded = encode_entries(entries)?;

    fs::create_dir_all(dir)?;
    let mut files = Vec::with_capacity(encoded.len());
    for (name, entry, bytes) in encoded {
        let path = dir.join(&name);
        fs::write(&path, bytes)?;
        files.push(written(name, path, entry));
    }
    Ok(files)
}

/// Encode every entry and bundle them into one zip file at `path`.
///
/// PNG data is already compressed, so entries are stored as-is. Nothing is
/// created when an entry fails to encode.
pub fn write_zip_archive(
    path: &Path,
    entries: &[ArchiveEntry],
) -> Result<Vec<WrittenFile>, ArchiveError> {
    let encoded = encode_entries(entries)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut zip = ZipWriter::new(fs::File::create(path)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let mut files = Vec::with_capacity(encoded.len());
    for (name, entry, bytes) in encoded {
        zip.start_file(name.as_str(), options)?;
        zip.write_all(&bytes)?;
        files.push(written(name, path.to_path_buf(), entry));
    }
    zip.finish()?;
    Ok(files)
}
