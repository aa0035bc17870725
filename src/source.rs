//! Layer source validation
//!
//! Checks that a layer source exists and matches its declared kind before
//! any archiving work starts.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use stratum_oci::Compression;
use thiserror::Error;

use crate::request::LayerKind;

/// Why a layer source was rejected.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SourceError {
    #[error("empty image layer data source")]
    Empty,

    #[error("image layer data source path doesn't exist - {}", .0.display())]
    NotFound(PathBuf),

    #[error("image layer data source path is not a {expected} - {}", .path.display())]
    WrongType {
        path: PathBuf,
        expected: &'static str,
    },

    #[error("image layer data source path is not a tar file - {}", .0.display())]
    NotAnArchive(PathBuf),
}

/// Confirm `path` can serve as a layer source of the given kind.
pub fn validate_source(path: &Path, kind: LayerKind) -> Result<(), SourceError> {
    if path.as_os_str().is_empty() {
        return Err(SourceError::Empty);
    }

    if !exists(path) {
        return Err(SourceError::NotFound(path.to_path_buf()));
    }

    match kind {
        LayerKind::Archive => {
            if !is_regular_file(path) {
                return Err(SourceError::WrongType {
                    path: path.to_path_buf(),
                    expected: "file",
                });
            }
            if !is_archive_file(path) {
                return Err(SourceError::NotAnArchive(path.to_path_buf()));
            }
        }
        LayerKind::Directory => {
            if !is_dir(path) {
                return Err(SourceError::WrongType {
                    path: path.to_path_buf(),
                    expected: "directory",
                });
            }
        }
    }

    Ok(())
}

pub fn exists(path: &Path) -> bool {
    path.exists()
}

pub fn is_regular_file(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

pub fn is_dir(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
}

/// Returns `true` when the first tar header of `path` reads cleanly.
///
/// Gzip and zstd compressed archives are decompressed on the fly. An
/// archive with no entries at all is not accepted.
pub fn is_archive_file(path: &Path) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    let mut reader = BufReader::new(file);
    let compression = match reader.fill_buf() {
        Ok(prefix) => Compression::detect(prefix),
        Err(_) => return false,
    };
    let Ok(stream) = compression.reader(reader) else {
        return false;
    };

    let mut archive = tar::Archive::new(stream);
    let first = archive.entries().map(|mut entries| entries.next());
    matches!(first, Ok(Some(Ok(_))))
}
