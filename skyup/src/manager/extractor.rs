//! Archive extraction into a private staging directory.
//!
//! This module handles:
//! - Creating a disposable per-archive staging directory
//! - Unpacking tar (optionally gzip-compressed) archives from memory
//! - Enumerating the staged tree in a deterministic order
//!
//! The staged tree is walked twice: once to count entries so install
//! progress is known up front, then again to process them.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tempfile::TempDir;
use walkdir::WalkDir;

use super::error::{ManagerError, ManagerResult};
use crate::device::ArchiveKind;

/// Leading bytes of a gzip stream.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Unpacks archive bytes into a directory.
pub trait ArchiveExtractor: Send + Sync {
    /// Materialize the archive's tree under `dest_dir`.
    fn extract(&self, archive: &[u8], dest_dir: &Path) -> ManagerResult<()>;
}

/// Extractor for tar archives, with transparent gzip support.
#[derive(Debug, Default, Clone, Copy)]
pub struct TarExtractor;

impl TarExtractor {
    /// Create a new tar extractor.
    pub fn new() -> Self {
        Self
    }

    fn unpack<R: Read>(&self, reader: R, dest_dir: &Path) -> ManagerResult<()> {
        let mut archive = Archive::new(reader);
        archive.set_overwrite(true);
        archive
            .unpack(dest_dir)
            .map_err(|e| ManagerError::ExtractionFailed {
                path: dest_dir.to_path_buf(),
                reason: e.to_string(),
            })
    }
}

impl ArchiveExtractor for TarExtractor {
    fn extract(&self, archive: &[u8], dest_dir: &Path) -> ManagerResult<()> {
        fs::create_dir_all(dest_dir).map_err(|e| ManagerError::CreateDirFailed {
            path: dest_dir.to_path_buf(),
            source: e,
        })?;

        if archive.starts_with(&GZIP_MAGIC) {
            self.unpack(GzDecoder::new(archive), dest_dir)
        } else {
            self.unpack(archive, dest_dir)
        }
    }
}

/// Create a fresh staging directory for one archive under `staging_root`.
///
/// The directory is deleted when the returned [`TempDir`] is dropped.
pub fn create_staging_dir(staging_root: &Path, kind: ArchiveKind) -> ManagerResult<TempDir> {
    fs::create_dir_all(staging_root).map_err(|e| ManagerError::CreateDirFailed {
        path: staging_root.to_path_buf(),
        source: e,
    })?;

    tempfile::Builder::new()
        .prefix(&format!("skyup-{}-", kind.name()))
        .tempdir_in(staging_root)
        .map_err(|e| ManagerError::CreateDirFailed {
            path: staging_root.to_path_buf(),
            source: e,
        })
}

/// Type of a staged entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A directory.
    Directory,
    /// A regular file.
    File,
    /// Symlinks and special files; these are not copied.
    Other,
}

/// One entry of the staged tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedEntry {
    /// Absolute path inside the staging directory.
    pub path: PathBuf,
    /// Path relative to the staging root.
    pub relative: PathBuf,
    /// Entry type.
    pub kind: EntryKind,
}

/// A fully unpacked archive, read-only once extraction finishes.
#[derive(Debug, Clone)]
pub struct StagedTree {
    root: PathBuf,
}

impl StagedTree {
    /// Wrap an extracted staging directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Staging root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Pre-order walk, parents before children, siblings by file name.
    fn walker(&self) -> walkdir::IntoIter {
        WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
    }

    fn walk_error(&self, e: walkdir::Error) -> ManagerError {
        let path = e
            .path()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        ManagerError::ReadFailed {
            path,
            source: io::Error::from(e),
        }
    }

    /// Count every file and directory below the root (first pass).
    pub fn count_entries(&self) -> ManagerResult<usize> {
        let mut count = 0;
        for entry in self.walker() {
            entry.map_err(|e| self.walk_error(e))?;
            count += 1;
        }
        Ok(count)
    }

    /// Enumerate the entries in the same order as [`count_entries`](Self::count_entries).
    pub fn entries(&self) -> impl Iterator<Item = ManagerResult<StagedEntry>> + '_ {
        self.walker().map(move |entry| {
            let entry = entry.map_err(|e| self.walk_error(e))?;
            let file_type = entry.file_type();
            let kind = if file_type.is_dir() {
                EntryKind::Directory
            } else if file_type.is_file() {
                EntryKind::File
            } else {
                EntryKind::Other
            };
            let path = entry.into_path();
            let relative = path
                .strip_prefix(&self.root)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| path.clone());
            Ok(StagedEntry {
                path,
                relative,
                kind,
            })
        })
    }
}
