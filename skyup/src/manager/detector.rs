//! Change detection between staged files and the target volume.
//!
//! Comparing whole files on removable media is slow, so each file class is
//! checked with a bounded heuristic:
//!
//! | Class | Extensions | Skip when |
//! |---|---|---|
//! | [`FileClass::BinaryObject`] | `oab` `owb` `otb` `oob` | the target's first 12 bytes equal the staged file's |
//! | [`FileClass::IndexFile`] | `xlb` | the staged file's bytes `24..36` spell the installed build |
//! | [`FileClass::Generic`] | anything else | the first `min(512, target size)` bytes match |
//!
//! A file that differs only beyond the compared window is skipped. Failures
//! while probing the target count as "not equivalent", so the file is written.

use std::fs::{self, File};
use std::io::{self, Read};
use std::ops::Range;
use std::path::Path;

use tracing::debug;

use super::error::{ManagerError, ManagerResult};
use crate::device::DeviceContext;

/// Identity header length of binary object files.
pub const OBJECT_HEADER_LEN: usize = 12;

/// Location of the embedded build number in index files.
pub const INDEX_VERSION_RANGE: Range<usize> = 24..36;

/// Maximum prefix compared for generic files.
pub const GENERIC_PREFIX_LEN: usize = 512;

const BINARY_OBJECT_EXTENSIONS: [&str; 4] = ["oab", "owb", "otb", "oob"];
const INDEX_FILE_EXTENSION: &str = "xlb";

/// Heuristic class of a file, derived from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    /// Object databases (airspaces, waypoints, ...) with a 12-byte identity header.
    BinaryObject,
    /// Firmware index files carrying the build number.
    IndexFile,
    /// Everything else.
    Generic,
}

impl FileClass {
    /// Classify by extension. Matching is case-sensitive.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if BINARY_OBJECT_EXTENSIONS.contains(&ext) => Self::BinaryObject,
            Some(INDEX_FILE_EXTENSION) => Self::IndexFile,
            _ => Self::Generic,
        }
    }
}

/// Decides whether a target file already holds a staged file's content.
#[derive(Debug, Clone, Copy)]
pub struct ChangeDetector {
    device: DeviceContext,
}

impl ChangeDetector {
    /// Create a detector for the attached device.
    pub fn new(device: DeviceContext) -> Self {
        Self { device }
    }

    /// Read the staged file and decide whether writing it can be skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::ReadFailed`] if the staged file cannot be read.
    /// Problems reading the target never produce an error.
    pub fn should_skip(&self, staged_file: &Path, target: &Path) -> ManagerResult<bool> {
        let staged = fs::read(staged_file).map_err(|e| ManagerError::ReadFailed {
            path: staged_file.to_path_buf(),
            source: e,
        })?;
        Ok(self.is_equivalent(&staged, target, FileClass::from_path(staged_file)))
    }

    /// Apply the heuristic for `class` to already-loaded staged bytes.
    pub fn is_equivalent(&self, staged: &[u8], target: &Path, class: FileClass) -> bool {
        let equivalent = match class {
            FileClass::BinaryObject => object_header_matches(staged, target),
            FileClass::IndexFile => index_version_matches(staged, self.device.software_version),
            FileClass::Generic => generic_prefix_matches(staged, target),
        };
        debug!(target = %target.display(), ?class, equivalent, "Compared staged file");
        equivalent
    }
}

/// Size of the target if it is an existing regular file.
fn target_len(target: &Path) -> Option<u64> {
    fs::metadata(target)
        .ok()
        .filter(|metadata| metadata.is_file())
        .map(|metadata| metadata.len())
}

/// Read at most `limit` bytes from the start of `path`.
fn read_prefix(path: &Path, limit: usize) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(limit);
    File::open(path)?
        .take(limit as u64)
        .read_to_end(&mut buffer)?;
    Ok(buffer)
}

fn object_header_matches(staged: &[u8], target: &Path) -> bool {
    match target_len(target) {
        Some(len) if len >= OBJECT_HEADER_LEN as u64 => {
            match read_prefix(target, OBJECT_HEADER_LEN) {
                Ok(header) => {
                    header.len() == OBJECT_HEADER_LEN
                        && staged.get(..OBJECT_HEADER_LEN) == Some(header.as_slice())
                }
                Err(_) => false,
            }
        }
        _ => false,
    }
}

/// Build number embedded in an index file, if well-formed.
pub fn embedded_index_version(staged: &[u8]) -> Option<u64> {
    let field = staged.get(INDEX_VERSION_RANGE)?;
    std::str::from_utf8(field).ok()?.parse().ok()
}

fn index_version_matches(staged: &[u8], installed_version: u64) -> bool {
    embedded_index_version(staged) == Some(installed_version)
}

fn generic_prefix_matches(staged: &[u8], target: &Path) -> bool {
    match target_len(target) {
        Some(len) if len > 0 => match read_prefix(target, GENERIC_PREFIX_LEN) {
            Ok(prefix) => !prefix.is_empty() && staged.get(..prefix.len()) == Some(prefix.as_slice()),
            Err(_) => false,
        },
        _ => false,
    }
}
