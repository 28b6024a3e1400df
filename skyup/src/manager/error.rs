//! Error types for the update engine.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for update engine operations.
pub type ManagerResult<T> = Result<T, ManagerError>;

/// Errors that can occur while updating a device volume.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The archive URL could not be parsed.
    #[error("invalid archive URL '{url}': {reason}")]
    BadUrl { url: String, reason: String },

    /// The server answered with a non-success status.
    #[error("server returned {status} for {url}")]
    NotOkResponse { url: String, status: u16 },

    /// The transfer failed at the network level.
    #[error("failed to download {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Archive extraction failed.
    #[error("failed to extract archive into {}: {reason}", path.display())]
    ExtractionFailed { path: PathBuf, reason: String },

    /// Failed to read a file or directory.
    #[error("failed to read {}: {source}", path.display())]
    ReadFailed { path: PathBuf, source: io::Error },

    /// Failed to write a file to the target volume.
    #[error("failed to write {} after {attempts} attempt(s): {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        attempts: u32,
        source: io::Error,
    },

    /// Failed to create a directory.
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDirFailed { path: PathBuf, source: io::Error },

    /// The target volume root is missing or not a directory.
    #[error("target volume is not accessible: {}", path.display())]
    VolumeUnavailable { path: PathBuf },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The update was cancelled between entries.
    #[error("update cancelled")]
    Cancelled,

    /// A background task panicked or was aborted.
    #[error("background task failed: {0}")]
    TaskFailed(String),
}

impl ManagerError {
    /// Archive acquisition failures (URL, HTTP status, transport).
    pub fn is_acquisition(&self) -> bool {
        matches!(
            self,
            Self::BadUrl { .. } | Self::NotOkResponse { .. } | Self::Transport { .. }
        )
    }

    /// Archive extraction failures.
    pub fn is_extraction(&self) -> bool {
        matches!(self, Self::ExtractionFailed { .. })
    }

    /// Failures writing to the target volume.
    pub fn is_write(&self) -> bool {
        matches!(self, Self::WriteFailed { .. } | Self::CreateDirFailed { .. })
    }
}

impl From<tokio::task::JoinError> for ManagerError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::TaskFailed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_ok_response_display() {
        let err = ManagerError::NotOkResponse {
            url: "https://example.com/a.tar".to_string(),
            status: 404,
        };
        assert_eq!(
            err.to_string(),
            "server returned 404 for https://example.com/a.tar"
        );
        assert!(err.is_acquisition());
        assert!(!err.is_write());
    }

    #[test]
    fn test_write_failed_display_and_source() {
        let err = ManagerError::WriteFailed {
            path: PathBuf::from("/media/SKYTRAXX/a.txt"),
            attempts: 10,
            source: io::Error::new(io::ErrorKind::Other, "stale"),
        };
        assert!(err.to_string().contains("after 10 attempt(s)"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.is_write());
    }

    #[test]
    fn test_extraction_classification() {
        let err = ManagerError::ExtractionFailed {
            path: PathBuf::from("/tmp/x"),
            reason: "bad header".to_string(),
        };
        assert!(err.is_extraction());
        assert!(!err.is_acquisition());
    }
}
