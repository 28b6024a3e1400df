//! Configuration for the update engine.

use std::path::PathBuf;
use std::time::Duration;

use super::download::DEFAULT_CONNECT_TIMEOUT_SECS;
use super::retry::RetryPolicy;
use crate::device::DEFAULT_BASE_URL;

/// Configuration for the [`Updater`](super::Updater).
#[derive(Debug, Clone, PartialEq)]
pub struct UpdaterConfig {
    /// Root under which per-archive staging directories are created.
    ///
    /// Staging directories are removed when their pipeline ends.
    pub staging_dir: PathBuf,

    /// Base of the archive URL table.
    pub base_url: String,

    /// Retry policy for writes to the target volume.
    pub write_policy: RetryPolicy,

    /// HTTP connect timeout.
    pub connect_timeout: Duration,

    /// Whole-request HTTP timeout. `None` leaves downloads unbounded.
    pub read_timeout: Option<Duration>,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            staging_dir: std::env::temp_dir().join("skyup-staging"),
            base_url: DEFAULT_BASE_URL.to_string(),
            write_policy: RetryPolicy::stale_handle(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            read_timeout: None,
        }
    }
}

impl UpdaterConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the staging directory.
    pub fn with_staging_dir(mut self, path: PathBuf) -> Self {
        self.staging_dir = path;
        self
    }

    /// Set the archive base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the write retry policy.
    pub fn with_write_policy(mut self, policy: RetryPolicy) -> Self {
        self.write_policy = policy;
        self
    }

    /// Set the HTTP connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set or clear the whole-request HTTP timeout.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }
}
