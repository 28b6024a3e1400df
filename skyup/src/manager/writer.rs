//! Atomic, retry-aware writes to the target volume.
//!
//! Every write replaces the whole file: content goes to a temporary file next
//! to the target and is renamed over it once complete. Readers see either the
//! previous content or the new content, never a mix.
//!
//! Removable media sometimes report stale file handles (`ESTALE`) for a short
//! while after heavy I/O. Those failures are retried according to a
//! [`RetryPolicy`]; all other errors surface immediately.

use std::fmt;
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::{ManagerError, ManagerResult};
use super::retry::RetryPolicy;

/// Prefix of temporary files created next to write targets.
const TEMP_PREFIX: &str = ".skyup-";

/// Mode requested for files that do not exist yet; the umask still applies.
#[cfg(unix)]
const NEW_FILE_MODE: u32 = 0o644;

/// Whole-file atomic replacement of a target.
pub trait AtomicCommit: Send + Sync {
    /// Replace `target` with `buffer`.
    ///
    /// On error the target must be left absent or with its previous content.
    fn commit(&self, buffer: &[u8], target: &Path) -> io::Result<()>;
}

/// [`AtomicCommit`] via a sibling temp file and rename.
#[derive(Debug, Default, Clone, Copy)]
pub struct TempFileCommit;

impl TempFileCommit {
    /// Stream `reader` into a sibling temp file, then rename it over `target`.
    ///
    /// A replaced file keeps the permissions of the file it replaces. If
    /// reading or writing fails the temp file is removed and the target is
    /// not touched.
    pub fn commit_from_reader<R: Read>(&self, mut reader: R, target: &Path) -> io::Result<()> {
        let parent = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let existing = fs::metadata(target).ok().map(|m| m.permissions());

        let mut builder = tempfile::Builder::new();
        builder.prefix(TEMP_PREFIX);
        if existing.is_none() {
            if let Some(permissions) = new_file_permissions() {
                builder.permissions(permissions);
            }
        }

        let mut temp = builder.tempfile_in(parent)?;
        io::copy(&mut reader, &mut temp)?;
        temp.flush()?;
        if let Some(permissions) = existing {
            temp.as_file().set_permissions(permissions)?;
        }
        temp.as_file().sync_all()?;
        temp.persist(target).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(unix)]
fn new_file_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(fs::Permissions::from_mode(NEW_FILE_MODE))
}

#[cfg(not(unix))]
fn new_file_permissions() -> Option<fs::Permissions> {
    None
}

impl AtomicCommit for TempFileCommit {
    fn commit(&self, buffer: &[u8], target: &Path) -> io::Result<()> {
        self.commit_from_reader(buffer, target)
    }
}

/// Whether an I/O error is the stale-file-handle condition.
#[cfg(unix)]
pub fn is_stale_handle(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::ESTALE)
}

/// Whether an I/O error is the stale-file-handle condition.
#[cfg(not(unix))]
pub fn is_stale_handle(_e: &io::Error) -> bool {
    false
}

/// Writes files to the target volume, retrying transient failures.
#[derive(Clone)]
pub struct ResilientWriter {
    policy: RetryPolicy,
    commit: Arc<dyn AtomicCommit>,
    is_transient: fn(&io::Error) -> bool,
    cancel: Option<CancellationToken>,
}

impl fmt::Debug for ResilientWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientWriter")
            .field("policy", &self.policy)
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

impl Default for ResilientWriter {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl ResilientWriter {
    /// Create a writer committing through [`TempFileCommit`].
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            commit: Arc::new(TempFileCommit),
            is_transient: is_stale_handle,
            cancel: None,
        }
    }

    /// Replace the commit strategy.
    pub fn with_commit(mut self, commit: Arc<dyn AtomicCommit>) -> Self {
        self.commit = commit;
        self
    }

    /// Replace the predicate deciding which errors are retried.
    pub fn with_transient_classifier(mut self, is_transient: fn(&io::Error) -> bool) -> Self {
        self.is_transient = is_transient;
        self
    }

    /// Abort back-off waits when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The retry policy in use.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Atomically replace `target` with `buffer`.
    ///
    /// Each attempt runs on the blocking pool. Transient failures are retried
    /// after the policy's delay until the attempt budget is spent.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::WriteFailed`] carrying the last I/O error when
    /// a non-transient error occurs, the attempts run out, or cancellation
    /// interrupts a back-off wait.
    pub async fn write(&self, buffer: Bytes, target: &Path) -> ManagerResult<()> {
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let commit = Arc::clone(&self.commit);
            let data = buffer.clone();
            let path = target.to_path_buf();
            let result = tokio::task::spawn_blocking(move || commit.commit(&data, &path)).await?;

            let error = match result {
                Ok(()) => {
                    if attempt > 1 {
                        debug!(target = %target.display(), attempt, "Write succeeded after retry");
                    }
                    return Ok(());
                }
                Err(e) => e,
            };

            let failed = |source: io::Error| ManagerError::WriteFailed {
                path: target.to_path_buf(),
                attempts: attempt,
                source,
            };

            if !(self.is_transient)(&error) {
                return Err(failed(error));
            }

            let Some(delay) = self.policy.delay_for_attempt(attempt) else {
                return Err(failed(error));
            };

            warn!(
                target = %target.display(),
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Transient write failure, retrying"
            );

            match &self.cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => return Err(failed(error)),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => tokio::time::sleep(delay).await,
            }
        }
    }
}
