//! Archive acquisition.
//!
//! This module streams remote archives into memory:
//! - The [`ArchiveFetcher`] trait, implemented over HTTP by [`HttpFetcher`]
//! - The [`DownloadProgress`] consumer notified after every chunk
//! - [`DownloadBuffer`], the transport-independent chunk accumulator
//!
//! # Architecture
//!
//! ```text
//! ArchiveFetcher (trait)
//!         │
//!         ├── HttpFetcher ── reqwest response chunks
//!         │        │
//!         │        └── DownloadBuffer (bytes + fraction)
//!         │
//!         └── DownloadProgress (chunk / completion notifications)
//! ```
//!
//! There is no resume support: every fetch starts from byte zero.

mod buffer;
mod http;

pub use buffer::DownloadBuffer;
pub use http::{HttpFetcher, DEFAULT_CONNECT_TIMEOUT_SECS};

use bytes::Bytes;
use futures::future::BoxFuture;

use super::error::ManagerResult;

/// Receives notifications while an archive streams in.
pub trait DownloadProgress: Send + Sync {
    /// Called after each chunk with `downloaded / expected`.
    ///
    /// Not called when the server did not declare a content length.
    fn on_fraction(&self, fraction: f32);

    /// Called once after the last chunk.
    fn on_complete(&self, total_bytes: u64);
}

/// A [`DownloadProgress`] that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl DownloadProgress for NoProgress {
    fn on_fraction(&self, _fraction: f32) {}

    fn on_complete(&self, _total_bytes: u64) {}
}

/// Source of archive bytes.
///
/// Uses boxed futures so pipelines can hold an `Arc<dyn ArchiveFetcher>`.
pub trait ArchiveFetcher: Send + Sync {
    /// Download the whole body at `url` into memory.
    ///
    /// # Errors
    ///
    /// - [`ManagerError::BadUrl`](super::ManagerError::BadUrl) if `url` does not parse
    /// - [`ManagerError::NotOkResponse`](super::ManagerError::NotOkResponse) on a non-2xx status
    /// - [`ManagerError::Transport`](super::ManagerError::Transport) on network failure
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        progress: &'a dyn DownloadProgress,
    ) -> BoxFuture<'a, ManagerResult<Bytes>>;
}
