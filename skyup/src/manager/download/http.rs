//! HTTP archive fetcher.
//!
//! Streams the response body chunk by chunk into a [`DownloadBuffer`],
//! reporting the download fraction after every chunk.

use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use reqwest::{Client, Url};
use tracing::{debug, info};

use super::{ArchiveFetcher, DownloadBuffer, DownloadProgress};
use crate::manager::error::{ManagerError, ManagerResult};

/// Default connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// reqwest-based [`ArchiveFetcher`].
///
/// Only the connection phase is time-bounded by default; archives can be
/// large and slow links are expected.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    pub(crate) connect_timeout: Duration,
    pub(crate) read_timeout: Option<Duration>,
}

impl HttpFetcher {
    /// Create a fetcher with the default connect timeout and no read timeout.
    pub fn new() -> ManagerResult<Self> {
        Self::with_timeouts(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS), None)
    }

    /// Create a fetcher with custom timeouts.
    ///
    /// `read_timeout` bounds the whole request, body included.
    pub fn with_timeouts(
        connect_timeout: Duration,
        read_timeout: Option<Duration>,
    ) -> ManagerResult<Self> {
        let mut builder = Client::builder().connect_timeout(connect_timeout);
        if let Some(timeout) = read_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            ManagerError::InvalidConfig(format!("failed to create HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            connect_timeout,
            read_timeout,
        })
    }

    async fn fetch_archive(
        &self,
        url: &str,
        progress: &dyn DownloadProgress,
    ) -> ManagerResult<Bytes> {
        let parsed = Url::parse(url).map_err(|e| ManagerError::BadUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let transport = |e: reqwest::Error| ManagerError::Transport {
            url: url.to_string(),
            source: e,
        };

        let mut response = self.client.get(parsed).send().await.map_err(transport)?;

        // Dropping the response here aborts the transfer.
        let status = response.status();
        if !status.is_success() {
            return Err(ManagerError::NotOkResponse {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let expected = response.content_length();
        debug!(url, ?expected, "Archive download started");

        let mut buffer = DownloadBuffer::new(expected);
        while let Some(chunk) = response.chunk().await.map_err(transport)? {
            if let Some(fraction) = buffer.push(&chunk) {
                progress.on_fraction(fraction);
            }
        }

        let total = buffer.downloaded();
        progress.on_complete(total);
        info!(url, bytes = total, "Archive downloaded");

        Ok(buffer.into_bytes())
    }
}

impl ArchiveFetcher for HttpFetcher {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        progress: &'a dyn DownloadProgress,
    ) -> BoxFuture<'a, ManagerResult<Bytes>> {
        Box::pin(self.fetch_archive(url, progress))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::download::NoProgress;

    #[test]
    fn test_http_fetcher_new() {
        let fetcher = HttpFetcher::new().unwrap();
        assert_eq!(
            fetcher.connect_timeout,
            Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS)
        );
        assert_eq!(fetcher.read_timeout, None);
    }

    #[test]
    fn test_http_fetcher_with_timeouts() {
        let fetcher =
            HttpFetcher::with_timeouts(Duration::from_secs(5), Some(Duration::from_secs(60)))
                .unwrap();
        assert_eq!(fetcher.connect_timeout, Duration::from_secs(5));
        assert_eq!(fetcher.read_timeout, Some(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn test_bad_url_fails_before_network() {
        let fetcher = HttpFetcher::new().unwrap();
        let err = fetcher.fetch("not a url", &NoProgress).await.unwrap_err();
        assert!(matches!(err, ManagerError::BadUrl { .. }));
    }
}
