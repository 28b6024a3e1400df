//! Integration tests for `HttpFetcher` against a local HTTP stub.
//!
//! Run with: `cargo test --test http_fetcher`

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use skyup::manager::{ArchiveFetcher, DownloadProgress, HttpFetcher, ManagerError};

// ============================================================================
// Helper Functions
// ============================================================================

/// Records every progress notification.
#[derive(Default)]
struct RecordingProgress {
    fractions: Mutex<Vec<f32>>,
    completed: AtomicU64,
}

impl DownloadProgress for RecordingProgress {
    fn on_fraction(&self, fraction: f32) {
        self.fractions.lock().unwrap().push(fraction);
    }

    fn on_complete(&self, total_bytes: u64) {
        self.completed.store(total_bytes, Ordering::SeqCst);
    }
}

/// Serve a single request with the given status line, headers and body.
///
/// The body is written in `chunks` separate writes. Returns the base URL.
async fn serve_once(status: &'static str, headers: String, body: Vec<u8>, chunks: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        }

        let head = format!("HTTP/1.1 {}\r\n{}Connection: close\r\n\r\n", status, headers);
        socket.write_all(head.as_bytes()).await.unwrap();

        let chunk_len = (body.len() / chunks.max(1)).max(1);
        for chunk in body.chunks(chunk_len) {
            socket.write_all(chunk).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        let _ = socket.shutdown().await;
    });

    format!("http://{}", addr)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_download_reports_fractions() {
    let body: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();
    let headers = format!("Content-Length: {}\r\n", body.len());
    let base = serve_once("200 OK", headers, body.clone(), 4).await;

    let fetcher = HttpFetcher::new().unwrap();
    let progress = RecordingProgress::default();
    let bytes = fetcher
        .fetch(&format!("{}/skytraxx5/skytraxx5-system.tar", base), &progress)
        .await
        .unwrap();

    assert_eq!(&bytes[..], &body[..]);
    assert_eq!(progress.completed.load(Ordering::SeqCst), body.len() as u64);

    let fractions = progress.fractions.lock().unwrap().clone();
    assert!(!fractions.is_empty());
    assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(fractions.last().copied(), Some(1.0));
}

#[tokio::test]
async fn test_unknown_length_completes_without_fractions() {
    let body = b"no declared length".to_vec();
    let base = serve_once("200 OK", String::new(), body.clone(), 2).await;

    let fetcher = HttpFetcher::new().unwrap();
    let progress = RecordingProgress::default();
    let bytes = fetcher.fetch(&base, &progress).await.unwrap();

    assert_eq!(&bytes[..], &body[..]);
    assert!(progress.fractions.lock().unwrap().is_empty());
    assert_eq!(progress.completed.load(Ordering::SeqCst), body.len() as u64);
}

#[tokio::test]
async fn test_not_found_is_not_ok_response() {
    let base = serve_once(
        "404 Not Found",
        "Content-Length: 9\r\n".to_string(),
        b"not found".to_vec(),
        1,
    )
    .await;

    let fetcher = HttpFetcher::new().unwrap();
    let progress = RecordingProgress::default();
    let err = fetcher
        .fetch(&format!("{}/missing.tar", base), &progress)
        .await
        .unwrap_err();

    match err {
        ManagerError::NotOkResponse { status, .. } => assert_eq!(status, 404),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(progress.completed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    // Bind then drop to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let fetcher = HttpFetcher::new().unwrap();
    let err = fetcher
        .fetch(&format!("http://{}/a.tar", addr), &RecordingProgress::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ManagerError::Transport { .. }));
    assert!(err.is_acquisition());
}
