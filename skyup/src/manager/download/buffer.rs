//! In-memory accumulation of a streamed archive.

use bytes::{Bytes, BytesMut};

/// Collects response chunks and tracks download progress.
#[derive(Debug, Default)]
pub struct DownloadBuffer {
    data: BytesMut,
    expected: Option<u64>,
}

impl DownloadBuffer {
    /// Create a buffer for a body of `expected` bytes, if known.
    ///
    /// The declared length only pre-sizes the buffer up to 64 MiB.
    pub fn new(expected: Option<u64>) -> Self {
        const MAX_PREALLOC: u64 = 64 * 1024 * 1024;
        let capacity = expected.unwrap_or(0).min(MAX_PREALLOC) as usize;
        Self {
            data: BytesMut::with_capacity(capacity),
            expected,
        }
    }

    /// Append a chunk and return the new download fraction.
    ///
    /// Returns `None` when the expected size is unknown or zero.
    pub fn push(&mut self, chunk: &[u8]) -> Option<f32> {
        self.data.extend_from_slice(chunk);
        self.fraction()
    }

    /// Bytes received so far.
    pub fn downloaded(&self) -> u64 {
        self.data.len() as u64
    }

    /// Declared content length.
    pub fn expected(&self) -> Option<u64> {
        self.expected
    }

    /// `downloaded / expected`, if the expected size is known.
    pub fn fraction(&self) -> Option<f32> {
        match self.expected {
            Some(expected) if expected > 0 => {
                Some((self.downloaded() as f64 / expected as f64) as f32)
            }
            _ => None,
        }
    }

    /// Finish the download and take the bytes.
    pub fn into_bytes(self) -> Bytes {
        self.data.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction_by_bytes() {
        let mut buffer = DownloadBuffer::new(Some(1000));
        assert_eq!(buffer.fraction(), Some(0.0));

        assert_eq!(buffer.push(&[0u8; 250]), Some(0.25));
        assert_eq!(buffer.push(&[0u8; 750]), Some(1.0));
        assert_eq!(buffer.downloaded(), 1000);
    }

    #[test]
    fn test_unknown_length_reports_nothing() {
        let mut buffer = DownloadBuffer::new(None);
        assert_eq!(buffer.push(b"abc"), None);
        assert_eq!(buffer.downloaded(), 3);
        assert_eq!(buffer.expected(), None);
    }

    #[test]
    fn test_zero_length_reports_nothing() {
        let mut buffer = DownloadBuffer::new(Some(0));
        assert_eq!(buffer.push(b""), None);
    }

    #[test]
    fn test_into_bytes_preserves_order() {
        let mut buffer = DownloadBuffer::new(Some(11));
        buffer.push(b"Hello");
        buffer.push(b" ");
        buffer.push(b"World");
        assert_eq!(&buffer.into_bytes()[..], b"Hello World");
    }
}
