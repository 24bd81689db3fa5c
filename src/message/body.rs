use bytes::Bytes;
use std::fmt;
use std::io::{self, Cursor, Read};

enum Inner {
    /// Lazily read stream handed over by a transport
    Stream(Box<dyn Read + Send>),
    /// Fully buffered content; can be re-read with [`Body::rewind`]
    Buffered(Cursor<Bytes>),
    Closed,
}

/// Response body.
///
/// A body is either a stream obtained from the transport or a buffer produced by the
/// processing stage. Closing drops the underlying reader, which releases any connection it
/// holds. `close` is idempotent and reading a closed body fails.
pub struct Body {
    inner: Inner,
}

impl Body {
    /// Wrap a transport stream
    pub fn new<R>(reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        Self {
            inner: Inner::Stream(Box::new(reader)),
        }
    }

    /// Body backed by an in-memory buffer
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self {
            inner: Inner::Buffered(Cursor::new(bytes.into())),
        }
    }

    /// Body with no content
    #[must_use]
    pub fn empty() -> Self {
        Self::from_bytes(Bytes::new())
    }

    /// Full buffered content regardless of how much has been read, `None` for streams
    #[must_use]
    pub fn buffered(&self) -> Option<&Bytes> {
        match &self.inner {
            Inner::Buffered(cursor) => Some(cursor.get_ref()),
            _ => None,
        }
    }

    /// Reset a buffered body to its first byte. Returns `false` for streams and closed bodies.
    pub fn rewind(&mut self) -> bool {
        match &mut self.inner {
            Inner::Buffered(cursor) => {
                cursor.set_position(0);
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self.inner, Inner::Closed)
    }

    /// Read everything that is left
    pub fn read_all(&mut self) -> io::Result<Bytes> {
        match &mut self.inner {
            Inner::Buffered(cursor) => {
                let len = cursor.get_ref().len();
                let start = usize::try_from(cursor.position()).map_or(len, |pos| pos.min(len));
                let rest = cursor.get_ref().slice(start..);
                cursor.set_position(len as u64);
                Ok(rest)
            }
            Inner::Stream(reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf)?;
                Ok(Bytes::from(buf))
            }
            Inner::Closed => Err(closed_error()),
        }
    }

    /// Read everything that is left as UTF-8
    pub fn text(&mut self) -> io::Result<String> {
        let bytes = self.read_all()?;
        String::from_utf8(bytes.to_vec()).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Consume and discard the remaining content, returning the number of bytes skipped
    pub fn drain(&mut self) -> io::Result<u64> {
        io::copy(self, &mut io::sink())
    }

    /// Release the body. Returns `true` when this call closed it.
    pub fn close(&mut self) -> bool {
        if self.is_closed() {
            return false;
        }
        self.inner = Inner::Closed;
        true
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl Read for Body {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            Inner::Stream(reader) => reader.read(buf),
            Inner::Buffered(cursor) => cursor.read(buf),
            Inner::Closed => Err(closed_error()),
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Inner::Stream(_) => f.write_str("Body::Stream"),
            Inner::Buffered(cursor) => f
                .debug_struct("Body::Buffered")
                .field("len", &cursor.get_ref().len())
                .field("position", &cursor.position())
                .finish(),
            Inner::Closed => f.write_str("Body::Closed"),
        }
    }
}

fn closed_error() -> io::Error {
    io::Error::other("read on closed body")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingReader {
        data: Cursor<Vec<u8>>,
        drops: Arc<AtomicUsize>,
    }

    impl Read for CountingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.data.read(buf)
        }
    }

    impl Drop for CountingReader {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_buffered_body_can_be_replayed() {
        let mut body = Body::from_bytes("fast");
        assert_eq!(body.text().unwrap(), "fast");
        assert_eq!(body.text().unwrap(), "");
        assert!(body.rewind());
        assert_eq!(body.text().unwrap(), "fast");
        assert_eq!(body.buffered().unwrap().as_ref(), b"fast");
    }

    #[test]
    fn test_stream_body_reads_to_end() {
        let mut body = Body::new(Cursor::new(b"slow".to_vec()));
        assert!(body.buffered().is_none());
        assert!(!body.rewind());
        assert_eq!(body.read_all().unwrap().as_ref(), b"slow");
    }

    #[test]
    fn test_close_is_idempotent_and_releases_reader() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut body = Body::new(CountingReader {
            data: Cursor::new(vec![1, 2, 3]),
            drops: drops.clone(),
        });

        assert!(body.close());
        assert!(!body.close());
        assert!(body.is_closed());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_read_after_close_fails() {
        let mut body = Body::from_bytes("gone");
        body.close();
        let err = body.read_all().unwrap_err();
        assert_eq!(err.to_string(), "read on closed body");
    }

    #[test]
    fn test_drain_counts_skipped_bytes() {
        let mut body = Body::new(Cursor::new(vec![0u8; 4096]));
        assert_eq!(body.drain().unwrap(), 4096);
        assert_eq!(body.read_all().unwrap().len(), 0);
    }
}
