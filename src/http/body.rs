//! Request body sources.
//!
//! A [`BodySource`] is a re-acquirable producer of request body bytes. Every
//! call to [`BodySource::open`] must yield a fresh stream positioned at the
//! start of the body: an authenticated retry re-opens the source rather than
//! rewinding a stream that may be a one-shot producer.

use std::fmt;
use std::io;

use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};

/// Default chunk size used by [`BufferedSource`] (16 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// A stream of request body chunks, owned by one exchange.
pub type BodyStream = BoxStream<'static, io::Result<Bytes>>;

/// A re-acquirable producer of request body bytes.
pub trait BodySource: Send + Sync + fmt::Debug {
    /// Opens a new stream over the complete body.
    fn open(&self) -> BodyStream;
}

/// Streams an in-memory buffer in fixed-size chunks.
///
/// Useful when the body is already in memory but should still be delivered
/// to the transport as a stream (chunked transfer encoding).
#[derive(Debug, Clone)]
pub struct BufferedSource {
    data: Bytes,
    chunk_size: usize,
}

impl BufferedSource {
    /// Creates a source over `data` using [`DEFAULT_CHUNK_SIZE`].
    #[must_use]
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Overrides the chunk size. Zero is treated as one byte.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Total body length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true when the body is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl BodySource for BufferedSource {
    fn open(&self) -> BodyStream {
        let data = self.data.clone();
        let chunks: Vec<io::Result<Bytes>> = (0..data.len())
            .step_by(self.chunk_size)
            .map(|start| {
                let end = (start + self.chunk_size).min(data.len());
                Ok(data.slice(start..end))
            })
            .collect();
        stream::iter(chunks).boxed()
    }
}

/// Adapts a closure into a [`BodySource`].
///
/// The closure is called once per exchange and must return a stream over the
/// whole body each time.
pub struct FnSource<F> {
    open: F,
}

impl<F> FnSource<F>
where
    F: Fn() -> BodyStream + Send + Sync,
{
    /// Wraps `open` as a body source.
    pub fn new(open: F) -> Self {
        Self { open }
    }
}

impl<F> fmt::Debug for FnSource<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSource").finish_non_exhaustive()
    }
}

impl<F> BodySource for FnSource<F>
where
    F: Fn() -> BodyStream + Send + Sync,
{
    fn open(&self) -> BodyStream {
        (self.open)()
    }
}

/// Drains a body stream into a single buffer.
///
/// # Errors
///
/// Returns the first I/O error produced by the stream.
pub async fn collect_stream(mut stream: BodyStream) -> io::Result<Bytes> {
    let mut buffer = Vec::new();
    while let Some(chunk) = stream.next().await {
        buffer.extend_from_slice(&chunk?);
    }
    Ok(Bytes::from(buffer))
}
