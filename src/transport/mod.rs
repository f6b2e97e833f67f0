//! Transport adapter boundary.
//!
//! The task engine hands one [`OutgoingRequest`] per exchange to a
//! [`Transport`] and receives either a streaming response or a TLS
//! server-trust signal. Connection management, TLS and HTTP framing live
//! behind this trait; [`ReqwestTransport`] is the production adapter.

mod error;
mod client;

pub use error::{Cause, TransportError};
pub use client::ReqwestTransport;

use std::fmt;
use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use url::Url;

use crate::http::{BodyStream, Headers, Method, collect_stream};

/// Request body for one exchange.
pub enum OutgoingBody {
    /// No body.
    Empty,
    /// Finite buffer, sent with `Content-Length`.
    Buffered(Bytes),
    /// Stream of chunks, sent with chunked transfer encoding.
    Streamed(BodyStream),
}

impl OutgoingBody {
    /// Drains the body into one buffer.
    ///
    /// # Errors
    ///
    /// Returns the stream's first I/O error.
    pub async fn collect(self) -> io::Result<Bytes> {
        match self {
            Self::Empty => Ok(Bytes::new()),
            Self::Buffered(bytes) => Ok(bytes),
            Self::Streamed(stream) => collect_stream(stream).await,
        }
    }

    /// Returns true when the body is streamed.
    #[must_use]
    pub fn is_streamed(&self) -> bool {
        matches!(self, Self::Streamed(_))
    }
}

impl fmt::Debug for OutgoingBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Buffered(bytes) => write!(f, "Buffered({} bytes)", bytes.len()),
            Self::Streamed(_) => f.write_str("Streamed"),
        }
    }
}

/// One wire exchange as seen by the transport.
#[derive(Debug)]
pub struct OutgoingRequest {
    pub method: Method,
    pub url: Url,
    /// Caller headers plus any engine-supplied authorization header.
    pub headers: Headers,
    pub body: OutgoingBody,
    /// Skip certificate validation; set after a server-trust challenge was
    /// accepted.
    pub accept_invalid_certs: bool,
}

/// Response body chunks as they arrive.
pub type ResponseBody = BoxStream<'static, Result<Bytes, TransportError>>;

/// Response head plus streaming body.
pub struct TransportResponse {
    pub status: u16,
    pub headers: Headers,
    /// Final URL after redirects.
    pub url: String,
    pub body: ResponseBody,
}

impl TransportResponse {
    /// Builds a response with a single-chunk body.
    #[must_use]
    pub fn from_bytes(
        status: u16,
        headers: Headers,
        url: impl Into<String>,
        body: impl Into<Bytes>,
    ) -> Self {
        let body = body.into();
        let chunks = if body.is_empty() { Vec::new() } else { vec![body] };
        Self::from_chunks(status, headers, url, chunks)
    }

    /// Builds a response whose body arrives as `chunks`.
    #[must_use]
    pub fn from_chunks(
        status: u16,
        headers: Headers,
        url: impl Into<String>,
        chunks: Vec<Bytes>,
    ) -> Self {
        Self {
            status,
            headers,
            url: url.into(),
            body: stream::iter(chunks.into_iter().map(Ok)).boxed(),
        }
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

/// The server's certificate failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerTrustSignal {
    pub host: String,
    pub port: u16,
    pub reason: String,
}

/// Outcome of a successful transport call.
#[derive(Debug)]
pub enum TransportReply {
    /// An HTTP response (possibly a 401/407 challenge).
    Response(TransportResponse),
    /// TLS server-trust evaluation failed; the handler decides.
    ServerTrust(ServerTrustSignal),
}

/// Black-box HTTP transport.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Performs one exchange.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] for connection, timeout and body failures.
    async fn send(&self, request: OutgoingRequest) -> Result<TransportReply, TransportError>;
}
