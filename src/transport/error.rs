//! Error types for the transport layer.

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Shared underlying cause; `Arc` keeps [`TransportError`] cheap to clone.
pub type Cause = Arc<dyn StdError + Send + Sync>;

/// Failures reported by a [`Transport`](super::Transport).
///
/// Transport failures are never retried by the task engine.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection could not be established (DNS, refused, TLS handshake).
    #[error("connection to {url} failed: {source}")]
    Connect {
        /// Target URL.
        url: String,
        /// Underlying cause.
        #[source]
        source: Cause,
    },

    /// Connect or read timeout elapsed.
    #[error("timeout talking to {url}")]
    Timeout {
        /// Target URL.
        url: String,
    },

    /// Request failed after the connection was established.
    #[error("request to {url} failed: {source}")]
    Request {
        /// Target URL.
        url: String,
        /// Underlying cause.
        #[source]
        source: Cause,
    },

    /// Reading the response body or producing the request body failed.
    #[error("body transfer for {url} failed: {source}")]
    Body {
        /// Target URL.
        url: String,
        /// Underlying cause.
        #[source]
        source: Cause,
    },

    /// The server's certificate was rejected and the trust challenge was not
    /// accepted.
    #[error("server {host}:{port} is not trusted: {reason}")]
    UntrustedServer {
        /// Server host.
        host: String,
        /// Server port.
        port: u16,
        /// Why validation failed.
        reason: String,
    },

    /// The request cannot be expressed on the wire.
    #[error("invalid request for {url}: {reason}")]
    InvalidRequest {
        /// Target URL.
        url: String,
        /// What was wrong.
        reason: String,
    },

    /// Any other transport failure.
    #[error("transport failure: {message}")]
    Other {
        /// Description of the failure.
        message: String,
    },
}

impl TransportError {
    /// Creates a connect error.
    pub fn connect(url: impl Into<String>, source: impl StdError + Send + Sync + 'static) -> Self {
        Self::Connect {
            url: url.into(),
            source: Arc::new(source),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates a request error.
    pub fn request(url: impl Into<String>, source: impl StdError + Send + Sync + 'static) -> Self {
        Self::Request {
            url: url.into(),
            source: Arc::new(source),
        }
    }

    /// Creates a body transfer error.
    pub fn body(url: impl Into<String>, source: impl StdError + Send + Sync + 'static) -> Self {
        Self::Body {
            url: url.into(),
            source: Arc::new(source),
        }
    }

    /// Creates an untrusted-server error.
    pub fn untrusted_server(host: impl Into<String>, port: u16, reason: impl Into<String>) -> Self {
        Self::UntrustedServer {
            host: host.into(),
            port,
            reason: reason.into(),
        }
    }

    /// Creates an invalid-request error.
    pub fn invalid_request(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a catch-all error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Maps a reqwest error to the closest variant.
    pub fn from_reqwest(url: impl Into<String>, error: reqwest::Error) -> Self {
        let url = url.into();
        if error.is_timeout() {
            Self::timeout(url)
        } else if error.is_connect() {
            Self::connect(url, error)
        } else if error.is_body() || error.is_decode() {
            Self::body(url, error)
        } else {
            Self::request(url, error)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::error::Error as _;
    use std::io;

    use super::*;

    #[test]
    fn test_connect_error_display_and_source() {
        let error = TransportError::connect(
            "http://127.0.0.1:1/",
            io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        );
        let msg = error.to_string();
        assert!(msg.contains("127.0.0.1:1"), "{msg}");
        assert!(msg.contains("refused"), "{msg}");
        assert!(error.source().is_some());
    }

    #[test]
    fn test_clone_shares_cause() {
        let error = TransportError::body("http://h/", io::Error::other("reset"));
        let cloned = error.clone();
        assert_eq!(error.to_string(), cloned.to_string());
    }

    #[test]
    fn test_untrusted_server_display() {
        let error = TransportError::untrusted_server("self-signed.test", 443, "unknown issuer");
        assert_eq!(
            error.to_string(),
            "server self-signed.test:443 is not trusted: unknown issuer"
        );
    }

    #[test]
    fn test_timeout_display() {
        let error = TransportError::timeout("http://example.com/slow");
        assert!(error.to_string().contains("timeout"));
    }
}
