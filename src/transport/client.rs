//! Production transport backed by `reqwest`.

use std::error::Error as StdError;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Body, Client, ClientBuilder};
use tracing::{debug, instrument};

use super::{
    OutgoingBody, OutgoingRequest, ServerTrustSignal, Transport, TransportError, TransportReply,
    TransportResponse,
};
use crate::http::Headers;
use crate::session::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_READ_TIMEOUT_SECS};
use crate::user_agent;

/// Headers whose framing the HTTP stack decides; caller values are dropped.
const FRAMING_HEADERS: &[&str] = &["transfer-encoding", "content-length"];

/// [`Transport`] implementation over a pooled `reqwest::Client`.
///
/// Redirects and gzip decoding are handled by reqwest. A certificate
/// validation failure is reported as [`TransportReply::ServerTrust`]; once
/// the trust challenge is accepted the exchange is retried on a second client
/// that skips validation.
///
/// # Example
///
/// ```no_run
/// use courier_core::transport::ReqwestTransport;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = ReqwestTransport::with_timeouts(10, 60, None)?;
/// # drop(transport);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    untrusted_client: Client,
}

impl ReqwestTransport {
    /// Creates a transport with default timeouts and User-Agent.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Other`] if the TLS backend cannot be
    /// initialised.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeouts(DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_READ_TIMEOUT_SECS, None)
    }

    /// Creates a transport with explicit timeouts and an optional
    /// User-Agent override.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Other`] if the TLS backend cannot be
    /// initialised.
    #[instrument(level = "debug")]
    pub fn with_timeouts(
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
        agent: Option<&str>,
    ) -> Result<Self, TransportError> {
        let user_agent = agent.map_or_else(user_agent::default_user_agent, str::to_string);
        let client = base_client_builder(connect_timeout_secs, read_timeout_secs, &user_agent)
            .build()
            .map_err(|e| TransportError::other(format!("HTTP client construction failed: {e}")))?;
        let untrusted_client =
            base_client_builder(connect_timeout_secs, read_timeout_secs, &user_agent)
                .danger_accept_invalid_certs(true)
                .build()
                .map_err(|e| {
                    TransportError::other(format!("HTTP client construction failed: {e}"))
                })?;
        Ok(Self {
            client,
            untrusted_client,
        })
    }
}

fn base_client_builder(
    connect_timeout_secs: u64,
    read_timeout_secs: u64,
    user_agent: &str,
) -> ClientBuilder {
    Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .timeout(Duration::from_secs(read_timeout_secs))
        .gzip(true)
        .user_agent(user_agent)
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[instrument(
        level = "debug",
        skip(self, request),
        fields(method = %request.method, url = %request.url)
    )]
    async fn send(&self, request: OutgoingRequest) -> Result<TransportReply, TransportError> {
        let url = request.url.to_string();
        let headers = request
            .headers
            .to_header_map(FRAMING_HEADERS)
            .map_err(|e| TransportError::invalid_request(&url, e.to_string()))?;

        let client = if request.accept_invalid_certs {
            &self.untrusted_client
        } else {
            &self.client
        };
        let mut builder = client
            .request(request.method.clone(), request.url.clone())
            .headers(headers);
        builder = match request.body {
            OutgoingBody::Empty => builder,
            OutgoingBody::Buffered(bytes) => builder.body(bytes),
            OutgoingBody::Streamed(stream) => builder.body(Body::wrap_stream(stream)),
        };

        let response = match builder.send().await {
            Ok(response) => response,
            Err(error) if error.is_connect() => {
                if let Some(reason) = certificate_failure(&error) {
                    debug!(reason = %reason, "server certificate rejected");
                    return Ok(TransportReply::ServerTrust(ServerTrustSignal {
                        host: request.url.host_str().unwrap_or_default().to_string(),
                        port: request.url.port_or_known_default().unwrap_or(443),
                        reason,
                    }));
                }
                return Err(TransportError::from_reqwest(url, error));
            }
            Err(error) => return Err(TransportError::from_reqwest(url, error)),
        };

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers = Headers::from_header_map(response.headers());
        debug!(status, "response head received");

        let body_url = final_url.clone();
        let body = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| TransportError::from_reqwest(body_url.clone(), e)))
            .boxed();

        Ok(TransportReply::Response(TransportResponse {
            status,
            headers,
            url: final_url,
            body,
        }))
    }
}

/// Returns the certificate failure message if `error` was caused by TLS
/// certificate validation.
fn certificate_failure(error: &reqwest::Error) -> Option<String> {
    let mut source: Option<&(dyn StdError + 'static)> = error.source();
    while let Some(cause) = source {
        let message = cause.to_string();
        if message.to_ascii_lowercase().contains("certificate") {
            return Some(message);
        }
        source = cause.source();
    }
    None
}
