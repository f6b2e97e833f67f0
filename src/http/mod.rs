//! Request and response descriptors.
//!
//! These types describe one logical request and its resolved response as
//! plain data. The task engine turns a [`Request`] into one or more wire
//! exchanges; the transport never sees a `Request` directly.

mod body;
mod headers;

pub use body::{
    BodySource, BodyStream, BufferedSource, DEFAULT_CHUNK_SIZE, FnSource, collect_stream,
};
pub use headers::{Headers, InvalidHeader};
pub use reqwest::Method;

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use url::Url;

use crate::task::TaskError;

/// One logical HTTP request.
///
/// A request may carry a finite body buffer, a re-acquirable stream source,
/// or both. When both are present the stream source is used.
#[derive(Clone)]
pub struct Request {
    method: Method,
    url: String,
    headers: Headers,
    body: Option<Bytes>,
    body_source: Option<Arc<dyn BodySource>>,
}

impl Request {
    /// Creates a request with no headers and no body.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Headers::new(),
            body: None,
            body_source: None,
        }
    }

    /// Creates a GET request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Creates a POST request.
    #[must_use]
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// Sets a header, replacing any existing value.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Sets the finite body buffer.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets the body stream source.
    #[must_use]
    pub fn with_body_source(mut self, source: impl BodySource + 'static) -> Self {
        self.body_source = Some(Arc::new(source));
        self
    }

    /// Sets a shared body stream source.
    #[must_use]
    pub fn with_shared_body_source(mut self, source: Arc<dyn BodySource>) -> Self {
        self.body_source = Some(source);
        self
    }

    /// Sets a header on an existing request.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    /// Request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Target URI as given by the caller.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Caller-set headers.
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The finite body buffer, if any.
    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// The body stream source, if any.
    #[must_use]
    pub fn body_source(&self) -> Option<&Arc<dyn BodySource>> {
        self.body_source.as_ref()
    }

    /// Checks the request can be sent and returns its parsed target.
    pub(crate) fn validate(&self) -> Result<Url, String> {
        let url = Url::parse(&self.url).map_err(|e| format!("malformed URL {:?}: {e}", self.url))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("unsupported URL scheme {:?}", url.scheme()));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(format!("URL {:?} has no host", self.url));
        }
        self.headers
            .to_header_map(&[])
            .map_err(|e| e.to_string())?;
        Ok(url)
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("body_len", &self.body.as_ref().map(Bytes::len))
            .field("streamed", &self.body_source.is_some())
            .finish()
    }
}

/// A resolved response with its fully accumulated body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: u16,
    headers: Headers,
    url: String,
    body: Bytes,
}

impl Response {
    /// Creates a response.
    #[must_use]
    pub fn new(
        status: u16,
        headers: Headers,
        url: impl Into<String>,
        body: impl Into<Bytes>,
    ) -> Self {
        Self {
            status,
            headers,
            url: url.into(),
            body: body.into(),
        }
    }

    /// HTTP status code.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Response headers.
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Final URL after redirects.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Accumulated body bytes.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decodes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Decoding`] when the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TaskError> {
        serde_json::from_slice(&self.body).map_err(|e| TaskError::decoding(&self.url, e))
    }
}
