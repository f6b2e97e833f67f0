//! In-process transport and handlers for driving the task engine without a
//! network.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use courier_core::auth::{Challenge, Disposition};
use courier_core::handler::{Handler, HandlerError};
use courier_core::http::{BodyStream, Headers, Response};
use courier_core::task::{Task, TaskError};
use courier_core::transport::{
    OutgoingRequest, ServerTrustSignal, Transport, TransportError, TransportReply,
    TransportResponse,
};
use tokio::sync::Notify;

pub const URL: &str = "http://api.test/resource?x=1";

/// What the engine put on the wire for one exchange.
#[derive(Debug, Clone)]
pub struct SentRequest {
    pub method: String,
    pub url: String,
    pub headers: Headers,
    pub body: Bytes,
    pub streamed: bool,
    pub accept_invalid_certs: bool,
}

impl SentRequest {
    pub fn authorization(&self) -> Option<&str> {
        self.headers.get("authorization")
    }
}

type Script = dyn Fn(usize, &SentRequest) -> Result<TransportReply, TransportError> + Send + Sync;

/// Transport that answers each exchange from a closure and records what was
/// sent. The closure receives the zero-based exchange index.
pub struct ScriptedTransport {
    script: Box<Script>,
    sent: Mutex<Vec<SentRequest>>,
}

impl ScriptedTransport {
    pub fn new(
        script: impl Fn(usize, &SentRequest) -> Result<TransportReply, TransportError>
        + Send
        + Sync
        + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<SentRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn authorizations(&self) -> Vec<Option<String>> {
        self.sent()
            .iter()
            .map(|request| request.authorization().map(str::to_string))
            .collect()
    }
}

impl fmt::Debug for ScriptedTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedTransport").finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: OutgoingRequest) -> Result<TransportReply, TransportError> {
        let streamed = request.body.is_streamed();
        let url = request.url.to_string();
        let body = request
            .body
            .collect()
            .await
            .map_err(|error| TransportError::body(url.clone(), error))?;
        let sent = SentRequest {
            method: request.method.to_string(),
            url,
            headers: request.headers,
            body,
            streamed,
            accept_invalid_certs: request.accept_invalid_certs,
        };
        let index = {
            let mut log = self.sent.lock().unwrap();
            log.push(sent.clone());
            log.len() - 1
        };
        (self.script)(index, &sent)
    }
}

/// Transport whose exchanges never finish.
#[derive(Debug, Default)]
pub struct StallingTransport {
    pub started: Notify,
    pub calls: AtomicUsize,
}

#[async_trait]
impl Transport for StallingTransport {
    async fn send(&self, _request: OutgoingRequest) -> Result<TransportReply, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();
        std::future::pending().await
    }
}

/// Transport that answers every exchange with an empty 200 and flags when it
/// is dropped.
#[derive(Debug, Default)]
pub struct DropFlagTransport {
    pub dropped: Arc<AtomicBool>,
}

impl Drop for DropFlagTransport {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for DropFlagTransport {
    async fn send(&self, _request: OutgoingRequest) -> Result<TransportReply, TransportError> {
        Ok(ok(""))
    }
}

pub fn reply(status: u16, headers: &[(&str, &str)], body: &str) -> TransportReply {
    reply_from(URL, status, headers, body)
}

/// Reply whose final URL is `url`, as after a followed redirect.
pub fn reply_from(url: &str, status: u16, headers: &[(&str, &str)], body: &str) -> TransportReply {
    let mut map = Headers::new();
    for (name, value) in headers {
        map.append(*name, *value);
    }
    TransportReply::Response(TransportResponse::from_bytes(
        status,
        map,
        url,
        body.to_string(),
    ))
}

pub fn ok(body: &str) -> TransportReply {
    reply(200, &[("Content-Type", "text/plain")], body)
}

pub fn basic_challenge(realm: &str) -> TransportReply {
    let header = format!(r#"Basic realm="{realm}""#);
    reply(401, &[("WWW-Authenticate", header.as_str())], "denied")
}

pub fn trust_failure() -> TransportReply {
    TransportReply::ServerTrust(ServerTrustSignal {
        host: "api.test".to_string(),
        port: 443,
        reason: "certificate has expired".to_string(),
    })
}

fn default_handling(_challenge: &Challenge) -> Result<Disposition, HandlerError> {
    Ok(Disposition::PerformDefaultHandling)
}

type Decide = dyn Fn(&Challenge) -> Result<Disposition, HandlerError> + Send + Sync;
type OpenStream = dyn Fn() -> BodyStream + Send + Sync;

/// Handler that answers challenges from closures and records every callback.
pub struct RecordingHandler {
    decide: Box<Decide>,
    trust: Box<Decide>,
    body_stream: Option<Box<OpenStream>>,
    pub challenges: Mutex<Vec<Challenge>>,
    pub chunks: Mutex<Vec<Bytes>>,
    pub outcomes: Mutex<Vec<Result<u16, TaskError>>>,
    pub completions: AtomicUsize,
    pub body_stream_requests: AtomicUsize,
}

impl RecordingHandler {
    /// Performs default handling for everything.
    pub fn new() -> Self {
        Self {
            decide: Box::new(default_handling),
            trust: Box::new(default_handling),
            body_stream: None,
            challenges: Mutex::new(Vec::new()),
            chunks: Mutex::new(Vec::new()),
            outcomes: Mutex::new(Vec::new()),
            completions: AtomicUsize::new(0),
            body_stream_requests: AtomicUsize::new(0),
        }
    }

    pub fn answering(disposition: Disposition) -> Self {
        Self::new().on_challenge(move |_| Ok(disposition.clone()))
    }

    pub fn on_challenge(
        mut self,
        decide: impl Fn(&Challenge) -> Result<Disposition, HandlerError> + Send + Sync + 'static,
    ) -> Self {
        self.decide = Box::new(decide);
        self
    }

    pub fn on_trust(
        mut self,
        decide: impl Fn(&Challenge) -> Result<Disposition, HandlerError> + Send + Sync + 'static,
    ) -> Self {
        self.trust = Box::new(decide);
        self
    }

    pub fn supplying_body(mut self, open: impl Fn() -> BodyStream + Send + Sync + 'static) -> Self {
        self.body_stream = Some(Box::new(open));
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn challenges(&self) -> Vec<Challenge> {
        self.challenges.lock().unwrap().clone()
    }

    pub fn body(&self) -> Vec<u8> {
        self.chunks.lock().unwrap().iter().flatten().copied().collect()
    }

    pub fn completions(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Handler for RecordingHandler {
    async fn on_body(&self, _task: &Task, chunk: &Bytes) {
        self.chunks.lock().unwrap().push(chunk.clone());
    }

    async fn on_challenge(
        &self,
        _task: &Task,
        challenge: &Challenge,
    ) -> Result<Disposition, HandlerError> {
        self.challenges.lock().unwrap().push(challenge.clone());
        (self.decide)(challenge)
    }

    async fn on_server_trust(
        &self,
        _task: &Task,
        challenge: &Challenge,
    ) -> Result<Disposition, HandlerError> {
        self.challenges.lock().unwrap().push(challenge.clone());
        (self.trust)(challenge)
    }

    async fn on_need_body_stream(&self, _task: &Task) -> Option<BodyStream> {
        let open = self.body_stream.as_ref()?;
        self.body_stream_requests.fetch_add(1, Ordering::SeqCst);
        Some(open())
    }

    async fn on_complete(&self, _task: &Task, outcome: &Result<Response, TaskError>) {
        self.completions.fetch_add(1, Ordering::SeqCst);
        self.outcomes
            .lock()
            .unwrap()
            .push(outcome.as_ref().map(Response::status).map_err(Clone::clone));
    }
}

/// Handler that never decides a challenge.
#[derive(Debug, Default)]
pub struct ParkedHandler {
    pub deciding: Notify,
}

#[async_trait]
impl Handler for ParkedHandler {
    async fn on_challenge(
        &self,
        _task: &Task,
        _challenge: &Challenge,
    ) -> Result<Disposition, HandlerError> {
        self.deciding.notify_one();
        std::future::pending().await
    }
}
