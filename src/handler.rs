//! Consumer callbacks for task progress and authentication decisions.
//!
//! A [`Handler`] is bound to a session (and optionally overridden per task).
//! Every method has a default, so consumers implement only what they need.
//! Callbacks run on the task's own unit of work; a slow callback delays only
//! that task.

use std::error::Error as StdError;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::auth::{Challenge, Disposition};
use crate::http::{BodyStream, Response};
use crate::task::{Task, TaskError};

/// Failure raised by a handler while deciding a disposition.
///
/// The task treats it as [`Disposition::PerformDefaultHandling`].
#[derive(Debug, Error)]
#[error("handler failed: {message}")]
pub struct HandlerError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl HandlerError {
    /// Creates a handler error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a handler error wrapping an underlying cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Callbacks a task makes into its consumer.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Called for each response body chunk, in order, before completion.
    async fn on_body(&self, _task: &Task, _chunk: &Bytes) {}

    /// Decides how to answer a credential (401/407) challenge.
    ///
    /// # Errors
    ///
    /// An error is treated as [`Disposition::PerformDefaultHandling`].
    async fn on_challenge(
        &self,
        _task: &Task,
        _challenge: &Challenge,
    ) -> Result<Disposition, HandlerError> {
        Ok(Disposition::PerformDefaultHandling)
    }

    /// Decides whether to trust a server whose certificate failed validation.
    ///
    /// Answer with `UseCredential(Some(Credential::server_trust()))` to
    /// proceed.
    ///
    /// # Errors
    ///
    /// An error is treated as [`Disposition::PerformDefaultHandling`], which
    /// rejects the server.
    async fn on_server_trust(
        &self,
        _task: &Task,
        _challenge: &Challenge,
    ) -> Result<Disposition, HandlerError> {
        Ok(Disposition::PerformDefaultHandling)
    }

    /// Supplies a fresh request body stream for a retried exchange.
    ///
    /// Returning `None` re-opens the request's own body source.
    async fn on_need_body_stream(&self, _task: &Task) -> Option<BodyStream> {
        None
    }

    /// Called exactly once when the task reaches a terminal state.
    async fn on_complete(&self, _task: &Task, _outcome: &Result<Response, TaskError>) {}
}

/// Handler that accepts every default.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHandler;

impl Handler for DefaultHandler {}
