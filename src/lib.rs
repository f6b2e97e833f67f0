//! Courier Core Library
//!
//! An HTTP client engine that issues requests, streams request and response
//! bodies, and resolves authentication challenges (Basic, Digest and TLS
//! server trust) through a pluggable handler. Each logical request is one
//! [`Task`]; a [`Session`] creates tasks and owns what they share.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`http`] - Request/response descriptors, headers and body sources
//! - [`credential`] - Protection spaces, credentials and the credential store
//! - [`auth`] - Challenge parsing, Basic/Digest answers, disposition dispatch
//! - [`handler`] - Consumer callback trait
//! - [`transport`] - Transport adapter boundary and the reqwest adapter
//! - [`task`] - Task lifecycle and the exchange state machine
//! - [`session`] - Task factory, configuration and task registry

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod credential;
pub mod handler;
pub mod http;
pub mod session;
pub mod task;
#[cfg(test)]
pub(crate) mod test_support;
pub mod transport;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use auth::{Challenge, ChallengeResolver, Disposition};
pub use credential::{AuthScheme, Credential, CredentialStore, Persistence, ProtectionSpace};
pub use handler::{DefaultHandler, Handler, HandlerError};
pub use http::{BodySource, BufferedSource, Headers, Method, Request, Response};
pub use session::{RejectExhaustion, Session, SessionBuilder, SessionConfig};
pub use task::{Task, TaskError, TaskId, TaskState};
pub use transport::{ReqwestTransport, Transport, TransportError};
