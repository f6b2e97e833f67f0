//! Sessions: task factories that own the shared transport, credential store,
//! configuration and default handler.
//!
//! # Example
//!
//! ```no_run
//! use courier_core::http::Request;
//! use courier_core::session::Session;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = Session::new()?;
//! let task = session.create_task(Request::get("https://example.com/get"));
//! task.resume()?;
//! let response = task.wait().await?;
//! println!("{} ({} bytes)", response.status(), response.body().len());
//! # Ok(())
//! # }
//! ```

mod config;
mod registry;

pub use config::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_MAX_CHALLENGE_ROUNDS, DEFAULT_READ_TIMEOUT_SECS,
    RejectExhaustion, SessionConfig,
};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::credential::CredentialStore;
use crate::handler::{DefaultHandler, Handler};
use crate::http::Request;
use crate::task::{Task, TaskError, TaskId};
use crate::transport::{ReqwestTransport, Transport, TransportError};

use registry::TaskRegistry;

/// State shared between a session and its tasks.
pub(crate) struct SessionShared {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) credentials: Arc<CredentialStore>,
    pub(crate) config: SessionConfig,
    pub(crate) registry: TaskRegistry,
    pub(crate) token: CancellationToken,
    invalidated: AtomicBool,
    next_task_id: AtomicU64,
}

/// Creates tasks and owns what they share.
///
/// Dropping a session cancels its unfinished tasks (they fail with
/// [`TaskError::SessionInvalidated`]) and, if the session created its own
/// credential store, clears the store's session-scoped credentials.
pub struct Session {
    shared: Arc<SessionShared>,
    handler: Arc<dyn Handler>,
    owns_store: bool,
}

impl Session {
    /// Starts building a session.
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    /// Creates a session with default configuration, a fresh credential
    /// store and the default handler.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the default transport cannot be built.
    pub fn new() -> Result<Self, TransportError> {
        Self::builder().build()
    }

    /// Creates a task bound to the session's handler.
    ///
    /// Never fails: an invalid request, or a request made after the session
    /// was invalidated, yields a task that fails when resumed.
    pub fn create_task(&self, request: Request) -> Task {
        self.create_task_with_handler(request, Arc::clone(&self.handler))
    }

    /// Creates a task bound to `handler` instead of the session's handler.
    #[instrument(level = "debug", skip_all, fields(url = %request.url()))]
    pub fn create_task_with_handler(&self, request: Request, handler: Arc<dyn Handler>) -> Task {
        let id = TaskId(self.shared.next_task_id.fetch_add(1, Ordering::SeqCst) + 1);
        let target = if self.is_invalidated() {
            Err(TaskError::SessionInvalidated)
        } else {
            request.validate().map_err(TaskError::invalid_request)
        };
        if let Err(error) = &target {
            debug!(task_id = %id, error = %error, "task will fail when resumed");
        }
        let invalidated = matches!(target, Err(TaskError::SessionInvalidated));
        let task = Task::new(id, request, target, handler, Arc::clone(&self.shared));
        // A task in the registry keeps the session alive until it finishes;
        // one that can only fail is left to its owner.
        if !invalidated {
            self.shared.registry.insert(task.clone());
        }
        debug!(task_id = %id, registered = !invalidated, "task created");
        task
    }

    /// The credential store consulted by this session's tasks.
    #[must_use]
    pub fn credential_store(&self) -> &Arc<CredentialStore> {
        &self.shared.credentials
    }

    /// Session configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Unfinished tasks, ordered by creation. Tasks created after the session
    /// was invalidated are not listed.
    #[must_use]
    pub fn all_tasks(&self) -> Vec<Task> {
        self.shared.registry.snapshot()
    }

    /// Returns true once the session no longer accepts new work.
    #[must_use]
    pub fn is_invalidated(&self) -> bool {
        self.shared.invalidated.load(Ordering::SeqCst)
    }

    /// Stops accepting new work; tasks already created run to completion.
    ///
    /// Tasks created afterwards fail with [`TaskError::SessionInvalidated`]
    /// when resumed.
    pub fn finish_tasks_and_invalidate(&self) {
        if !self.shared.invalidated.swap(true, Ordering::SeqCst) {
            info!(
                pending = self.shared.registry.len(),
                "session invalidated; letting tasks finish"
            );
        }
    }

    /// Stops accepting new work and cancels every unfinished task.
    ///
    /// Cancelled tasks fail with [`TaskError::SessionInvalidated`].
    pub fn invalidate_and_cancel(&self) {
        self.shared.invalidated.store(true, Ordering::SeqCst);
        if !self.shared.token.is_cancelled() {
            info!(pending = self.shared.registry.len(), "session invalidated; cancelling tasks");
            self.shared.token.cancel();
        }
        // Every call sweeps; a task may have been registered after the token
        // was cancelled.
        for task in self.shared.registry.snapshot() {
            task.cancel();
        }
        // Without a runtime, never-started tasks were finished inline; drop
        // whatever is left so the registry releases its handles.
        if tokio::runtime::Handle::try_current().is_err() {
            self.shared.registry.clear();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.invalidate_and_cancel();
        if self.owns_store {
            self.shared.credentials.clear_session_scoped();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.shared.config)
            .field("transport", &self.shared.transport)
            .field("tasks", &self.shared.registry.len())
            .field("invalidated", &self.is_invalidated())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Session`].
#[derive(Default)]
pub struct SessionBuilder {
    config: SessionConfig,
    transport: Option<Arc<dyn Transport>>,
    credentials: Option<Arc<CredentialStore>>,
    handler: Option<Arc<dyn Handler>>,
}

impl SessionBuilder {
    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses `transport` instead of the default [`ReqwestTransport`].
    #[must_use]
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Uses a shared transport.
    #[must_use]
    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Uses a caller-owned credential store, which may be shared with other
    /// sessions. Its entries outlive the session.
    #[must_use]
    pub fn credential_store(mut self, store: Arc<CredentialStore>) -> Self {
        self.credentials = Some(store);
        self
    }

    /// Sets the default handler for tasks.
    #[must_use]
    pub fn handler(mut self, handler: impl Handler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Sets a shared default handler for tasks.
    #[must_use]
    pub fn shared_handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Builds the session.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if no transport was supplied and the
    /// default one cannot be built.
    pub fn build(self) -> Result<Session, TransportError> {
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::with_timeouts(
                self.config.connect_timeout_secs,
                self.config.read_timeout_secs,
                self.config.user_agent.as_deref(),
            )?),
        };
        let owns_store = self.credentials.is_none();
        let credentials = self.credentials.unwrap_or_default();
        let handler = self
            .handler
            .unwrap_or_else(|| Arc::new(DefaultHandler) as Arc<dyn Handler>);

        Ok(Session {
            shared: Arc::new(SessionShared {
                transport,
                credentials,
                config: self.config,
                registry: TaskRegistry::default(),
                token: CancellationToken::new(),
                invalidated: AtomicBool::new(false),
                next_task_id: AtomicU64::new(0),
            }),
            handler,
            owns_store,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::credential::{AuthScheme, Credential, Persistence, ProtectionSpace};
    use crate::task::TaskState;
    use crate::transport::{OutgoingRequest, TransportReply};
    use async_trait::async_trait;

    /// Transport that records when it is dropped.
    #[derive(Debug)]
    struct DropFlagTransport(Arc<AtomicBool>);

    impl Drop for DropFlagTransport {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Transport for DropFlagTransport {
        async fn send(&self, _request: OutgoingRequest) -> Result<TransportReply, TransportError> {
            Err(TransportError::other("offline"))
        }
    }

    fn flagged_session() -> (Session, Arc<AtomicBool>) {
        let dropped = Arc::new(AtomicBool::new(false));
        let session = Session::builder()
            .transport(DropFlagTransport(Arc::clone(&dropped)))
            .build()
            .unwrap();
        (session, dropped)
    }

    #[test]
    fn test_task_ids_increase_per_session() {
        let session = Session::new().unwrap();
        let first = session.create_task(Request::get("http://example.com/a"));
        let second = session.create_task(Request::get("http://example.com/b"));
        assert_eq!(first.id(), TaskId(1));
        assert_eq!(second.id(), TaskId(2));
        assert_eq!(session.all_tasks().len(), 2);
    }

    #[test]
    fn test_resume_outside_runtime_is_invalid_state() {
        let session = Session::new().unwrap();
        let task = session.create_task(Request::get("http://example.com/"));
        assert!(matches!(
            task.resume(),
            Err(TaskError::InvalidState { state: TaskState::Created, .. })
        ));
    }

    #[test]
    fn test_drop_without_runtime_fails_unstarted_tasks() {
        let session = Session::new().unwrap();
        let task = session.create_task(Request::get("http://example.com/"));
        drop(session);
        assert_eq!(task.state(), TaskState::Failed);
        assert!(matches!(task.error(), Some(TaskError::SessionInvalidated)));
    }

    #[test]
    fn test_invalidate_and_cancel_rejects_new_tasks() {
        let session = Session::new().unwrap();
        session.invalidate_and_cancel();
        assert!(session.is_invalidated());
        assert!(session.all_tasks().is_empty());

        let task = session.create_task(Request::get("http://example.com/"));
        assert!(session.all_tasks().is_empty());
        task.cancel();
        assert!(matches!(task.error(), Some(TaskError::SessionInvalidated)));
    }

    #[test]
    fn test_task_created_after_invalidation_does_not_pin_session() {
        let (session, dropped) = flagged_session();
        session.invalidate_and_cancel();
        let task = session.create_task(Request::get("http://a.test/"));
        assert_eq!(task.state(), TaskState::Created);

        drop(task);
        drop(session);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_repeated_invalidation_sweeps_registry() {
        let (session, dropped) = flagged_session();
        let early = session.create_task(Request::get("http://a.test/early"));
        session.invalidate_and_cancel();
        session.invalidate_and_cancel();
        assert!(session.all_tasks().is_empty());
        assert!(matches!(early.error(), Some(TaskError::SessionInvalidated)));

        drop(session);
        assert!(!dropped.load(Ordering::SeqCst), "live task still holds the session");
        drop(early);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_shared_store_outlives_session() {
        let store = Arc::new(CredentialStore::new());
        let space = ProtectionSpace::new("example.com", 80, None, AuthScheme::Basic, false);
        store.put(
            space.clone(),
            Credential::password("user", "pw", Persistence::ForSession),
            Persistence::ForSession,
        );
        let session = Session::builder()
            .credential_store(Arc::clone(&store))
            .build()
            .unwrap();
        drop(session);
        assert!(store.lookup(&space).is_some());
    }

    #[test]
    fn test_builder_applies_config() {
        let session = Session::builder()
            .config(SessionConfig {
                max_challenge_rounds: 2,
                ..SessionConfig::default()
            })
            .build()
            .unwrap();
        assert_eq!(session.config().max_challenge_rounds, 2);
        assert!(format!("{session:?}").contains("invalidated: false"));
    }
}
