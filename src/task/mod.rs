//! Tasks: one logical request driven through one or more exchanges.
//!
//! A [`Task`] is created by a [`Session`](crate::session::Session) in the
//! [`TaskState::Created`] state and does nothing until
//! [`resume`](Task::resume) spawns its exchange sequence on the Tokio
//! runtime. The sequence runs as an independent unit of work; tasks of one
//! session progress concurrently.
//!
//! ```text
//! Created → Sending → AwaitingChallengeDecision → Retrying → Sending → … → Completed
//!                                                                      ↘ Failed
//! ```
//!
//! The terminal outcome is stored once, reported once through
//! [`Handler::on_complete`](crate::handler::Handler::on_complete), and
//! returned to every [`wait`](Task::wait) caller.

mod error;
mod exchange;

pub use error::TaskError;

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use futures_util::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::panic_message;
use crate::credential::{Credential, ProtectionSpace};
use crate::handler::Handler;
use crate::http::{Request, Response};
use crate::session::SessionShared;

/// Task identifier, unique within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Created, not yet resumed.
    Created,
    /// An exchange is in flight.
    Sending,
    /// Waiting for the handler to decide on a challenge.
    AwaitingChallengeDecision,
    /// A decision was made; the next exchange is being prepared.
    Retrying,
    /// A final response was received.
    Completed,
    /// The task failed.
    Failed,
}

impl TaskState {
    /// Returns true for `Completed` and `Failed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Sending => "sending",
            Self::AwaitingChallengeDecision => "awaiting_challenge_decision",
            Self::Retrying => "retrying",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct TaskInner {
    id: TaskId,
    request: Request,
    target: Result<Url, TaskError>,
    handler: Arc<dyn Handler>,
    session: Arc<SessionShared>,
    state: watch::Sender<TaskState>,
    done: watch::Sender<bool>,
    started: AtomicBool,
    challenge_count: AtomicU32,
    preset: Mutex<Option<Credential>>,
    pending_space: Mutex<Option<ProtectionSpace>>,
    outcome: OnceLock<Result<Response, TaskError>>,
    cancel: CancellationToken,
}

/// Handle to one logical request.
///
/// Cheap to clone; all clones observe the same task.
#[derive(Clone)]
pub struct Task {
    inner: Arc<TaskInner>,
}

impl Task {
    pub(crate) fn new(
        id: TaskId,
        request: Request,
        target: Result<Url, TaskError>,
        handler: Arc<dyn Handler>,
        session: Arc<SessionShared>,
    ) -> Self {
        let cancel = session.token.child_token();
        Self {
            inner: Arc::new(TaskInner {
                id,
                request,
                target,
                handler,
                session,
                state: watch::Sender::new(TaskState::Created),
                done: watch::Sender::new(false),
                started: AtomicBool::new(false),
                challenge_count: AtomicU32::new(0),
                preset: Mutex::new(None),
                pending_space: Mutex::new(None),
                outcome: OnceLock::new(),
                cancel,
            }),
        }
    }

    /// Task identifier.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        *self.inner.state.borrow()
    }

    /// Number of authentication challenges observed so far, including
    /// repeats for the same protection space.
    #[must_use]
    pub fn challenge_count(&self) -> u32 {
        self.inner.challenge_count.load(Ordering::SeqCst)
    }

    /// The request this task sends.
    #[must_use]
    pub fn request(&self) -> &Request {
        &self.inner.request
    }

    /// The final response, once the task has completed.
    #[must_use]
    pub fn response(&self) -> Option<Response> {
        match self.inner.outcome.get() {
            Some(Ok(response)) => Some(response.clone()),
            _ => None,
        }
    }

    /// The failure, once the task has failed.
    #[must_use]
    pub fn error(&self) -> Option<TaskError> {
        match self.inner.outcome.get() {
            Some(Err(error)) => Some(error.clone()),
            _ => None,
        }
    }

    /// Sets the credential used for default handling of credential
    /// challenges, ahead of the credential store's default.
    pub fn set_credentials(&self, credential: Credential) {
        *self.lock_preset() = Some(credential);
    }

    /// The preset credential, if any.
    #[must_use]
    pub fn credentials(&self) -> Option<Credential> {
        self.lock_preset().clone()
    }

    /// Starts the task.
    ///
    /// Resuming a task that is already running is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::InvalidState`] if the task is terminal or no
    /// Tokio runtime is available.
    pub fn resume(&self) -> Result<(), TaskError> {
        let state = self.state();
        if state.is_terminal() {
            return Err(TaskError::invalid_state(self.id(), "resume", state));
        }
        let runtime = Handle::try_current().map_err(|_| {
            TaskError::invalid_state(self.id(), "resume outside a Tokio runtime", state)
        })?;
        if self.inner.started.swap(true, Ordering::SeqCst) {
            debug!(task_id = %self.id(), "resume on running task ignored");
            return Ok(());
        }
        runtime.spawn(exchange::drive(self.clone()));
        Ok(())
    }

    /// Cancels the task.
    ///
    /// In `Sending` the transport call is aborted and the task fails with
    /// [`TaskError::Cancelled`]; in `AwaitingChallengeDecision` it fails with
    /// [`TaskError::ChallengeCancelled`]. A task that was never resumed is
    /// moved to `Failed` as well. Cancelling a terminal task does nothing.
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }
        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(exchange::drive(self.clone()));
            }
            Err(_) => self.abandon(),
        }
    }

    /// Waits for the terminal outcome.
    ///
    /// # Errors
    ///
    /// Returns the task's failure, or [`TaskError::InvalidState`] if the
    /// task was never started.
    pub async fn wait(&self) -> Result<Response, TaskError> {
        if !self.inner.started.load(Ordering::SeqCst) {
            return Err(TaskError::invalid_state(self.id(), "wait on", self.state()));
        }
        let mut done = self.inner.done.subscribe();
        // The sender lives in `inner`, which `self` keeps alive.
        let _ = done.wait_for(|finished| *finished).await;
        self.inner
            .outcome
            .get()
            .cloned()
            .unwrap_or_else(|| Err(TaskError::invalid_state(self.id(), "wait on", self.state())))
    }

    pub(crate) fn handler(&self) -> &Arc<dyn Handler> {
        &self.inner.handler
    }

    pub(crate) fn session(&self) -> &SessionShared {
        &self.inner.session
    }

    pub(crate) fn target(&self) -> Result<Url, TaskError> {
        self.inner.target.clone()
    }

    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        let previous = self.inner.state.send_replace(state);
        if previous != state {
            debug!(task_id = %self.id(), from = %previous, to = %state, "task state changed");
        }
    }

    /// Counts one more observed challenge and returns the new total.
    pub(crate) fn record_challenge(&self) -> u32 {
        self.inner.challenge_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn set_pending_space(&self, space: Option<ProtectionSpace>) {
        *self
            .inner
            .pending_space
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = space;
    }

    /// The error a cancellation produces in the current state.
    pub(crate) fn cancellation_error(&self) -> TaskError {
        if self.inner.session.token.is_cancelled() {
            return TaskError::SessionInvalidated;
        }
        if self.state() == TaskState::AwaitingChallengeDecision {
            let space = self
                .inner
                .pending_space
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .as_ref()
                .map_or_else(|| "unknown protection space".to_string(), ToString::to_string);
            return TaskError::challenge_cancelled(space);
        }
        TaskError::Cancelled
    }

    /// Stores the outcome, notifies the handler and wakes waiters. Only the
    /// first call has any effect.
    pub(crate) async fn finish(&self, outcome: Result<Response, TaskError>) {
        if !self.store_outcome(&outcome) {
            return;
        }
        guarded("on_complete", self.inner.handler.on_complete(self, &outcome)).await;
        self.release();
    }

    /// Terminates a never-started task without a runtime; no callback runs.
    fn abandon(&self) {
        if self.store_outcome(&Err(self.cancellation_error())) {
            self.release();
        }
    }

    fn store_outcome(&self, outcome: &Result<Response, TaskError>) -> bool {
        if self.inner.outcome.set(outcome.clone()).is_err() {
            return false;
        }
        self.set_pending_space(None);
        let rounds = self.challenge_count();
        match outcome {
            Ok(response) => {
                self.set_state(TaskState::Completed);
                info!(
                    task_id = %self.id(),
                    url = %self.inner.request.url(),
                    status = response.status(),
                    rounds,
                    "task completed"
                );
            }
            Err(error) => {
                self.set_state(TaskState::Failed);
                info!(
                    task_id = %self.id(),
                    url = %self.inner.request.url(),
                    rounds,
                    error = %error,
                    "task failed"
                );
            }
        }
        true
    }

    fn release(&self) {
        self.inner.session.registry.remove(self.id());
        self.inner.done.send_replace(true);
    }

    fn lock_preset(&self) -> std::sync::MutexGuard<'_, Option<Credential>> {
        self.inner
            .preset
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("challenge_count", &self.challenge_count())
            .field("url", &self.inner.request.url())
            .finish_non_exhaustive()
    }
}

/// Runs a handler callback, turning a panic into `None`.
pub(crate) async fn guarded<T>(
    callback: &'static str,
    future: impl Future<Output = T>,
) -> Option<T> {
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(value) => Some(value),
        Err(panic) => {
            warn!(
                callback,
                panic = %panic_message(panic.as_ref()),
                "handler callback panicked"
            );
            None
        }
    }
}
