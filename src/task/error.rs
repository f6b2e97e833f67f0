//! Error types for task execution.

use std::sync::Arc;

use thiserror::Error;

use super::{TaskId, TaskState};
use crate::transport::TransportError;

/// Terminal failure of a task, or misuse of a task handle.
///
/// `Clone` so the single stored outcome can be handed to every waiter.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    /// The operation is not valid in the task's current state.
    #[error("cannot {operation} task {task_id} in state {state}")]
    InvalidState {
        /// The task.
        task_id: TaskId,
        /// What was attempted.
        operation: &'static str,
        /// State at the time.
        state: TaskState,
    },

    /// The request failed validation (bad URL, bad header).
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// What was wrong.
        reason: String,
    },

    /// The handler cancelled an authentication challenge.
    #[error("authentication challenge for {space} was cancelled")]
    ChallengeCancelled {
        /// The challenged protection space.
        space: String,
    },

    /// Every candidate credential for a rejected protection space was tried.
    #[error("no credentials left to try for {space}")]
    CredentialsExhausted {
        /// The challenged protection space.
        space: String,
    },

    /// The task was cancelled by its owner.
    #[error("task cancelled")]
    Cancelled,

    /// Connection, TLS or body transfer failure.
    #[error(transparent)]
    Transport(TransportError),

    /// The response body did not match the expected shape.
    #[error("failed to decode response from {url}: {source}")]
    Decoding {
        /// Response URL.
        url: String,
        /// Underlying parse error.
        #[source]
        source: Arc<serde_json::Error>,
    },

    /// The owning session was invalidated.
    #[error("session invalidated")]
    SessionInvalidated,
}

impl TaskError {
    /// Creates an invalid-state error.
    pub fn invalid_state(task_id: TaskId, operation: &'static str, state: TaskState) -> Self {
        Self::InvalidState {
            task_id,
            operation,
            state,
        }
    }

    /// Creates an invalid-request error.
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Creates a challenge-cancelled error.
    pub fn challenge_cancelled(space: impl ToString) -> Self {
        Self::ChallengeCancelled {
            space: space.to_string(),
        }
    }

    /// Creates a credentials-exhausted error.
    pub fn credentials_exhausted(space: impl ToString) -> Self {
        Self::CredentialsExhausted {
            space: space.to_string(),
        }
    }

    /// Wraps a transport failure.
    pub fn transport(source: TransportError) -> Self {
        Self::Transport(source)
    }

    /// Creates a decoding error.
    pub fn decoding(url: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decoding {
            url: url.into(),
            source: Arc::new(source),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn test_invalid_state_display() {
        let error = TaskError::invalid_state(TaskId(7), "resume", TaskState::Completed);
        assert_eq!(error.to_string(), "cannot resume task 7 in state completed");
    }

    #[test]
    fn test_transport_is_transparent() {
        let error = TaskError::transport(TransportError::timeout("http://h/"));
        assert_eq!(error.to_string(), "timeout talking to http://h/");
    }

    #[test]
    fn test_decoding_keeps_source() {
        let source = serde_json::from_str::<u8>("nope").unwrap_err();
        let error = TaskError::decoding("http://h/json", source);
        assert!(error.to_string().contains("http://h/json"));
        assert!(error.source().is_some());
        let cloned = error.clone();
        assert!(matches!(cloned, TaskError::Decoding { .. }));
    }
}
