//! Dispatches challenges to the handler and normalizes its decision.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::{debug, instrument, warn};

use crate::credential::Credential;
use crate::handler::Handler;
use crate::task::Task;

use super::Challenge;

/// A handler's decision for one challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Retry with this credential. `None` is treated as
    /// [`Disposition::PerformDefaultHandling`].
    UseCredential(Option<Credential>),
    /// Stop; the task fails with `ChallengeCancelled`.
    CancelAuthenticationChallenge,
    /// Skip this protection space and try the next stored candidate.
    RejectProtectionSpace,
    /// Let the engine apply its default policy.
    PerformDefaultHandling,
}

impl Disposition {
    /// Short name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::UseCredential(_) => "use_credential",
            Self::CancelAuthenticationChallenge => "cancel",
            Self::RejectProtectionSpace => "reject_protection_space",
            Self::PerformDefaultHandling => "perform_default_handling",
        }
    }
}

/// Stateless dispatch from a [`Challenge`] to a [`Disposition`].
///
/// Server-trust challenges go to [`Handler::on_server_trust`], credential
/// challenges to [`Handler::on_challenge`]. A handler that errors or panics
/// yields [`Disposition::PerformDefaultHandling`], so the task always makes
/// progress.
#[derive(Clone)]
pub struct ChallengeResolver {
    handler: Arc<dyn Handler>,
}

impl ChallengeResolver {
    /// Binds a resolver to `handler`.
    #[must_use]
    pub fn new(handler: Arc<dyn Handler>) -> Self {
        Self { handler }
    }

    /// Asks the handler for a disposition.
    #[instrument(
        level = "debug",
        skip_all,
        fields(task_id = %task.id(), space = %challenge.protection_space())
    )]
    pub async fn resolve(&self, task: &Task, challenge: &Challenge) -> Disposition {
        let decision = if challenge.is_server_trust() {
            self.handler.on_server_trust(task, challenge)
        } else {
            self.handler.on_challenge(task, challenge)
        };

        let disposition = match AssertUnwindSafe(decision).catch_unwind().await {
            Ok(Ok(disposition)) => disposition,
            Ok(Err(error)) => {
                warn!(error = %error, "handler failed to decide; performing default handling");
                Disposition::PerformDefaultHandling
            }
            Err(panic) => {
                warn!(
                    panic = %panic_message(panic.as_ref()),
                    "handler panicked while deciding; performing default handling"
                );
                Disposition::PerformDefaultHandling
            }
        };

        let disposition = normalize(disposition, challenge);
        debug!(disposition = disposition.name(), "challenge resolved");
        disposition
    }
}

impl std::fmt::Debug for ChallengeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChallengeResolver").finish_non_exhaustive()
    }
}

fn normalize(disposition: Disposition, challenge: &Challenge) -> Disposition {
    match disposition {
        Disposition::UseCredential(None) => Disposition::PerformDefaultHandling,
        Disposition::UseCredential(Some(credential))
            if !credential.answers(challenge.protection_space().scheme()) =>
        {
            warn!(
                scheme = %challenge.protection_space().scheme(),
                "credential cannot answer this challenge; performing default handling"
            );
            Disposition::PerformDefaultHandling
        }
        other => other,
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
