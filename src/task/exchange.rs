//! The exchange state machine that drives a task to completion.
//!
//! Each loop iteration is one wire exchange. A non-challenge response ends
//! the task; a 401/407 or server-trust challenge is resolved through the
//! handler and, depending on the disposition, either ends the task or
//! prepares the next exchange. Transport failures are never retried.

use std::collections::{HashMap, HashSet};

use futures_util::StreamExt;
use tracing::{debug, instrument, warn};
use url::{Position, Url};

use super::{Task, TaskError, TaskState, guarded};
use crate::auth::{
    AuthParams, Challenge, ChallengeOrigin, ChallengeResolver, DigestChallenge, DigestError,
    DigestInput, Disposition, auth_scheme_of, basic_authorization, generate_cnonce, select,
};
use crate::credential::{AuthScheme, Credential, ProtectionSpace};
use crate::http::Response;
use crate::session::RejectExhaustion;
use crate::transport::{
    OutgoingBody, OutgoingRequest, ServerTrustSignal, TransportError, TransportReply,
    TransportResponse,
};

/// Runs `task` until it reaches a terminal state. Cancellation wins over
/// progress at every suspension point.
pub(super) async fn drive(task: Task) {
    let outcome = tokio::select! {
        biased;
        () = task.cancellation().cancelled() => Err(task.cancellation_error()),
        result = run(&task) => result,
    };
    task.finish(outcome).await;
}

#[instrument(level = "debug", skip_all, fields(task_id = %task.id(), url = %task.request().url()))]
async fn run(task: &Task) -> Result<Response, TaskError> {
    let target = task.target()?;
    Exchange::new(task, target).run().await
}

/// A challenge awaiting a decision, plus the response that raised it.
struct Pending {
    challenge: Challenge,
    kind: PendingKind,
}

enum PendingKind {
    Credential {
        origin: ChallengeOrigin,
        params: AuthParams,
        response: Response,
    },
    ServerTrust(ServerTrustSignal),
}

/// What the task does after a challenge has been decided.
enum Step {
    Retry,
    Finish(Result<Response, TaskError>),
}

struct Exchange<'a> {
    task: &'a Task,
    target: Url,
    resolver: ChallengeResolver,
    /// Header carrying the answer to the last challenge.
    authorization: Option<(&'static str, String)>,
    accept_invalid_certs: bool,
    tried: HashMap<ProtectionSpace, HashSet<Credential>>,
    seen: HashMap<ProtectionSpace, u32>,
    nonce_counts: HashMap<String, u32>,
    cnonce: String,
    exchanges: u32,
}

impl<'a> Exchange<'a> {
    fn new(task: &'a Task, target: Url) -> Self {
        Self {
            task,
            target,
            resolver: ChallengeResolver::new(task.handler().clone()),
            authorization: None,
            accept_invalid_certs: false,
            tried: HashMap::new(),
            seen: HashMap::new(),
            nonce_counts: HashMap::new(),
            cnonce: generate_cnonce(),
            exchanges: 0,
        }
    }

    async fn run(mut self) -> Result<Response, TaskError> {
        loop {
            self.task.set_state(TaskState::Sending);
            let reply = self.send().await?;

            let pending = match reply {
                TransportReply::ServerTrust(signal) => self.trust_challenge(signal),
                TransportReply::Response(response) => {
                    match select(response.status, &response.headers) {
                        None => return self.deliver(response).await,
                        Some((origin, params)) => match self.challenge_space(&response, &params) {
                            Some(space) => {
                                self.credential_challenge(space, origin, params, response)
                                    .await?
                            }
                            None => return self.deliver(response).await,
                        },
                    }
                }
            };

            let round = self.task.record_challenge();
            let max_rounds = self.task.session().config.max_challenge_rounds;
            if round > max_rounds {
                warn!(
                    round,
                    max_rounds,
                    space = %pending.challenge.protection_space(),
                    "challenge round limit reached"
                );
                return self.give_up(pending).await;
            }

            self.task.set_state(TaskState::AwaitingChallengeDecision);
            self.task
                .set_pending_space(Some(pending.challenge.protection_space().clone()));
            let disposition = self.resolver.resolve(self.task, &pending.challenge).await;
            self.task.set_pending_space(None);
            debug!(
                round,
                disposition = disposition.name(),
                space = %pending.challenge.protection_space(),
                "challenge decided"
            );

            match self.apply(disposition, pending).await {
                Step::Retry => self.task.set_state(TaskState::Retrying),
                Step::Finish(outcome) => return outcome,
            }
        }
    }

    /// Builds and sends one exchange.
    async fn send(&mut self) -> Result<TransportReply, TaskError> {
        let request = self.task.request();
        let body = self.acquire_body().await;
        let mut headers = request.headers().clone();
        if let Some((name, value)) = &self.authorization {
            headers.set(*name, value.clone());
        }
        self.exchanges += 1;
        debug!(exchange = self.exchanges, method = %request.method(), "sending");

        self.task
            .session()
            .transport
            .send(OutgoingRequest {
                method: request.method().clone(),
                url: self.target.clone(),
                headers,
                body,
                accept_invalid_certs: self.accept_invalid_certs,
            })
            .await
            .map_err(TaskError::transport)
    }

    /// A stream source wins over a body buffer. Retries ask the handler for
    /// a fresh stream first, then re-open the source.
    async fn acquire_body(&self) -> OutgoingBody {
        let request = self.task.request();
        if let Some(source) = request.body_source() {
            if self.exchanges > 0 {
                let supplied = guarded(
                    "on_need_body_stream",
                    self.task.handler().on_need_body_stream(self.task),
                )
                .await
                .flatten();
                if let Some(stream) = supplied {
                    return OutgoingBody::Streamed(stream);
                }
            }
            return OutgoingBody::Streamed(source.open());
        }
        match request.body() {
            Some(body) => OutgoingBody::Buffered(body.clone()),
            None => OutgoingBody::Empty,
        }
    }

    /// Streams a final response through `on_body` and accumulates it.
    async fn deliver(&self, response: TransportResponse) -> Result<Response, TaskError> {
        let TransportResponse {
            status,
            headers,
            url,
            mut body,
        } = response;
        let mut buffer = Vec::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(TaskError::transport)?;
            if chunk.is_empty() {
                continue;
            }
            guarded("on_body", self.task.handler().on_body(self.task, &chunk)).await;
            buffer.extend_from_slice(&chunk);
        }
        Ok(Response::new(status, headers, url, buffer))
    }

    /// Delivers an already-buffered challenge response as the final one.
    async fn deliver_buffered(&self, response: Response) -> Result<Response, TaskError> {
        if !response.body().is_empty() {
            guarded("on_body", self.task.handler().on_body(self.task, response.body())).await;
        }
        Ok(response)
    }

    /// Buffers a 401/407 response and builds the challenge it raises.
    async fn credential_challenge(
        &mut self,
        space: ProtectionSpace,
        origin: ChallengeOrigin,
        params: AuthParams,
        response: TransportResponse,
    ) -> Result<Pending, TaskError> {
        let TransportResponse {
            status,
            headers,
            url,
            mut body,
        } = response;
        let mut buffer = Vec::new();
        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(&chunk.map_err(TaskError::transport)?);
        }
        let response = Response::new(status, headers.clone(), url, buffer);

        let failures = self.bump_seen(&space);
        let proposed = self.task.session().credentials.lookup(&space);
        let challenge = Challenge::from_response(
            space, origin, &params, failures, proposed, status, headers,
        );
        Ok(Pending {
            challenge,
            kind: PendingKind::Credential {
                origin,
                params,
                response,
            },
        })
    }

    fn trust_challenge(&mut self, signal: ServerTrustSignal) -> Pending {
        let space = ProtectionSpace::server_trust(&signal.host, signal.port);
        let failures = self.bump_seen(&space);
        Pending {
            challenge: Challenge::server_trust(space, &signal.reason, failures),
            kind: PendingKind::ServerTrust(signal),
        }
    }

    /// Protection space of a 401/407 challenge. Proxy challenges are keyed by
    /// the target endpoint too; the proxy address is the transport's concern.
    ///
    /// A challenge raised after a redirect belongs to the resource that
    /// raised it, so the exchange moves there before the space is derived.
    fn challenge_space(
        &mut self,
        response: &TransportResponse,
        params: &AuthParams,
    ) -> Option<ProtectionSpace> {
        let scheme = auth_scheme_of(params)?;
        self.follow(&response.url);
        ProtectionSpace::for_url(&self.target, params.get("realm"), scheme)
    }

    /// Retargets the exchange at `url` when it differs from the current one.
    fn follow(&mut self, url: &str) {
        match Url::parse(url) {
            Ok(url) => {
                if url != self.target {
                    debug!(from = %self.target, to = %url, "challenge raised after redirect");
                    self.target = url;
                }
            }
            Err(error) => warn!(url, error = %error, "response url unparseable; keeping target"),
        }
    }

    /// Records a challenge for `space`, returning how many came before it.
    fn bump_seen(&mut self, space: &ProtectionSpace) -> u32 {
        let seen = self.seen.entry(space.clone()).or_insert(0);
        let previous = *seen;
        *seen += 1;
        previous
    }

    async fn apply(&mut self, disposition: Disposition, pending: Pending) -> Step {
        let Pending { challenge, kind } = pending;
        match kind {
            PendingKind::ServerTrust(signal) => self.apply_trust(disposition, &challenge, signal),
            PendingKind::Credential {
                origin,
                params,
                response,
            } => {
                self.apply_credential(disposition, &challenge, origin, &params, response)
                    .await
            }
        }
    }

    fn apply_trust(
        &mut self,
        disposition: Disposition,
        challenge: &Challenge,
        signal: ServerTrustSignal,
    ) -> Step {
        match disposition {
            Disposition::UseCredential(Some(_)) => {
                debug!(host = %signal.host, "server trust accepted");
                self.accept_invalid_certs = true;
                Step::Retry
            }
            Disposition::CancelAuthenticationChallenge => Step::Finish(Err(
                TaskError::challenge_cancelled(challenge.protection_space()),
            )),
            Disposition::UseCredential(None)
            | Disposition::RejectProtectionSpace
            | Disposition::PerformDefaultHandling => Step::Finish(Err(untrusted(signal))),
        }
    }

    async fn apply_credential(
        &mut self,
        disposition: Disposition,
        challenge: &Challenge,
        origin: ChallengeOrigin,
        params: &AuthParams,
        response: Response,
    ) -> Step {
        let space = challenge.protection_space();
        let credential = match disposition {
            Disposition::UseCredential(credential) => credential,
            Disposition::CancelAuthenticationChallenge => {
                return Step::Finish(Err(TaskError::challenge_cancelled(space)));
            }
            Disposition::RejectProtectionSpace => {
                let tried = self.tried.entry(space.clone()).or_default();
                match self.task.session().credentials.next_candidate(space, tried) {
                    Some(candidate) => Some(candidate),
                    None => match self.task.session().config.reject_exhaustion {
                        RejectExhaustion::Fail => {
                            return Step::Finish(Err(TaskError::credentials_exhausted(space)));
                        }
                        RejectExhaustion::PerformDefaultHandling => {
                            debug!(space = %space, "no candidates left; default handling");
                            self.default_credential(space)
                        }
                    },
                }
            }
            Disposition::PerformDefaultHandling => self.default_credential(space),
        };

        let Some(credential) = credential else {
            return Step::Finish(self.deliver_buffered(response).await);
        };

        match self.answer(origin, params, space, &credential) {
            Ok(header) => {
                self.tried
                    .entry(space.clone())
                    .or_default()
                    .insert(credential);
                self.authorization = Some(header);
                Step::Retry
            }
            Err(error) => {
                warn!(error = %error, space = %space, "cannot answer digest challenge");
                Step::Finish(self.deliver_buffered(response).await)
            }
        }
    }

    /// First untried credential of the task preset and the store default.
    fn default_credential(&self, space: &ProtectionSpace) -> Option<Credential> {
        let tried = self.tried.get(space);
        [
            self.task.credentials(),
            self.task.session().credentials.lookup(space),
        ]
        .into_iter()
        .flatten()
        .find(|candidate| {
            candidate.answers(space.scheme())
                && tried.is_none_or(|tried| !tried.contains(candidate))
        })
    }

    /// Computes the authorization header answering `params` with `credential`.
    fn answer(
        &mut self,
        origin: ChallengeOrigin,
        params: &AuthParams,
        space: &ProtectionSpace,
        credential: &Credential,
    ) -> Result<(&'static str, String), DigestError> {
        let user = credential.user().unwrap_or_default();
        let password = credential.secret().unwrap_or_default();
        let value = match space.scheme() {
            AuthScheme::Digest => {
                let digest = DigestChallenge::from_params(params)?;
                let nonce_count = self
                    .nonce_counts
                    .entry(digest.nonce().to_string())
                    .and_modify(|count| *count += 1)
                    .or_insert(1);
                let request = self.task.request();
                let body = match (request.body_source(), request.body()) {
                    (Some(_), _) => None,
                    (None, Some(body)) => Some(body.as_ref()),
                    (None, None) => Some(&[][..]),
                };
                digest.respond(&DigestInput {
                    user,
                    password,
                    method: request.method().as_str(),
                    uri: &self.target[Position::BeforePath..Position::AfterQuery],
                    body,
                    nonce_count: *nonce_count,
                    cnonce: &self.cnonce,
                })?
            }
            AuthScheme::Basic | AuthScheme::ServerTrust => basic_authorization(user, password),
        };
        Ok((origin.authorization_header(), value))
    }

    /// Ends the task after the round limit: a credential challenge's response
    /// becomes final, a trust challenge fails.
    async fn give_up(&self, pending: Pending) -> Result<Response, TaskError> {
        match pending.kind {
            PendingKind::Credential { response, .. } => self.deliver_buffered(response).await,
            PendingKind::ServerTrust(signal) => Err(untrusted(signal)),
        }
    }
}

fn untrusted(signal: ServerTrustSignal) -> TaskError {
    TaskError::transport(TransportError::untrusted_server(
        signal.host,
        signal.port,
        signal.reason,
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_untrusted_maps_signal() {
        let error = untrusted(ServerTrustSignal {
            host: "h".into(),
            port: 443,
            reason: "certificate expired".into(),
        });
        assert!(matches!(
            error,
            TaskError::Transport(TransportError::UntrustedServer { port: 443, .. })
        ));
    }
}
