//! Session configuration.

use serde::Deserialize;

/// Default HTTP connect timeout (30 seconds).
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes, for large streamed bodies).
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 300;

/// Default upper bound on challenge rounds per task.
pub const DEFAULT_MAX_CHALLENGE_ROUNDS: u32 = 10;

/// What a task does when `RejectProtectionSpace` leaves no candidate
/// credential.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectExhaustion {
    /// Fall through to default handling (preset or stored credential, else
    /// the challenge response becomes final).
    #[default]
    PerformDefaultHandling,
    /// Fail the task with `CredentialsExhausted`.
    Fail,
}

/// Per-session settings. Every field has a default, so partial TOML/JSON
/// documents deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Connect timeout for the default transport.
    pub connect_timeout_secs: u64,
    /// Whole-request timeout for the default transport.
    pub read_timeout_secs: u64,
    /// Challenge rounds allowed per task before the last challenge response
    /// is delivered as final.
    pub max_challenge_rounds: u32,
    /// Behaviour when rejected protection spaces run out of candidates.
    pub reject_exhaustion: RejectExhaustion,
    /// User-Agent override for the default transport.
    pub user_agent: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            max_challenge_rounds: DEFAULT_MAX_CHALLENGE_ROUNDS,
            reject_exhaustion: RejectExhaustion::default(),
            user_agent: None,
        }
    }
}
