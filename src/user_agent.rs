//! Default User-Agent string.

/// Project URL for User-Agent identification (RFC 9308 good citizenship).
const PROJECT_UA_URL: &str = "https://github.com/fierce/courier";

/// Default User-Agent for requests that do not set one.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("courier/{version} (+{PROJECT_UA_URL})")
}
