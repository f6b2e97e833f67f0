//! RFC 7617 Basic authentication.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Builds the `Authorization` header value for `user` / `password`.
#[must_use]
pub fn basic_authorization(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
}
