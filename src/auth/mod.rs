//! Authentication challenge handling.
//!
//! This module parses `WWW-Authenticate` / `Proxy-Authenticate` challenges,
//! computes Basic and Digest answers, and resolves challenges into
//! [`Disposition`]s through the consumer's [`Handler`](crate::handler::Handler).
//!
//! # Example
//!
//! ```
//! use courier_core::auth::{basic_authorization, parse_authenticate};
//!
//! let offered = parse_authenticate(r#"Basic realm="Fake Realm""#);
//! assert_eq!(offered[0].get("realm"), Some("Fake Realm"));
//! assert_eq!(basic_authorization("user", "passwd"), "Basic dXNlcjpwYXNzd2Q=");
//! ```

mod basic;
mod challenge;
mod digest;
mod resolver;

pub use basic::basic_authorization;
pub use challenge::{
    AuthParams, Challenge, ChallengeOrigin, auth_scheme_of, parse_authenticate, select,
};
pub use digest::{
    DigestAlgorithm, DigestChallenge, DigestError, DigestInput, Qop, generate_cnonce,
};
pub use resolver::{ChallengeResolver, Disposition};

pub(crate) use resolver::panic_message;
