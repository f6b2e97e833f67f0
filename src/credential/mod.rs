//! Credentials, protection spaces and the shared credential store.
//!
//! - [`ProtectionSpace`] - the (host, port, realm, scheme) a challenge applies to
//! - [`Credential`] - username/password or server-trust acceptance
//! - [`CredentialStore`] - concurrent space → credentials mapping

mod identity;
mod space;
mod store;

pub use identity::{Credential, Persistence};
pub use space::{AuthScheme, ProtectionSpace};
pub use store::CredentialStore;
