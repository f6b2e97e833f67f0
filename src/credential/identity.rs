//! Credentials and their persistence policy.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::Deserialize;

use super::AuthScheme;

/// How long a credential is retained by a [`CredentialStore`](super::CredentialStore).
///
/// Persistence only affects storage lifecycle, never what goes on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persistence {
    /// Never retained by a store; usable only where it is handed over directly.
    None,
    /// Retained until the owning session ends.
    #[default]
    ForSession,
    /// Retained beyond the session; exported through
    /// [`CredentialStore::permanent_entries`](super::CredentialStore::permanent_entries).
    Permanent,
}

#[derive(Clone, PartialEq, Eq, Hash)]
enum CredentialKind {
    Password { user: String, password: String },
    ServerTrust,
}

/// A username/password pair, or an acceptance of an untrusted server.
///
/// Equality and hashing cover what the credential authenticates as;
/// persistence does not participate. The password never appears in `Debug`
/// output.
#[derive(Clone)]
pub struct Credential {
    kind: CredentialKind,
    persistence: Persistence,
}

impl Credential {
    /// Creates a username/password credential.
    #[must_use]
    pub fn password(
        user: impl Into<String>,
        password: impl Into<String>,
        persistence: Persistence,
    ) -> Self {
        Self {
            kind: CredentialKind::Password {
                user: user.into(),
                password: password.into(),
            },
            persistence,
        }
    }

    /// Creates a credential that accepts the server's certificate chain.
    #[must_use]
    pub fn server_trust() -> Self {
        Self {
            kind: CredentialKind::ServerTrust,
            persistence: Persistence::None,
        }
    }

    /// Username, for password credentials.
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        match &self.kind {
            CredentialKind::Password { user, .. } => Some(user),
            CredentialKind::ServerTrust => None,
        }
    }

    /// Password, for password credentials.
    ///
    /// Sensitive: avoid logging the return value.
    #[must_use]
    pub fn secret(&self) -> Option<&str> {
        match &self.kind {
            CredentialKind::Password { password, .. } => Some(password),
            CredentialKind::ServerTrust => None,
        }
    }

    /// Persistence policy.
    #[must_use]
    pub fn persistence(&self) -> Persistence {
        self.persistence
    }

    /// Returns the same credential with a different persistence policy.
    #[must_use]
    pub fn with_persistence(mut self, persistence: Persistence) -> Self {
        self.persistence = persistence;
        self
    }

    /// Returns true for server-trust credentials.
    #[must_use]
    pub fn is_server_trust(&self) -> bool {
        matches!(self.kind, CredentialKind::ServerTrust)
    }

    /// Returns true when this credential can answer a challenge of `scheme`.
    #[must_use]
    pub fn answers(&self, scheme: AuthScheme) -> bool {
        match self.kind {
            CredentialKind::Password { .. } => !scheme.is_server_trust(),
            CredentialKind::ServerTrust => scheme.is_server_trust(),
        }
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for Credential {}

impl Hash for Credential {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            CredentialKind::Password { user, .. } => f
                .debug_struct("Credential")
                .field("user", user)
                .field("password", &"[REDACTED]")
                .field("persistence", &self.persistence)
                .finish(),
            CredentialKind::ServerTrust => f
                .debug_struct("Credential")
                .field("server_trust", &true)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_debug_redacts_password() {
        let credential = Credential::password("user", "passwd", Persistence::None);
        let debug = format!("{credential:?}");
        assert!(debug.contains("user"));
        assert!(!debug.contains("passwd"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_equality_ignores_persistence() {
        let a = Credential::password("user", "passwd", Persistence::None);
        let b = Credential::password("user", "passwd", Persistence::Permanent);
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_different_passwords_are_distinct() {
        let a = Credential::password("user", "one", Persistence::ForSession);
        let b = Credential::password("user", "two", Persistence::ForSession);
        assert_ne!(a, b);
    }

    #[test]
    fn test_answers_matches_challenge_kind() {
        let password = Credential::password("u", "p", Persistence::ForSession);
        let trust = Credential::server_trust();
        assert!(password.answers(AuthScheme::Basic));
        assert!(password.answers(AuthScheme::Digest));
        assert!(!password.answers(AuthScheme::ServerTrust));
        assert!(trust.answers(AuthScheme::ServerTrust));
        assert!(!trust.answers(AuthScheme::Digest));
        assert!(trust.user().is_none());
    }

    #[test]
    fn test_default_persistence_is_for_session() {
        assert_eq!(Persistence::default(), Persistence::ForSession);
    }
}
