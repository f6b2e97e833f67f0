//! Protection spaces: the (host, port, realm, scheme) an authentication
//! challenge applies to.

use std::fmt;

use url::Url;

/// Authentication scheme of a protection space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AuthScheme {
    /// RFC 7617 Basic.
    Basic,
    /// RFC 7616 Digest.
    Digest,
    /// TLS server-trust evaluation; answered with a trust decision, not a
    /// username and password.
    ServerTrust,
}

impl AuthScheme {
    /// Canonical scheme name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "Basic",
            Self::Digest => "Digest",
            Self::ServerTrust => "ServerTrust",
        }
    }

    /// Returns true for the server-trust pseudo scheme.
    #[must_use]
    pub fn is_server_trust(self) -> bool {
        matches!(self, Self::ServerTrust)
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies which credential applies to a challenge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProtectionSpace {
    host: String,
    port: u16,
    realm: Option<String>,
    scheme: AuthScheme,
    secure: bool,
}

impl ProtectionSpace {
    /// Creates a protection space. The host is stored lowercased.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        port: u16,
        realm: Option<String>,
        scheme: AuthScheme,
        secure: bool,
    ) -> Self {
        Self {
            host: host.into().to_ascii_lowercase(),
            port,
            realm,
            scheme,
            secure,
        }
    }

    /// Derives the protection space for `url`.
    ///
    /// Returns `None` when the URL has no host.
    #[must_use]
    pub fn for_url(url: &Url, realm: Option<&str>, scheme: AuthScheme) -> Option<Self> {
        let host = url.host_str().filter(|host| !host.is_empty())?;
        let port = url.port_or_known_default()?;
        Some(Self::new(
            host,
            port,
            realm.map(str::to_string),
            scheme,
            url.scheme() == "https",
        ))
    }

    /// Protection space for a TLS server-trust evaluation.
    #[must_use]
    pub fn server_trust(host: impl Into<String>, port: u16) -> Self {
        Self::new(host, port, None, AuthScheme::ServerTrust, true)
    }

    /// Host name (lowercase).
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Realm announced by the server, if any.
    #[must_use]
    pub fn realm(&self) -> Option<&str> {
        self.realm.as_deref()
    }

    /// Authentication scheme.
    #[must_use]
    pub fn scheme(&self) -> AuthScheme {
        self.scheme
    }

    /// Whether the connection is TLS-protected.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Returns true when both spaces address the same endpoint, ignoring
    /// realm and scheme.
    #[must_use]
    pub fn same_origin(&self, other: &Self) -> bool {
        self.host == other.host && self.port == other.port && self.secure == other.secure
    }
}

impl fmt::Display for ProtectionSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let transport = if self.secure { "https" } else { "http" };
        write!(f, "{} {transport}://{}:{}", self.scheme, self.host, self.port)?;
        if let Some(realm) = &self.realm {
            write!(f, " realm={realm:?}")?;
        }
        Ok(())
    }
}
