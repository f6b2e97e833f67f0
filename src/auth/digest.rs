//! RFC 7616 / RFC 2617 Digest access authentication.
//!
//! Supports the `MD5`, `MD5-sess`, `SHA-256` and `SHA-256-sess` algorithms,
//! `qop=auth`, `qop=auth-int` (buffered bodies only) and the legacy RFC 2069
//! form without `qop`.

use std::fmt;

use md5::Md5;
use sha2::{Digest as _, Sha256};
use thiserror::Error;

use super::challenge::AuthParams;

/// Errors raised while answering a Digest challenge.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DigestError {
    /// The challenge names an algorithm this client cannot compute.
    #[error("unsupported digest algorithm {0:?}")]
    UnsupportedAlgorithm(String),

    /// The challenge carries no nonce.
    #[error("digest challenge has no nonce")]
    MissingNonce,

    /// Only `auth-int` is offered but the body is streamed and cannot be hashed.
    #[error("qop=auth-int requires a buffered request body")]
    AuthIntRequiresBufferedBody,
}

/// Digest hash algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    /// `MD5` (the default when the challenge omits `algorithm`).
    Md5,
    /// `MD5-sess`.
    Md5Sess,
    /// `SHA-256`.
    Sha256,
    /// `SHA-256-sess`.
    Sha256Sess,
}

impl DigestAlgorithm {
    fn parse(name: &str) -> Option<Self> {
        [Self::Md5, Self::Md5Sess, Self::Sha256, Self::Sha256Sess]
            .into_iter()
            .find(|algorithm| algorithm.as_str().eq_ignore_ascii_case(name))
    }

    /// Name as sent on the wire.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Md5Sess => "MD5-sess",
            Self::Sha256 => "SHA-256",
            Self::Sha256Sess => "SHA-256-sess",
        }
    }

    fn is_session(self) -> bool {
        matches!(self, Self::Md5Sess | Self::Sha256Sess)
    }

    fn hash(self, data: &[u8]) -> String {
        match self {
            Self::Md5 | Self::Md5Sess => format!("{:x}", Md5::digest(data)),
            Self::Sha256 | Self::Sha256Sess => format!("{:x}", Sha256::digest(data)),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quality of protection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qop {
    /// Authentication only.
    Auth,
    /// Authentication with body integrity.
    AuthInt,
}

impl Qop {
    fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::AuthInt => "auth-int",
        }
    }
}

/// Inputs for one Digest response.
#[derive(Debug, Clone, Copy)]
pub struct DigestInput<'a> {
    pub user: &'a str,
    pub password: &'a str,
    pub method: &'a str,
    /// Request target (path and query) as sent on the request line.
    pub uri: &'a str,
    /// Request body for `auth-int`; `None` when the body is streamed.
    pub body: Option<&'a [u8]>,
    /// Nonce count for this nonce, starting at 1.
    pub nonce_count: u32,
    pub cnonce: &'a str,
}

/// A parsed Digest challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    realm: String,
    nonce: String,
    opaque: Option<String>,
    algorithm: DigestAlgorithm,
    qop: Vec<Qop>,
    stale: bool,
}

impl DigestChallenge {
    /// Reads a Digest challenge from parsed header parameters.
    ///
    /// # Errors
    ///
    /// Returns [`DigestError`] when the nonce is missing or the algorithm is
    /// not supported.
    pub fn from_params(params: &AuthParams) -> Result<Self, DigestError> {
        let nonce = params
            .get("nonce")
            .filter(|nonce| !nonce.is_empty())
            .ok_or(DigestError::MissingNonce)?;
        let algorithm = match params.get("algorithm") {
            None => DigestAlgorithm::Md5,
            Some(name) => DigestAlgorithm::parse(name)
                .ok_or_else(|| DigestError::UnsupportedAlgorithm(name.to_string()))?,
        };
        let qop = params
            .get("qop")
            .map(|options| {
                options
                    .split(',')
                    .filter_map(|option| match option.trim() {
                        o if o.eq_ignore_ascii_case("auth") => Some(Qop::Auth),
                        o if o.eq_ignore_ascii_case("auth-int") => Some(Qop::AuthInt),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            realm: params.get("realm").unwrap_or_default().to_string(),
            nonce: nonce.to_string(),
            opaque: params.get("opaque").map(str::to_string),
            algorithm,
            qop,
            stale: params
                .get("stale")
                .is_some_and(|stale| stale.eq_ignore_ascii_case("true")),
        })
    }

    /// Realm.
    #[must_use]
    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// Server nonce.
    #[must_use]
    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    /// Algorithm.
    #[must_use]
    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Whether the server marked the previous nonce as stale.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    fn choose_qop(&self, body_available: bool) -> Result<Option<Qop>, DigestError> {
        if self.qop.is_empty() {
            return Ok(None);
        }
        if self.qop.contains(&Qop::Auth) {
            return Ok(Some(Qop::Auth));
        }
        if body_available {
            Ok(Some(Qop::AuthInt))
        } else {
            Err(DigestError::AuthIntRequiresBufferedBody)
        }
    }

    /// Computes the `Authorization` header value.
    ///
    /// # Errors
    ///
    /// Returns [`DigestError::AuthIntRequiresBufferedBody`] when only
    /// `auth-int` is offered and `input.body` is `None`.
    pub fn respond(&self, input: &DigestInput<'_>) -> Result<String, DigestError> {
        let qop = self.choose_qop(input.body.is_some())?;
        let h = |data: String| self.algorithm.hash(data.as_bytes());
        let nc = format!("{:08x}", input.nonce_count);

        let mut ha1 = h(format!("{}:{}:{}", input.user, self.realm, input.password));
        if self.algorithm.is_session() {
            ha1 = h(format!("{ha1}:{}:{}", self.nonce, input.cnonce));
        }

        let ha2 = match qop {
            Some(Qop::AuthInt) => {
                let body_hash = self.algorithm.hash(input.body.unwrap_or_default());
                h(format!("{}:{}:{body_hash}", input.method, input.uri))
            }
            _ => h(format!("{}:{}", input.method, input.uri)),
        };

        let response = match qop {
            Some(qop) => h(format!(
                "{ha1}:{}:{nc}:{}:{}:{ha2}",
                self.nonce,
                input.cnonce,
                qop.as_str()
            )),
            None => h(format!("{ha1}:{}:{ha2}", self.nonce)),
        };

        let mut header = format!(
            "Digest username={}, realm={}, nonce={}, uri={}",
            quote(input.user),
            quote(&self.realm),
            quote(&self.nonce),
            quote(input.uri),
        );
        if let Some(qop) = qop {
            header.push_str(&format!(
                ", qop={}, nc={nc}, cnonce={}",
                qop.as_str(),
                quote(input.cnonce)
            ));
        } else if self.algorithm.is_session() {
            header.push_str(&format!(", cnonce={}", quote(input.cnonce)));
        }
        header.push_str(&format!(", response={}", quote(&response)));
        if let Some(opaque) = &self.opaque {
            header.push_str(&format!(", opaque={}", quote(opaque)));
        }
        header.push_str(&format!(", algorithm={}", self.algorithm));
        Ok(header)
    }
}

fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Generates a fresh client nonce (32 hex characters).
#[must_use]
pub fn generate_cnonce() -> String {
    let bytes: [u8; 16] = rand::random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
