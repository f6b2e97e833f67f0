//! Authentication challenges: `WWW-Authenticate` / `Proxy-Authenticate`
//! parsing and the [`Challenge`] value handed to handlers.

use crate::credential::{AuthScheme, Credential, ProtectionSpace};
use crate::http::Headers;

use super::digest::DigestChallenge;

/// Which party issued a credential challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeOrigin {
    /// The origin server (401).
    Server,
    /// An intermediate proxy (407).
    Proxy,
}

impl ChallengeOrigin {
    /// Maps a challenge status to its origin.
    #[must_use]
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            401 => Some(Self::Server),
            407 => Some(Self::Proxy),
            _ => None,
        }
    }

    /// Header the challenge is announced in.
    #[must_use]
    pub fn authenticate_header(self) -> &'static str {
        match self {
            Self::Server => "WWW-Authenticate",
            Self::Proxy => "Proxy-Authenticate",
        }
    }

    /// Header the answer is sent in.
    #[must_use]
    pub fn authorization_header(self) -> &'static str {
        match self {
            Self::Server => "Authorization",
            Self::Proxy => "Proxy-Authorization",
        }
    }
}

/// One challenge from an authenticate header: scheme plus parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthParams {
    scheme: String,
    params: Vec<(String, String)>,
}

impl AuthParams {
    /// Scheme token as sent by the server.
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Returns true when the scheme matches `name`, ignoring case.
    #[must_use]
    pub fn is_scheme(&self, name: &str) -> bool {
        self.scheme.eq_ignore_ascii_case(name)
    }

    /// Parameter value by name, ignoring case.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// All parameters in header order. Names are lowercased.
    #[must_use]
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_while(&mut self, pred: impl Fn(char) -> bool) {
        while self.peek().is_some_and(&pred) {
            self.bump();
        }
    }

    fn token(&mut self) -> &'a str {
        let start = self.pos;
        self.skip_while(is_tchar);
        &self.input[start..self.pos]
    }

    fn value(&mut self) -> String {
        if self.peek() != Some('"') {
            let start = self.pos;
            self.skip_while(|c| c != ',' && !c.is_ascii_whitespace());
            return self.input[start..self.pos].to_string();
        }
        self.bump();
        let mut out = String::new();
        while let Some(c) = self.bump() {
            match c {
                '\\' => {
                    if let Some(escaped) = self.bump() {
                        out.push(escaped);
                    }
                }
                '"' => break,
                _ => out.push(c),
            }
        }
        out
    }
}

fn is_tchar(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c)
}

/// Parses an authenticate header value into its challenges.
///
/// A single header may carry several comma-separated challenges; each
/// starts with a scheme token not followed by `=`. Malformed input yields
/// whatever challenges could be recognized.
#[must_use]
pub fn parse_authenticate(value: &str) -> Vec<AuthParams> {
    let mut cursor = Cursor { input: value, pos: 0 };
    let mut challenges = Vec::new();
    let mut current: Option<AuthParams> = None;

    loop {
        cursor.skip_while(|c| c == ',' || c.is_ascii_whitespace());
        if cursor.peek().is_none() {
            break;
        }

        let name = cursor.token();
        if name.is_empty() {
            cursor.bump();
            continue;
        }

        cursor.skip_while(|c| c.is_ascii_whitespace());
        if cursor.peek() == Some('=') {
            cursor.bump();
            cursor.skip_while(|c| c.is_ascii_whitespace());
            let value = cursor.value();
            if let Some(challenge) = current.as_mut() {
                challenge.params.push((name.to_ascii_lowercase(), value));
            }
        } else {
            challenges.extend(current.take());
            current = Some(AuthParams {
                scheme: name.to_string(),
                params: Vec::new(),
            });
        }
    }

    challenges.extend(current);
    challenges
}

/// Picks the challenge to answer from a 401/407 response.
///
/// Digest is preferred over Basic; a Digest challenge that cannot be
/// answered (unknown algorithm, no nonce) is passed over. Returns `None`
/// when the status is not a challenge or no supported scheme is offered.
#[must_use]
pub fn select(status: u16, headers: &Headers) -> Option<(ChallengeOrigin, AuthParams)> {
    let origin = ChallengeOrigin::from_status(status)?;
    let offered: Vec<AuthParams> = headers
        .get_all(origin.authenticate_header())
        .flat_map(parse_authenticate)
        .collect();

    let digest = offered
        .iter()
        .find(|c| c.is_scheme("Digest") && DigestChallenge::from_params(c).is_ok());
    let basic = offered.iter().find(|c| c.is_scheme("Basic"));

    digest.or(basic).cloned().map(|params| (origin, params))
}

/// Maps an offered scheme token to [`AuthScheme`].
#[must_use]
pub fn auth_scheme_of(params: &AuthParams) -> Option<AuthScheme> {
    if params.is_scheme("Digest") {
        Some(AuthScheme::Digest)
    } else if params.is_scheme("Basic") {
        Some(AuthScheme::Basic)
    } else {
        None
    }
}

/// An authentication challenge presented to a handler.
#[derive(Debug, Clone)]
pub struct Challenge {
    space: ProtectionSpace,
    previous_failure_count: u32,
    proposed_credential: Option<Credential>,
    parameters: Vec<(String, String)>,
    failure_status: Option<u16>,
    failure_headers: Headers,
    origin: ChallengeOrigin,
}

impl Challenge {
    /// Challenge raised by a 401/407 response.
    pub(crate) fn from_response(
        space: ProtectionSpace,
        origin: ChallengeOrigin,
        params: &AuthParams,
        previous_failure_count: u32,
        proposed_credential: Option<Credential>,
        status: u16,
        headers: Headers,
    ) -> Self {
        Self {
            space,
            previous_failure_count,
            proposed_credential,
            parameters: params.params().to_vec(),
            failure_status: Some(status),
            failure_headers: headers,
            origin,
        }
    }

    /// Challenge raised by a failed TLS server-trust evaluation.
    pub(crate) fn server_trust(
        space: ProtectionSpace,
        reason: &str,
        previous_failure_count: u32,
    ) -> Self {
        Self {
            space,
            previous_failure_count,
            proposed_credential: None,
            parameters: vec![("reason".to_string(), reason.to_string())],
            failure_status: None,
            failure_headers: Headers::new(),
            origin: ChallengeOrigin::Server,
        }
    }

    /// The protection space being challenged.
    #[must_use]
    pub fn protection_space(&self) -> &ProtectionSpace {
        &self.space
    }

    /// How many earlier challenges for this space failed within the task.
    #[must_use]
    pub fn previous_failure_count(&self) -> u32 {
        self.previous_failure_count
    }

    /// The store's default credential for this space, if any.
    #[must_use]
    pub fn proposed_credential(&self) -> Option<&Credential> {
        self.proposed_credential.as_ref()
    }

    /// Server-supplied challenge parameter (`realm`, `nonce`, `qop`, ...).
    /// For server-trust challenges, `reason` describes the failure.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Status of the response that raised the challenge.
    #[must_use]
    pub fn failure_status(&self) -> Option<u16> {
        self.failure_status
    }

    /// Headers of the response that raised the challenge.
    #[must_use]
    pub fn failure_headers(&self) -> &Headers {
        &self.failure_headers
    }

    /// Whether a server or proxy issued the challenge.
    #[must_use]
    pub fn origin(&self) -> ChallengeOrigin {
        self.origin
    }

    /// Returns true for TLS server-trust challenges.
    #[must_use]
    pub fn is_server_trust(&self) -> bool {
        self.space.scheme().is_server_trust()
    }
}
