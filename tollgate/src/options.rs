//! Per-call policy for the gate

use serde::Deserialize;

/// Options passed through to the [`TokenVerifier`][crate::TokenVerifier]
///
/// Anything left unset falls back to the verifier's own configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
#[must_use]
pub struct VerifyOptions {
    /// The issuer a token must have been minted by
    pub issuer: Option<String>,
    /// Client identifiers, at least one of which must appear in the token's audience
    pub clients: Vec<String>,
    /// Space-delimited scopes that must all be granted by the token
    pub scope: Option<String>,
}

impl VerifyOptions {
    /// Options deferring entirely to the verifier's configuration
    #[inline]
    pub const fn new() -> Self {
        Self {
            issuer: None,
            clients: Vec::new(),
            scope: None,
        }
    }

    /// Requires a specific issuer
    pub fn with_issuer(self, issuer: impl Into<String>) -> Self {
        Self {
            issuer: Some(issuer.into()),
            ..self
        }
    }

    /// Adds a client to the audience allow-list
    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.clients.push(client.into());
        self
    }

    /// Requires the given space-delimited scopes
    pub fn with_scope(self, scope: impl Into<String>) -> Self {
        Self {
            scope: Some(scope.into()),
            ..self
        }
    }
}

/// How the gate treats a request
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
#[must_use]
pub struct AuthOptions {
    /// Lets a request carrying no token through, unauthenticated
    pub allow_no_token: bool,
    /// Retrieves the token holder's profile after verification
    pub load_user_info: bool,
    /// Options handed to the verifier
    #[serde(flatten)]
    pub verify: VerifyOptions,
}

impl AuthOptions {
    /// Requires a token and skips profile retrieval
    #[inline]
    pub const fn new() -> Self {
        Self {
            allow_no_token: false,
            load_user_info: false,
            verify: VerifyOptions::new(),
        }
    }

    /// Sets whether a request without a token is let through
    pub fn allow_no_token(self, allow: bool) -> Self {
        Self {
            allow_no_token: allow,
            ..self
        }
    }

    /// Sets whether the token holder's profile is retrieved
    pub fn load_user_info(self, load: bool) -> Self {
        Self {
            load_user_info: load,
            ..self
        }
    }

    /// Replaces the options handed to the verifier
    pub fn with_verify(self, verify: VerifyOptions) -> Self {
        Self { verify, ..self }
    }
}
