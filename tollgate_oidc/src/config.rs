use std::time::Duration;

use aliri::jwa;
use serde::Deserialize;

/// Settings for an [`OidcClient`][crate::OidcClient]
///
/// Only the issuer is required. Endpoints left unset are taken from the
/// provider's discovery document.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[must_use]
pub struct OidcConfig {
    /// Base URL of the provider, which is also the expected `iss` claim
    pub issuer: String,
    /// Location of the provider's key set
    ///
    /// When set, the key set is fetched without discovery. Discovery still
    /// runs once on the first profile request if no `userinfo_endpoint` is
    /// configured.
    #[serde(default)]
    pub jwks_uri: Option<String>,
    /// Location of the provider's userinfo endpoint
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    /// Client identifiers accepted as the token audience
    #[serde(default)]
    pub clients: Vec<String>,
    /// Space-delimited scopes every token must grant
    #[serde(default)]
    pub scope: Option<String>,
    /// Signing algorithms a token may use
    ///
    /// Must not be empty; a client refuses to build without at least one.
    #[serde(default = "default_algorithms")]
    pub algorithms: Vec<jwa::Algorithm>,
    /// Clock skew tolerated when checking `exp` and `nbf`
    #[serde(default)]
    pub leeway_secs: u64,
    /// How often to re-fetch the key set in the background, once loaded
    #[serde(default)]
    pub refresh_interval_secs: Option<u64>,
}

fn default_algorithms() -> Vec<jwa::Algorithm> {
    #[cfg(feature = "rsa")]
    {
        vec![jwa::Algorithm::RS256]
    }
    #[cfg(not(feature = "rsa"))]
    {
        Vec::new()
    }
}

impl OidcConfig {
    /// Configuration for the given issuer, with everything else defaulted
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            jwks_uri: None,
            userinfo_endpoint: None,
            clients: Vec::new(),
            scope: None,
            algorithms: default_algorithms(),
            leeway_secs: 0,
            refresh_interval_secs: None,
        }
    }

    /// Uses a known key set location instead of discovering it
    pub fn with_jwks_uri(self, jwks_uri: impl Into<String>) -> Self {
        Self {
            jwks_uri: Some(jwks_uri.into()),
            ..self
        }
    }

    /// Uses a known userinfo endpoint instead of discovering it
    pub fn with_userinfo_endpoint(self, userinfo_endpoint: impl Into<String>) -> Self {
        Self {
            userinfo_endpoint: Some(userinfo_endpoint.into()),
            ..self
        }
    }

    /// Accepts tokens issued to this client
    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.clients.push(client.into());
        self
    }

    /// Requires every token to grant these space-delimited scopes
    pub fn with_scope(self, scope: impl Into<String>) -> Self {
        Self {
            scope: Some(scope.into()),
            ..self
        }
    }

    /// Replaces the approved signing algorithms
    pub fn with_algorithms<I: IntoIterator<Item = jwa::Algorithm>>(self, algorithms: I) -> Self {
        Self {
            algorithms: algorithms.into_iter().collect(),
            ..self
        }
    }

    /// Tolerates clock skew when checking token lifetimes
    pub fn with_leeway_secs(self, leeway_secs: u64) -> Self {
        Self {
            leeway_secs,
            ..self
        }
    }

    /// Refreshes the key set in the background at this interval
    pub fn with_refresh_interval(self, interval: Duration) -> Self {
        Self {
            refresh_interval_secs: Some(interval.as_secs()),
            ..self
        }
    }

    /// The background refresh interval, if any
    #[must_use]
    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval_secs
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs)
    }
}
