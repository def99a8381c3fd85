use std::{str::FromStr, sync::Arc, time::Duration};

use aliri::{jwt, Jwks, JwtRef};
use aliri_oauth2::{Scope, ScopePolicy};
use aliri_traits::Policy;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tollgate::{
    AccessTokenClaims, AccessTokenRef, AuthError, IdentityProvider, SingleFlight, TokenVerifier,
    TrustProvider, UserInfo, VerifyOptions,
};

use crate::{
    claims::TokenClaims,
    discovery,
    keys::{KeyCache, Refreshed},
    OidcConfig, OidcError,
};

#[derive(Clone, Debug)]
struct Endpoints {
    issuer: String,
    jwks_uri: Option<String>,
    userinfo_endpoint: Option<String>,
    /// Discovery was skipped, so it may still supply a userinfo endpoint
    partial: bool,
}

#[derive(Debug)]
struct Inner {
    config: OidcConfig,
    http: Client,
    endpoints: SingleFlight<Endpoints, OidcError>,
    discovered_userinfo: SingleFlight<Option<String>, OidcError>,
    keys: KeyCache,
    keys_loaded: SingleFlight<(), OidcError>,
}

/// A client for an OpenID Connect provider
///
/// Provides trust material from the provider's key set, verifies access
/// tokens signed by the provider and retrieves the holder's profile from
/// the provider's userinfo endpoint.
///
/// Cloning an `OidcClient` is cheap, and clones share the key set.
#[derive(Clone, Debug)]
#[must_use]
pub struct OidcClient {
    inner: Arc<Inner>,
}

impl OidcClient {
    /// Constructs a client that discovers endpoints and fetches keys on
    /// first use
    ///
    /// # Errors
    ///
    /// Returns an error if no signing algorithms are approved or the HTTP
    /// client cannot be constructed.
    pub fn new(config: OidcConfig) -> Result<Self, OidcError> {
        Self::with_http_client(config, default_http_client()?)
    }

    /// Constructs a client using a preconfigured HTTP client
    ///
    /// Use this to set timeouts, proxies or TLS settings.
    ///
    /// # Errors
    ///
    /// Returns an error if no signing algorithms are approved.
    pub fn with_http_client(config: OidcConfig, http: Client) -> Result<Self, OidcError> {
        let endpoints = config.jwks_uri.as_ref().map(|jwks_uri| Endpoints {
            issuer: config.issuer.clone(),
            jwks_uri: Some(jwks_uri.clone()),
            userinfo_endpoint: config.userinfo_endpoint.clone(),
            partial: true,
        });

        Self::build(config, http, endpoints, None)
    }

    /// Constructs a client that verifies tokens against a fixed key set
    ///
    /// The key set is never fetched or refreshed, and no discovery takes
    /// place. Profiles can only be retrieved if a userinfo endpoint is
    /// configured.
    ///
    /// # Errors
    ///
    /// Returns an error if no signing algorithms are approved or the HTTP
    /// client cannot be constructed.
    pub fn with_jwks(config: OidcConfig, jwks: Jwks) -> Result<Self, OidcError> {
        let endpoints = Endpoints {
            issuer: config.issuer.clone(),
            jwks_uri: None,
            userinfo_endpoint: config.userinfo_endpoint.clone(),
            partial: false,
        };

        Self::build(
            config,
            default_http_client()?,
            Some(endpoints),
            Some(jwks),
        )
    }

    fn build(
        config: OidcConfig,
        http: Client,
        endpoints: Option<Endpoints>,
        jwks: Option<Jwks>,
    ) -> Result<Self, OidcError> {
        // An empty list would approve every algorithm
        if config.algorithms.is_empty() {
            return Err(OidcError::NoApprovedAlgorithms);
        }

        let keys_loaded = SingleFlight::new_with(jwks.as_ref().map(|_| ()));
        let keys = jwks.map_or_else(KeyCache::empty, KeyCache::new);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                http,
                endpoints: SingleFlight::new_with(endpoints),
                discovered_userinfo: SingleFlight::new(),
                keys,
                keys_loaded,
            }),
        })
    }

    /// The configuration of this client
    #[inline]
    pub fn config(&self) -> &OidcConfig {
        &self.inner.config
    }

    async fn endpoints(&self) -> Result<&Endpoints, OidcError> {
        self.inner
            .endpoints
            .get_or_try_init(|| {
                let http = self.inner.http.clone();
                let issuer = self.inner.config.issuer.clone();
                let userinfo_endpoint = self.inner.config.userinfo_endpoint.clone();

                async move {
                    let metadata = discovery::discover(&http, &issuer).await?;

                    Ok(Endpoints {
                        issuer: metadata.issuer,
                        jwks_uri: Some(metadata.jwks_uri),
                        userinfo_endpoint: userinfo_endpoint.or(metadata.userinfo_endpoint),
                        partial: false,
                    })
                }
            })
            .await
    }

    async fn userinfo_endpoint(&self) -> Result<&str, OidcError> {
        let endpoints = self.endpoints().await?;

        let url = match &endpoints.userinfo_endpoint {
            Some(url) => Some(url),
            None if endpoints.partial => self
                .inner
                .discovered_userinfo
                .get_or_try_init(|| {
                    let http = self.inner.http.clone();
                    let issuer = self.inner.config.issuer.clone();

                    async move {
                        tracing::debug!("discovering userinfo endpoint");
                        Ok(discovery::discover(&http, &issuer).await?.userinfo_endpoint)
                    }
                })
                .await?
                .as_ref(),
            None => None,
        };

        url.map(String::as_str)
            .ok_or(OidcError::MissingUserInfoEndpoint)
    }

    /// Loads the key set, then keeps it fresh if a refresh interval is
    /// configured
    ///
    /// Concurrent callers share a single load and its outcome. Once the key
    /// set has loaded this does nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if discovery or the initial key set fetch fails. A
    /// later call tries again.
    #[tracing::instrument(skip(self), fields(issuer = %self.inner.config.issuer))]
    pub async fn load_keys(&self) -> Result<(), OidcError> {
        self.inner
            .keys_loaded
            .get_or_try_init(|| {
                let this = self.clone();

                async move {
                    this.refresh().await?;

                    if let Some(interval) = this.inner.config.refresh_interval() {
                        this.spawn_refresh(interval);
                    }

                    Ok(())
                }
            })
            .await?;

        Ok(())
    }

    /// Refreshes the key set from the provider
    ///
    /// No retries are attempted. If the refresh fails, the current key set
    /// is kept. A client with a fixed key set is never refreshed.
    ///
    /// # Errors
    ///
    /// Returns an error if discovery or the key set fetch fails.
    pub async fn refresh(&self) -> Result<(), OidcError> {
        let endpoints = self.endpoints().await?;

        if let Some(jwks_uri) = &endpoints.jwks_uri {
            if self.inner.keys.refresh(&self.inner.http, jwks_uri).await? == Refreshed::Updated {
                tracing::trace!(jwks.url = %jwks_uri, "key set replaced");
            }
        }

        Ok(())
    }

    /// Spawns a task that refreshes the key set at the given interval
    ///
    /// The task stops once every clone of this client has been dropped.
    /// Must be called from within a tokio runtime.
    pub fn spawn_refresh(&self, interval: Duration) {
        let client = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.tick().await;

            loop {
                timer.tick().await;

                let Some(inner) = client.upgrade() else {
                    tracing::debug!("client dropped; stopping key set refresh");
                    break;
                };

                // Failures are logged by `refresh`; try again next tick
                let _ = OidcClient { inner }.refresh().await;
            }
        });
    }

    fn validator(&self, issuer: &str, options: &VerifyOptions) -> jwt::CoreValidator {
        let config = &self.inner.config;
        let issuer = options.issuer.as_deref().unwrap_or(issuer);
        let clients = if options.clients.is_empty() {
            &config.clients
        } else {
            &options.clients
        };

        jwt::CoreValidator::default()
            .extend_approved_algorithms(config.algorithms.iter().copied())
            .with_leeway_secs(config.leeway_secs)
            .require_issuer(jwt::Issuer::new(issuer.to_owned()))
            .extend_allowed_audiences(clients.iter().cloned().map(jwt::Audience::new))
    }

    fn policy(&self, options: &VerifyOptions) -> Result<ScopePolicy, OidcError> {
        match options.scope.as_ref().or(self.inner.config.scope.as_ref()) {
            Some(required) => Scope::from_str(required)
                .map(ScopePolicy::allow_one)
                .map_err(|_| OidcError::InvalidScope(required.clone())),
            None => Ok(ScopePolicy::allow_any()),
        }
    }

    async fn fetch_user_info(&self, token: &AccessTokenRef) -> Result<UserInfo, OidcError> {
        let url = self.userinfo_endpoint().await?;

        let response = self
            .inner
            .http
            .get(url)
            .bearer_auth(token.as_str())
            .send()
            .await
            .map_err(|source| OidcError::Unreachable {
                url: url.to_owned(),
                source: Arc::new(source),
            })?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(OidcError::TokenRejected);
            }
            status if !status.is_success() => {
                tracing::warn!(
                    http.status_code = status.as_u16(),
                    "userinfo request failed; unexpected response status"
                );
                return Err(OidcError::UnexpectedStatus {
                    url: url.to_owned(),
                    status,
                });
            }
            _ => {}
        }

        response
            .json::<UserInfo>()
            .await
            .map_err(|source| OidcError::MalformedResponse {
                url: url.to_owned(),
                source: Arc::new(source),
            })
    }
}

/// Tokens without a `scope` claim are held to the policy as if granted none
fn check_scope(policy: &ScopePolicy, claims: &TokenClaims) -> Result<(), OidcError> {
    let outcome = match claims.scope() {
        Some(granted) => policy.evaluate(granted),
        None => policy.evaluate(&Scope::empty()),
    };

    outcome.map_err(|_| OidcError::PolicyDenial)
}

fn default_http_client() -> Result<Client, OidcError> {
    Client::builder()
        .user_agent(concat!("tollgate_oidc/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|err| OidcError::HttpClient(Arc::new(err)))
}

#[async_trait]
impl TrustProvider for OidcClient {
    async fn initialize(&self) -> Result<(), AuthError> {
        Ok(self.load_keys().await?)
    }
}

#[async_trait]
impl TokenVerifier for OidcClient {
    #[tracing::instrument(skip_all, fields(token = ?token))]
    async fn verify(
        &self,
        token: &AccessTokenRef,
        options: &VerifyOptions,
    ) -> Result<AccessTokenClaims, AuthError> {
        let issuer = &self.endpoints().await?.issuer;
        let validator = self.validator(issuer, options);
        let policy = self.policy(options)?;

        let claims = self
            .inner
            .keys
            .verify::<TokenClaims>(JwtRef::from_str(token.as_str()), &validator)
            .and_then(|claims| check_scope(&policy, &claims).map(|()| claims))
            .map_err(|err| {
                tracing::debug!(error = %err, "access token rejected");
                err
            })?;

        Ok(claims.into_access_token_claims()?)
    }
}

#[async_trait]
impl IdentityProvider for OidcClient {
    #[tracing::instrument(skip_all, fields(token = ?token))]
    async fn user_info(&self, token: &AccessTokenRef) -> Result<UserInfo, AuthError> {
        Ok(self.fetch_user_info(token).await?)
    }
}
