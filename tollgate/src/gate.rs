use std::{fmt, sync::Arc};

use http::{Extensions, Request};

use crate::{
    locate, AccessToken, AccessTokenClaims, AccessTokenRef, AuthError, AuthOptions, BodyFields,
    IdentityProvider, Presentation, SingleFlight, TokenVerifier, TrustProvider, UserInfo,
};

/// The outcome of successfully authenticating a request
#[derive(Clone, Debug, PartialEq)]
#[must_use]
pub struct Authentication {
    access_token: AccessToken,
    claims: AccessTokenClaims,
    user_info: Option<UserInfo>,
}

impl Authentication {
    /// The token that was presented
    #[inline]
    pub fn access_token(&self) -> &AccessTokenRef {
        &self.access_token
    }

    /// The claims carried by the verified token
    #[inline]
    pub fn claims(&self) -> &AccessTokenClaims {
        &self.claims
    }

    /// The holder's profile, if it was retrieved
    #[inline]
    pub fn user_info(&self) -> Option<&UserInfo> {
        self.user_info.as_ref()
    }

    /// Attaches the token, its claims and any profile to a request's extensions
    pub fn apply(self, extensions: &mut Extensions) {
        extensions.insert(self.access_token);
        extensions.insert(self.claims);
        if let Some(user_info) = self.user_info {
            extensions.insert(user_info);
        }
    }
}

/// Authenticates requests by orchestrating trust initialization, token
/// verification and profile retrieval
///
/// Trust material is initialized lazily, on the first request that carries
/// a token. Concurrent first requests share a single initialization and its
/// outcome. A failed initialization is not remembered, so the next request
/// to arrive after it tries again.
///
/// Cloning a `Gate` is cheap, and clones share the initialization state.
#[derive(Clone)]
pub struct Gate {
    inner: Arc<Inner>,
}

struct Inner {
    trust: Arc<dyn TrustProvider>,
    verifier: Arc<dyn TokenVerifier>,
    identity: Arc<dyn IdentityProvider>,
    trust_ready: SingleFlight<(), AuthError>,
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Gate")
            .field("trust_ready", &self.inner.trust_ready.get().is_some())
            .finish_non_exhaustive()
    }
}

impl Gate {
    /// Constructs a gate around a client that provides trust material,
    /// verification and profiles
    pub fn new<C>(client: C) -> Self
    where
        C: TrustProvider + TokenVerifier + IdentityProvider + 'static,
    {
        let client = Arc::new(client);
        Self::from_parts(client.clone(), client.clone(), client)
    }

    /// Constructs a gate from separate collaborators
    pub fn from_parts(
        trust: Arc<dyn TrustProvider>,
        verifier: Arc<dyn TokenVerifier>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                trust,
                verifier,
                identity,
                trust_ready: SingleFlight::new(),
            }),
        }
    }

    /// Authenticates an already located token
    ///
    /// Returns `Ok(None)` if no token was presented and the options allow
    /// that. No collaborator is consulted in that case.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::token_required`] if no token was presented and one
    /// is required. Errors from the collaborators are returned unchanged.
    #[tracing::instrument(skip_all, fields(token = ?candidate.as_deref()))]
    pub async fn authenticate(
        &self,
        candidate: Option<AccessToken>,
        options: &AuthOptions,
    ) -> Result<Option<Authentication>, AuthError> {
        let access_token = match candidate {
            Some(token) => token,
            None if options.allow_no_token => {
                tracing::trace!("no access token presented, continuing unauthenticated");
                return Ok(None);
            }
            None => {
                let err = AuthError::token_required();
                tracing::debug!(error = %err, "rejecting request");
                return Err(err);
            }
        };

        self.run(access_token, options).await.map(Some).map_err(|err| {
            tracing::debug!(error = %err, status = %err.status(), "rejecting request");
            err
        })
    }

    async fn run(
        &self,
        access_token: AccessToken,
        options: &AuthOptions,
    ) -> Result<Authentication, AuthError> {
        self.ensure_trust().await?;

        let claims = self
            .inner
            .verifier
            .verify(&access_token, &options.verify)
            .await?;
        tracing::trace!("access token verified");

        let user_info = if options.load_user_info {
            let user_info = self.inner.identity.user_info(&access_token).await?;
            tracing::trace!("user info retrieved");
            Some(user_info)
        } else {
            None
        };

        Ok(Authentication {
            access_token,
            claims,
            user_info,
        })
    }

    async fn ensure_trust(&self) -> Result<(), AuthError> {
        self.inner
            .trust_ready
            .get_or_try_init(|| {
                let trust = self.inner.trust.clone();
                async move {
                    tracing::debug!("initializing trust material");
                    trust.initialize().await
                }
            })
            .await?;

        Ok(())
    }

    /// Locates the token presented with a request and authenticates it
    ///
    /// On success, the request's extensions gain the [`AccessToken`], its
    /// [`AccessTokenClaims`] and, if retrieved, the [`UserInfo`]. On failure
    /// the request is left untouched.
    ///
    /// # Errors
    ///
    /// Returns the locator's `invalid_request` error for a malformed or
    /// ambiguous presentation, otherwise as [`authenticate`][Self::authenticate].
    pub async fn authenticate_request<B>(
        &self,
        request: &mut Request<B>,
        body: Option<&BodyFields>,
        options: &AuthOptions,
    ) -> Result<(), AuthError> {
        let candidate = locate(&Presentation::from_request(request).with_body(body))
            .map_err(|err| {
                tracing::debug!(error = %err, "rejecting request");
                err
            })?;

        if let Some(authentication) = self.authenticate(candidate, options).await? {
            authentication.apply(request.extensions_mut());
        }

        Ok(())
    }
}
