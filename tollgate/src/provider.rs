//! The collaborators consulted by the gate

use std::sync::Arc;

use async_trait::async_trait;

use crate::{AccessTokenClaims, AccessTokenRef, AuthError, UserInfo, VerifyOptions};

/// Makes trust material (signing keys) available to the verifier
#[async_trait]
pub trait TrustProvider: Send + Sync {
    /// Loads trust material
    ///
    /// Must be idempotent. The gate calls this at most once per successful
    /// initialization, but a provider shared between gates may see more calls.
    async fn initialize(&self) -> Result<(), AuthError>;
}

/// Checks an access token and yields the claims it carries
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verifies the token under the given options
    async fn verify(
        &self,
        token: &AccessTokenRef,
        options: &VerifyOptions,
    ) -> Result<AccessTokenClaims, AuthError>;
}

/// Retrieves the profile of a token's holder
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchanges the token for the holder's profile attributes
    async fn user_info(&self, token: &AccessTokenRef) -> Result<UserInfo, AuthError>;
}

#[async_trait]
impl<T: TrustProvider + ?Sized> TrustProvider for Arc<T> {
    #[inline]
    async fn initialize(&self) -> Result<(), AuthError> {
        T::initialize(self).await
    }
}

#[async_trait]
impl<T: TokenVerifier + ?Sized> TokenVerifier for Arc<T> {
    #[inline]
    async fn verify(
        &self,
        token: &AccessTokenRef,
        options: &VerifyOptions,
    ) -> Result<AccessTokenClaims, AuthError> {
        T::verify(self, token, options).await
    }
}

#[async_trait]
impl<T: IdentityProvider + ?Sized> IdentityProvider for Arc<T> {
    #[inline]
    async fn user_info(&self, token: &AccessTokenRef) -> Result<UserInfo, AuthError> {
        T::user_info(self, token).await
    }
}
