use http::{request::Parts, Extensions, Request};

use crate::{AccessToken, AccessTokenClaims, AccessTokenRef, UserInfo};

/// Access to the identity attached to an authenticated request
pub trait AuthenticatedRequest {
    /// The token presented with the request
    fn access_token(&self) -> Option<&AccessTokenRef>;

    /// The verified claims of the presented token
    fn claims(&self) -> Option<&AccessTokenClaims>;

    /// The token holder's profile, if it was retrieved
    fn user_info(&self) -> Option<&UserInfo>;
}

impl AuthenticatedRequest for Extensions {
    #[inline]
    fn access_token(&self) -> Option<&AccessTokenRef> {
        self.get::<AccessToken>().map(|t| &**t)
    }

    #[inline]
    fn claims(&self) -> Option<&AccessTokenClaims> {
        self.get()
    }

    #[inline]
    fn user_info(&self) -> Option<&UserInfo> {
        self.get()
    }
}

impl<B> AuthenticatedRequest for Request<B> {
    #[inline]
    fn access_token(&self) -> Option<&AccessTokenRef> {
        self.extensions().access_token()
    }

    #[inline]
    fn claims(&self) -> Option<&AccessTokenClaims> {
        self.extensions().claims()
    }

    #[inline]
    fn user_info(&self) -> Option<&UserInfo> {
        self.extensions().user_info()
    }
}

impl AuthenticatedRequest for Parts {
    #[inline]
    fn access_token(&self) -> Option<&AccessTokenRef> {
        self.extensions.access_token()
    }

    #[inline]
    fn claims(&self) -> Option<&AccessTokenClaims> {
        self.extensions.claims()
    }

    #[inline]
    fn user_info(&self) -> Option<&UserInfo> {
        self.extensions.user_info()
    }
}
