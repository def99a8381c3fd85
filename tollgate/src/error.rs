//! The classified error shared by every stage of the gate

use std::borrow::Cow;

use http::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// Error code for a malformed or ambiguous credential presentation
pub const INVALID_REQUEST: &str = "invalid_request";

/// Error code for a token that was presented but rejected
pub const INVALID_TOKEN: &str = "invalid_token";

/// Error code for a token that does not grant the required access
pub const INSUFFICIENT_SCOPE: &str = "insufficient_scope";

/// Error code for a failure inside the gate's collaborators
pub const SERVER_ERROR: &str = "server_error";

/// A failure classified with an OAuth2 error code, a human readable
/// description and the HTTP status that should be reported
///
/// Every failure in the gate, whether raised while locating the token or
/// by one of the collaborators, is reported as exactly one `AuthError`.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize)]
#[error("{error}: {error_description}")]
#[must_use]
pub struct AuthError {
    error: Cow<'static, str>,
    error_description: Cow<'static, str>,
    #[serde(skip)]
    status: StatusCode,
    #[serde(skip)]
    realm: Option<Cow<'static, str>>,
}

impl AuthError {
    /// Constructs a new classified error
    pub fn new(
        status: StatusCode,
        error: impl Into<Cow<'static, str>>,
        description: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            error: error.into(),
            error_description: description.into(),
            status,
            realm: None,
        }
    }

    /// `400 Bad Request` with the `invalid_request` code
    pub fn invalid_request(description: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, INVALID_REQUEST, description)
    }

    /// `401 Unauthorized` reported when a request carries no access token
    /// and one is required
    pub fn token_required() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            INVALID_REQUEST,
            "An access token is required",
        )
        .with_realm("user")
    }

    /// `401 Unauthorized` with the `invalid_token` code
    pub fn invalid_token(description: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, INVALID_TOKEN, description)
    }

    /// `403 Forbidden` with the `insufficient_scope` code
    pub fn insufficient_scope(description: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::FORBIDDEN, INSUFFICIENT_SCOPE, description)
    }

    /// `500 Internal Server Error` with the `server_error` code
    pub fn server_error(description: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, SERVER_ERROR, description)
    }

    /// `502 Bad Gateway` with the `server_error` code, for an upstream
    /// authority that could not be reached or answered unexpectedly
    pub fn upstream(description: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, SERVER_ERROR, description)
    }

    /// Names the protection space reported in the authentication challenge
    pub fn with_realm(self, realm: impl Into<Cow<'static, str>>) -> Self {
        Self {
            realm: Some(realm.into()),
            ..self
        }
    }

    /// The machine readable error code
    #[must_use]
    pub fn error(&self) -> &str {
        &self.error
    }

    /// The human readable description
    #[must_use]
    pub fn description(&self) -> &str {
        &self.error_description
    }

    /// The HTTP status to report
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The realm, if any
    #[must_use]
    pub fn realm(&self) -> Option<&str> {
        self.realm.as_deref()
    }
}
