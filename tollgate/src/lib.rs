//! Bearer token authentication for HTTP services
//!
//! A request passes through three stages:
//!
//! 1. [`locate`] finds the single bearer token presented in the
//!    `Authorization` header, the `access_token` query parameter or a
//!    form-encoded body, rejecting ambiguous or malformed presentations.
//! 2. A [`Gate`] makes sure trust material is loaded, verifies the token and
//!    optionally retrieves the holder's profile, then attaches the result to
//!    the request's extensions.
//! 3. A [`Responder`] either renders any failure as a JSON error response or
//!    hands it back to the host.
//!
//! Every failure along the way is reported as an [`AuthError`] carrying an
//! OAuth2 error code, a description and the HTTP status to use.
//!
//! The gate does not verify tokens itself. It delegates to a
//! [`TrustProvider`], a [`TokenVerifier`] and an [`IdentityProvider`]. The
//! `tollgate_oidc` crate provides all three for an OpenID Connect provider,
//! and `tollgate_tower` wires the gate into a `tower` stack.

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod body;
mod error;
mod extensions;
mod flight;
mod gate;
mod locate;
mod options;
mod provider;
mod respond;
mod token;

pub use body::BodyFields;
pub use error::{AuthError, INSUFFICIENT_SCOPE, INVALID_REQUEST, INVALID_TOKEN, SERVER_ERROR};
pub use extensions::AuthenticatedRequest;
pub use flight::SingleFlight;
pub use gate::{Authentication, Gate};
pub use locate::{locate, Presentation, ACCESS_TOKEN_PARAM, FORM_URLENCODED};
pub use options::{AuthOptions, VerifyOptions};
pub use provider::{IdentityProvider, TokenVerifier, TrustProvider};
pub use respond::{error_response, Responder};
pub use token::{AccessToken, AccessTokenClaims, AccessTokenRef, UserInfo};
