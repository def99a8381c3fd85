//! Tower middleware that authenticates bearer tokens with a [`tollgate::Gate`]
//!
//! See the `examples` folder of this crate for a working example using an
//! `axum` web server.
//!
//! ```no_run
//! use tollgate::{Gate, AuthOptions, VerifyOptions};
//! use tollgate_oidc::{OidcClient, OidcConfig};
//! use tollgate_tower::AuthLayer;
//! use tower::ServiceBuilder;
//!
//! # fn main() -> Result<(), tollgate_oidc::OidcError> {
//! let config = OidcConfig::new("https://id.example.com").with_client("my-api");
//! let client = OidcClient::new(config)?;
//!
//! let auth = AuthLayer::new(Gate::new(client))
//!     .with_options(
//!         AuthOptions::new()
//!             .load_user_info(true)
//!             .with_verify(VerifyOptions::new().with_scope("read")),
//!     );
//!
//! type Body = http_body_util::Full<bytes::Bytes>;
//!
//! let svc = ServiceBuilder::new()
//!     .layer(auth)
//!     .service_fn(|_req: http::Request<Body>| async {
//!         Ok::<_, std::convert::Infallible>(http::Response::new(Body::default()))
//!     });
//! # let _ = svc;
//! # Ok(())
//! # }
//! ```
//!
//! Tokens are looked for in the `Authorization` header, the `access_token`
//! query parameter and, for `application/x-www-form-urlencoded` requests, the
//! body. Form and JSON bodies are buffered (up to a configurable limit) so
//! that they can be inspected, then handed on to the inner service intact.

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
mod service;

pub use service::{AuthLayer, AuthService, DEFAULT_BODY_LIMIT};

/// The error type produced by an [`AuthService`]
///
/// When the layer does not respond to failures itself, this wraps the
/// [`tollgate::AuthError`] and can be recovered with
/// [`downcast`](std::error::Error#method.downcast).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
