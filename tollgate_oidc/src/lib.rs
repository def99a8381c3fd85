//! OpenID Connect collaborators for `tollgate`
//!
//! [`OidcClient`] discovers a provider's endpoints, keeps the provider's
//! JSON Web Key Set in memory, verifies access tokens against it and
//! retrieves profiles from the userinfo endpoint. It implements all of the
//! traits a [`tollgate::Gate`] needs:
//!
//! ```no_run
//! use tollgate::Gate;
//! use tollgate_oidc::{OidcClient, OidcConfig};
//!
//! # fn main() -> Result<(), tollgate_oidc::OidcError> {
//! let config = OidcConfig::new("https://id.example.com")
//!     .with_client("my-api")
//!     .with_scope("read");
//!
//! let gate = Gate::new(OidcClient::new(config)?);
//! # let _ = gate;
//! # Ok(())
//! # }
//! ```
//!
//! # Feature flags
//!
//! This crate does not enable TLS support in `reqwest` by default. If the
//! only reason you use `reqwest` is transitively through this crate, enable
//! the `default-tls` or `rustls-tls` feature to reach HTTPS providers.

#![cfg_attr(docsrs, feature(doc_cfg))]
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

mod claims;
mod client;
mod config;
pub mod discovery;
mod error;
mod keys;

pub use client::OidcClient;
pub use config::OidcConfig;
pub use discovery::ProviderMetadata;
pub use error::OidcError;
