//! OpenID Connect provider discovery

use std::sync::Arc;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::OidcError;

const WELL_KNOWN_PATH: &str = "/.well-known/openid-configuration";

/// The subset of a provider's discovery document used for authentication
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProviderMetadata {
    /// The issuer identifier of the provider
    pub issuer: String,
    /// Location of the provider's key set
    pub jwks_uri: String,
    /// Location of the provider's userinfo endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
}

/// The location of the discovery document for an issuer
#[must_use]
pub fn discovery_url(issuer: &str) -> String {
    format!("{}{WELL_KNOWN_PATH}", issuer.trim_end_matches('/'))
}

/// Fetches the discovery document of an issuer
///
/// # Errors
///
/// Returns an error if the provider cannot be reached, answers with an error
/// status or returns a document that cannot be decoded.
#[tracing::instrument(skip(client))]
pub async fn discover(client: &Client, issuer: &str) -> Result<ProviderMetadata, OidcError> {
    let url = discovery_url(issuer);

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|source| OidcError::Unreachable {
            url: url.clone(),
            source: Arc::new(source),
        })?;

    if !response.status().is_success() {
        tracing::warn!(
            http.status_code = response.status().as_u16(),
            "provider discovery failed; unexpected response status"
        );
        return Err(OidcError::UnexpectedStatus {
            url,
            status: response.status(),
        });
    }

    let metadata = response
        .json::<ProviderMetadata>()
        .await
        .map_err(|source| OidcError::MalformedResponse {
            url,
            source: Arc::new(source),
        })?;

    tracing::debug!(jwks.url = %metadata.jwks_uri, "provider discovered");
    Ok(metadata)
}
