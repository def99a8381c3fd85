//! A JSON Web Key Set that can be swapped out while in use

use std::sync::Arc;

use aliri::{
    jwt::{self, CoreHeaders, HasAlgorithm},
    Jwks, JwtRef,
};
use arc_swap::ArcSwap;
use reqwest::{
    header::{self, HeaderValue},
    Client, StatusCode,
};
use serde::Deserialize;

use crate::OidcError;

/// The key set along with the validators needed to request it conditionally
#[derive(Debug, Default)]
pub(crate) struct KeySnapshot {
    jwks: Jwks,
    etag: Option<HeaderValue>,
    last_modified: Option<HeaderValue>,
}

/// Whether a refresh replaced the key set
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Refreshed {
    Updated,
    NotModified,
}

#[derive(Debug)]
pub(crate) struct KeyCache {
    current: ArcSwap<KeySnapshot>,
}

impl KeyCache {
    pub(crate) fn new(jwks: Jwks) -> Self {
        Self {
            current: ArcSwap::from_pointee(KeySnapshot {
                jwks,
                ..KeySnapshot::default()
            }),
        }
    }

    pub(crate) fn empty() -> Self {
        Self::new(Jwks::default())
    }

    /// Checks the token's signature with the key it names, then its
    /// registered claims
    pub(crate) fn verify<C>(
        &self,
        token: &JwtRef,
        validator: &jwt::CoreValidator,
    ) -> Result<C, OidcError>
    where
        C: for<'de> Deserialize<'de> + jwt::CoreClaims,
    {
        let decomposed: jwt::Decomposed = token.decompose()?;
        let (kid, alg) = (decomposed.kid(), decomposed.alg());

        let snapshot = self.current.load();
        let Some(key) = snapshot.jwks.get_key_by_opt(kid, alg) else {
            tracing::debug!(?kid, %alg, "no key in the key set matches the token");
            return Err(OidcError::UnknownKeyId);
        };

        let validated: jwt::Validated<C> = decomposed.verify(key, validator)?;
        let (_, claims) = validated.extract();
        Ok(claims)
    }

    /// Fetches the key set from `url`
    ///
    /// Sends `If-None-Match` or `If-Modified-Since` when the previous answer
    /// carried a validator. No retries are attempted, and on any failure the
    /// current key set is kept.
    #[tracing::instrument(skip(self, client))]
    pub(crate) async fn refresh(&self, client: &Client, url: &str) -> Result<Refreshed, OidcError> {
        tracing::debug!("refreshing JWKS");
        let mut request = client.get(url);

        {
            let current = self.current.load();
            if let Some(etag) = &current.etag {
                request = request.header(header::IF_NONE_MATCH, etag);
            } else if let Some(last_modified) = &current.last_modified {
                request = request.header(header::IF_MODIFIED_SINCE, last_modified);
            }
        }

        let response = request.send().await.map_err(|source| {
            let error: &dyn std::error::Error = &source;
            tracing::warn!(error, "JWKS refresh failed; provider unreachable");
            OidcError::Unreachable {
                url: url.to_owned(),
                source: Arc::new(source),
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            tracing::debug!("JWKS not modified");
            return Ok(Refreshed::NotModified);
        } else if !status.is_success() {
            tracing::warn!(
                http.status_code = status.as_u16(),
                "JWKS refresh failed; unexpected response status",
            );
            return Err(OidcError::UnexpectedStatus {
                url: url.to_owned(),
                status,
            });
        }

        let etag = response.headers().get(header::ETAG).cloned();
        let last_modified = response.headers().get(header::LAST_MODIFIED).cloned();

        let jwks = response.json::<Jwks>().await.map_err(|source| {
            let error: &dyn std::error::Error = &source;
            tracing::warn!(error, "JWKS refresh failed; malformed key set");
            OidcError::MalformedResponse {
                url: url.to_owned(),
                source: Arc::new(source),
            }
        })?;

        self.current.store(Arc::new(KeySnapshot {
            jwks,
            etag,
            last_modified,
        }));
        tracing::info!("JWKS refreshed");

        Ok(Refreshed::Updated)
    }
}

#[cfg(test)]
mod tests {
    use aliri::{jwa, jwk, Jwk, Jwt};
    use aliri_base64::Base64UrlRef;
    use color_eyre::Result;
    use serde_json::json;

    use super::*;
    use crate::claims::TokenClaims;

    fn key(kid: &'static str) -> Jwk {
        Jwk::from(jwa::Hmac::new(Base64UrlRef::from_slice(b"secret").to_owned()))
            .with_algorithm(jwa::Algorithm::HS256)
            .with_key_id(jwk::KeyId::from_static(kid))
    }

    fn key_set(kid: &'static str) -> Jwks {
        let mut jwks = Jwks::default();
        jwks.add_key(key(kid));
        jwks
    }

    fn has_key(cache: &KeyCache, kid: &'static str) -> bool {
        cache
            .current
            .load()
            .jwks
            .get_key_by_opt(Some(jwk::KeyIdRef::from_static(kid)), jwa::Algorithm::HS256)
            .is_some()
    }

    #[tokio::test]
    async fn conditional_refresh_keeps_keys_when_not_modified() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let url = format!("{}/jwks", server.url());
        let cache = KeyCache::empty();
        let client = Client::new();

        let first = server
            .mock("GET", "/jwks")
            .with_status(200)
            .with_header("etag", "\"v1\"")
            .with_body(serde_json::to_string(&key_set("one"))?)
            .create_async()
            .await;

        assert_eq!(cache.refresh(&client, &url).await?, Refreshed::Updated);
        first.assert_async().await;
        assert!(has_key(&cache, "one"));

        let second = server
            .mock("GET", "/jwks")
            .match_header("if-none-match", "\"v1\"")
            .with_status(304)
            .create_async()
            .await;

        assert_eq!(cache.refresh(&client, &url).await?, Refreshed::NotModified);
        second.assert_async().await;
        assert!(has_key(&cache, "one"));
        Ok(())
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_keys() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let url = format!("{}/jwks", server.url());
        let cache = KeyCache::new(key_set("kept"));
        server
            .mock("GET", "/jwks")
            .with_status(500)
            .create_async()
            .await;

        let err = cache.refresh(&Client::new(), &url).await.unwrap_err();

        assert!(matches!(err, OidcError::UnexpectedStatus { .. }));
        assert!(has_key(&cache, "kept"));
        Ok(())
    }

    #[tokio::test]
    async fn malformed_key_set_is_rejected() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let url = format!("{}/jwks", server.url());
        let cache = KeyCache::new(key_set("kept"));
        server
            .mock("GET", "/jwks")
            .with_status(200)
            .with_body("not a key set")
            .create_async()
            .await;

        let err = cache.refresh(&Client::new(), &url).await.unwrap_err();

        assert!(matches!(err, OidcError::MalformedResponse { .. }));
        assert!(has_key(&cache, "kept"));
        Ok(())
    }

    #[test]
    fn token_naming_an_unknown_key_is_rejected() -> Result<()> {
        let cache = KeyCache::new(key_set("one"));
        let headers = jwt::BasicHeaders::with_key_id(jwa::Algorithm::HS256, "two");
        let token = Jwt::try_from_parts_with_signature(
            &headers,
            &json!({ "sub": "user-1" }),
            &key("two"),
        )?;
        let validator =
            jwt::CoreValidator::default().extend_approved_algorithms([jwa::Algorithm::HS256]);

        let err = cache.verify::<TokenClaims>(&token, &validator).unwrap_err();

        assert!(matches!(err, OidcError::UnknownKeyId));
        Ok(())
    }
}
