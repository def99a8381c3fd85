use std::sync::Arc;

use aliri::jwt;
use aliri_clock::UnixTime;
use aliri_oauth2::Scope;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tollgate::AccessTokenClaims;

use crate::OidcError;

/// The claims of an access token as seen by the verifier
///
/// The registered claims are typed so the validator can check them, while
/// every other claim is carried along untouched.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct TokenClaims {
    #[serde(default, skip_serializing_if = "jwt::Audiences::is_empty")]
    aud: jwt::Audiences,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iss: Option<jwt::Issuer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sub: Option<jwt::Subject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<UnixTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nbf: Option<UnixTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<Scope>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl TokenClaims {
    pub(crate) fn scope(&self) -> Option<&Scope> {
        self.scope.as_ref()
    }

    pub(crate) fn into_access_token_claims(self) -> Result<AccessTokenClaims, OidcError> {
        serde_json::to_value(self)
            .and_then(serde_json::from_value)
            .map_err(|err| OidcError::ClaimsEncoding(Arc::new(err)))
    }
}

impl jwt::CoreClaims for TokenClaims {
    #[inline]
    fn nbf(&self) -> Option<UnixTime> {
        self.nbf
    }

    #[inline]
    fn exp(&self) -> Option<UnixTime> {
        self.exp
    }

    #[inline]
    fn aud(&self) -> &jwt::Audiences {
        &self.aud
    }

    #[inline]
    fn iss(&self) -> Option<&jwt::IssuerRef> {
        self.iss.as_deref()
    }

    #[inline]
    fn sub(&self) -> Option<&jwt::SubjectRef> {
        self.sub.as_deref()
    }
}
