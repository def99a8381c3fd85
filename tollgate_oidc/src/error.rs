use std::sync::Arc;

use aliri::error::{ClaimsRejected, JwtVerifyError};
use thiserror::Error;
use tollgate::AuthError;

/// A failure while talking to, or verifying tokens for, an OpenID Connect
/// provider
///
/// Cheap to clone, so that concurrent callers waiting on the same discovery
/// or key set fetch all receive its failure.
#[derive(Clone, Debug, Error)]
pub enum OidcError {
    /// The HTTP client could not be constructed
    #[error("unable to construct HTTP client")]
    HttpClient(#[source] Arc<reqwest::Error>),
    /// The provider could not be reached
    #[error("unable to reach {url}")]
    Unreachable {
        /// The requested URL
        url: String,
        /// The underlying transport error
        #[source]
        source: Arc<reqwest::Error>,
    },
    /// The provider answered with an unexpected status
    #[error("unexpected status {status} from {url}")]
    UnexpectedStatus {
        /// The requested URL
        url: String,
        /// The status received
        status: reqwest::StatusCode,
    },
    /// The provider's answer could not be decoded
    #[error("malformed response from {url}")]
    MalformedResponse {
        /// The requested URL
        url: String,
        /// The underlying decoding error
        #[source]
        source: Arc<reqwest::Error>,
    },
    /// No key matches the token's `kid` and `alg`
    #[error("no matching key found to validate JWT")]
    UnknownKeyId,
    /// The token was malformed, badly signed or carried rejected claims
    #[error("invalid JWT")]
    JwtVerifyError(#[source] Arc<JwtVerifyError>),
    /// The token does not grant the required scope
    #[error("access denied by policy")]
    PolicyDenial,
    /// The configured or requested scope is not a valid OAuth2 scope
    #[error("invalid required scope {0:?}")]
    InvalidScope(String),
    /// Verified claims could not be re-encoded as a JSON object
    #[error("unable to encode verified claims")]
    ClaimsEncoding(#[source] Arc<serde_json::Error>),
    /// No userinfo endpoint was configured or discovered
    #[error("no userinfo endpoint is known")]
    MissingUserInfoEndpoint,
    /// The userinfo endpoint refused the access token
    #[error("the provider rejected the access token")]
    TokenRejected,
    /// No signing algorithm is approved, which would let any algorithm through
    #[error("no signing algorithms are approved")]
    NoApprovedAlgorithms,
}

impl From<JwtVerifyError> for OidcError {
    #[inline]
    fn from(err: JwtVerifyError) -> Self {
        Self::JwtVerifyError(Arc::new(err))
    }
}

impl From<OidcError> for AuthError {
    fn from(err: OidcError) -> Self {
        match err {
            OidcError::HttpClient(_) | OidcError::ClaimsEncoding(_) => {
                AuthError::server_error("Unable to process access token")
            }
            OidcError::Unreachable { .. }
            | OidcError::UnexpectedStatus { .. }
            | OidcError::MalformedResponse { .. } => {
                AuthError::upstream("Unable to reach the identity provider")
            }
            OidcError::UnknownKeyId => AuthError::invalid_token("Unknown signing key"),
            OidcError::JwtVerifyError(err) => classify_rejection(&err),
            OidcError::PolicyDenial => AuthError::insufficient_scope("Insufficient scope"),
            OidcError::InvalidScope(_) => AuthError::server_error("Invalid scope configuration"),
            OidcError::NoApprovedAlgorithms => {
                AuthError::server_error("Invalid algorithm configuration")
            }
            OidcError::MissingUserInfoEndpoint => {
                AuthError::server_error("No userinfo endpoint is configured")
            }
            OidcError::TokenRejected => AuthError::invalid_token("Invalid access token"),
        }
    }
}

fn classify_rejection(err: &JwtVerifyError) -> AuthError {
    match err {
        JwtVerifyError::ClaimsRejected(rejected) => match rejected {
            ClaimsRejected::InvalidAudience | ClaimsRejected::MissingRequiredClaim("aud") => {
                AuthError::insufficient_scope("Mismatching audience")
            }
            ClaimsRejected::InvalidIssuer | ClaimsRejected::MissingRequiredClaim("iss") => {
                AuthError::invalid_token("Mismatching issuer")
            }
            ClaimsRejected::TokenExpired => AuthError::invalid_token("Expired access token"),
            ClaimsRejected::TokenNotYetValid => {
                AuthError::invalid_token("Access token is not yet valid")
            }
            ClaimsRejected::InvalidAlgorithm => {
                AuthError::invalid_token("Unapproved signing algorithm")
            }
            ClaimsRejected::MissingRequiredClaim(claim) => {
                AuthError::invalid_token(format!("Missing required claim: {claim}"))
            }
            _ => AuthError::invalid_token("Invalid access token claims"),
        },
        JwtVerifyError::JwkVerifyError(_) => AuthError::invalid_token("Invalid signature"),
        _ => AuthError::invalid_token("Malformed access token"),
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::*;

    fn classify(err: OidcError) -> (StatusCode, String, String) {
        let err = AuthError::from(err);
        (
            err.status(),
            err.error().to_owned(),
            err.description().to_owned(),
        )
    }

    #[test]
    fn audience_mismatch_is_forbidden() {
        let err = OidcError::from(JwtVerifyError::from(ClaimsRejected::InvalidAudience));

        assert_eq!(
            classify(err),
            (
                StatusCode::FORBIDDEN,
                "insufficient_scope".into(),
                "Mismatching audience".into()
            )
        );
    }

    #[test]
    fn expiry_is_an_invalid_token() {
        let err = OidcError::from(JwtVerifyError::from(ClaimsRejected::TokenExpired));

        assert_eq!(
            classify(err),
            (
                StatusCode::UNAUTHORIZED,
                "invalid_token".into(),
                "Expired access token".into()
            )
        );
    }

    #[test]
    fn missing_claims_are_named() {
        let err = OidcError::from(JwtVerifyError::from(ClaimsRejected::MissingRequiredClaim(
            "exp",
        )));

        assert_eq!(classify(err).2, "Missing required claim: exp");
    }

    #[test]
    fn bad_scope_configuration_is_a_server_error() {
        let err = OidcError::InvalidScope("\"quoted\"".into());

        assert_eq!(classify(err).0, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn missing_algorithms_are_a_server_error() {
        assert_eq!(
            classify(OidcError::NoApprovedAlgorithms).0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn rejected_userinfo_token_is_unauthorized() {
        assert_eq!(classify(OidcError::TokenRejected).0, StatusCode::UNAUTHORIZED);
    }
}
