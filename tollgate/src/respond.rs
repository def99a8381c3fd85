//! Rendering authentication failures as HTTP responses

use bytes::Bytes;
use http::{header, HeaderValue, Response, StatusCode};
use serde::Deserialize;

use crate::AuthError;

/// Decides whether an authentication failure is answered directly or handed
/// back to the host's own error handling
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Responder {
    respond: bool,
}

impl Default for Responder {
    #[inline]
    fn default() -> Self {
        Self::new(true)
    }
}

impl Responder {
    /// Constructs a responder
    ///
    /// When `respond` is `false`, errors are forwarded unchanged.
    #[inline]
    #[must_use]
    pub const fn new(respond: bool) -> Self {
        Self { respond }
    }

    /// Whether failures are answered directly
    #[inline]
    #[must_use]
    pub const fn responds(&self) -> bool {
        self.respond
    }

    /// Renders the error as a response, or forwards it
    ///
    /// # Errors
    ///
    /// Returns the error unchanged when this responder does not respond.
    pub fn handle<B: From<Bytes>>(&self, err: AuthError) -> Result<Response<B>, AuthError> {
        if self.respond {
            tracing::trace!(status = %err.status(), "responding to authentication failure");
            Ok(error_response(&err))
        } else {
            Err(err)
        }
    }
}

/// Builds a response carrying the error's status and a JSON body of the form
/// `{"error": "…", "error_description": "…"}`
///
/// `401 Unauthorized` and `403 Forbidden` responses also carry a
/// `www-authenticate` challenge:
///
/// ```http
/// HTTP/1.1 401 Unauthorized
/// content-type: application/json
/// www-authenticate: Bearer realm="user", error="invalid_request", error_description="An access token is required"
/// ```
pub fn error_response<B: From<Bytes>>(err: &AuthError) -> Response<B> {
    let body = serde_json::to_vec(err).unwrap_or_default();

    let mut resp = Response::new(B::from(Bytes::from(body)));
    *resp.status_mut() = err.status();
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );

    if matches!(err.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        resp.headers_mut()
            .insert(header::WWW_AUTHENTICATE, challenge(err));
    }

    resp
}

// Every parameter is passed through `escape_default`, which only yields
// printable ASCII, so the result is always a valid `HeaderValue`.
fn challenge(err: &AuthError) -> HeaderValue {
    let mut params = Vec::with_capacity(3);

    if let Some(realm) = err.realm() {
        params.push(format!(r#"realm="{}""#, realm.escape_default()));
    }

    params.push(format!(r#"error="{}""#, err.error().escape_default()));

    if !err.description().is_empty() {
        params.push(format!(
            r#"error_description="{}""#,
            err.description().escape_default()
        ));
    }

    HeaderValue::try_from(format!("Bearer {}", params.join(", ")))
        .expect("escaped parameters are a valid header value")
}
