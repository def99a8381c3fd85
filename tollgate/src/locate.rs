//! Locating the bearer token presented with a request
//!
//! A token may be presented in exactly one of three places, checked in
//! this order:
//!
//! 1. the `Authorization` header, using the `Bearer` scheme;
//! 2. the `access_token` query parameter;
//! 3. the `access_token` field of an `application/x-www-form-urlencoded` body.
//!
//! Presenting a token in more than one place is rejected rather than
//! resolved in favor of any one of them.

use http::{header, HeaderMap, Request};

use crate::{AccessToken, AuthError, BodyFields};

/// Name of the query parameter and body field carrying a token
pub const ACCESS_TOKEN_PARAM: &str = "access_token";

/// The only content type accepted for a token carried in the body
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

const BEARER: &str = "Bearer";

const INVALID_HEADER: &str = "Invalid authorization header";
const INVALID_SCHEME: &str = "Invalid authorization scheme";
const MULTIPLE_METHODS: &str = "Multiple authentication methods";
const INVALID_CONTENT_TYPE: &str = "Invalid content-type";

/// The parts of a request that may carry a bearer token
#[derive(Clone, Copy, Debug)]
pub struct Presentation<'a> {
    headers: &'a HeaderMap,
    query: Option<&'a str>,
    body: Option<&'a BodyFields>,
}

impl<'a> Presentation<'a> {
    /// A presentation consisting of only request headers
    #[inline]
    pub fn new(headers: &'a HeaderMap) -> Self {
        Self {
            headers,
            query: None,
            body: None,
        }
    }

    /// Headers and query string of a request, without a body
    pub fn from_request<B>(request: &'a Request<B>) -> Self {
        Self::new(request.headers()).with_query(request.uri().query())
    }

    /// Sets the raw (still percent-encoded) query string
    #[inline]
    pub fn with_query(self, query: Option<&'a str>) -> Self {
        Self { query, ..self }
    }

    /// Sets the parsed body fields
    #[inline]
    pub fn with_body(self, body: Option<&'a BodyFields>) -> Self {
        Self { body, ..self }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Source {
    Header,
    Query,
    Body,
}

impl Source {
    const ORDER: [Self; 3] = [Self::Header, Self::Query, Self::Body];

    fn name(self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Query => "query",
            Self::Body => "body",
        }
    }

    /// Finds a non-empty token in this source, rejecting a malformed one
    fn extract(self, presentation: &Presentation) -> Result<Option<AccessToken>, AuthError> {
        match self {
            Self::Header => from_authorization_header(presentation.headers),
            Self::Query => Ok(presentation.query.and_then(|query| {
                url::form_urlencoded::parse(query.as_bytes())
                    .find(|(k, _)| k == ACCESS_TOKEN_PARAM)
                    .filter(|(_, v)| !v.is_empty())
                    .map(|(_, v)| AccessToken::new(v.into_owned()))
            })),
            Self::Body => Ok(presentation
                .body
                .and_then(|body| body.get(ACCESS_TOKEN_PARAM))
                .filter(|v| !v.is_empty())
                .map(|v| AccessToken::new(v.to_owned()))),
        }
    }

    /// Checks that a token found in this source may be used
    ///
    /// Runs only after the token is known not to conflict with another source.
    fn admit(self, presentation: &Presentation) -> Result<(), AuthError> {
        match self {
            Self::Body => {
                let content_type = presentation.headers.get(header::CONTENT_TYPE);
                if content_type.map(|v| v.as_bytes()) == Some(FORM_URLENCODED.as_bytes()) {
                    Ok(())
                } else {
                    Err(AuthError::invalid_request(INVALID_CONTENT_TYPE))
                }
            }
            Self::Header | Self::Query => Ok(()),
        }
    }
}

fn from_authorization_header(headers: &HeaderMap) -> Result<Option<AccessToken>, AuthError> {
    let mut values = headers.get_all(header::AUTHORIZATION).iter();

    let value = match values.next() {
        Some(value) if !value.is_empty() => value,
        _ => return Ok(None),
    };

    if values.next().is_some() {
        return Err(AuthError::invalid_request(INVALID_HEADER));
    }

    let value = value
        .to_str()
        .map_err(|_| AuthError::invalid_request(INVALID_HEADER))?;

    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(credentials), None) => {
            if scheme != BEARER {
                return Err(AuthError::invalid_request(INVALID_SCHEME));
            }

            if credentials.is_empty() {
                Ok(None)
            } else {
                Ok(Some(AccessToken::new(credentials.to_owned())))
            }
        }
        _ => Err(AuthError::invalid_request(INVALID_HEADER)),
    }
}

/// Locates the single bearer token presented with a request
///
/// Returns `Ok(None)` when no token was presented at all.
///
/// # Errors
///
/// Returns an `invalid_request` error with status `400 Bad Request` if the
/// `Authorization` header is malformed or uses a scheme other than `Bearer`,
/// if a token is presented in more than one place, or if a token is carried
/// in a body that is not `application/x-www-form-urlencoded`.
pub fn locate(presentation: &Presentation) -> Result<Option<AccessToken>, AuthError> {
    Source::ORDER
        .into_iter()
        .try_fold(None, |found: Option<AccessToken>, source| {
            let token = match source.extract(presentation)? {
                Some(token) => token,
                None => return Ok(found),
            };

            if found.is_some() {
                tracing::debug!(source = source.name(), "access token presented more than once");
                return Err(AuthError::invalid_request(MULTIPLE_METHODS));
            }

            source.admit(presentation)?;

            tracing::trace!(source = source.name(), "located access token");
            Ok(Some(token))
        })
}
