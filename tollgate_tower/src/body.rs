use bytes::Bytes;
use http::{header, HeaderMap, Request};
use http_body::Body;
use http_body_util::{BodyExt, Limited};
use tollgate::{AuthError, BodyFields};

use crate::BoxError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BodyKind {
    Form,
    Json,
}

impl BodyKind {
    fn of(headers: &HeaderMap) -> Option<Self> {
        let content_type = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
        let media_type = content_type.split(';').next()?.trim();

        if media_type.eq_ignore_ascii_case(tollgate::FORM_URLENCODED) {
            Some(Self::Form)
        } else if media_type.eq_ignore_ascii_case("application/json") {
            Some(Self::Json)
        } else {
            None
        }
    }
}

/// Reads a form or JSON body into fields, handing back an equivalent request
///
/// Requests with any other content type are returned untouched.
pub(crate) async fn buffer_fields<B>(
    request: Request<B>,
    limit: usize,
) -> Result<(Request<B>, Option<BodyFields>), AuthError>
where
    B: Body + From<Bytes>,
    B::Error: Into<BoxError>,
{
    let kind = match BodyKind::of(request.headers()) {
        Some(kind) => kind,
        None => return Ok((request, None)),
    };

    let (parts, body) = request.into_parts();
    let bytes = Limited::new(body, limit)
        .collect()
        .await
        .map_err(|err| {
            tracing::debug!(error = %err, "unable to read request body");
            AuthError::invalid_request("Unable to read request body")
        })?
        .to_bytes();

    let fields = match kind {
        BodyKind::Form => BodyFields::from_form_urlencoded(&bytes),
        BodyKind::Json => BodyFields::from_json(&bytes),
    };

    Ok((Request::from_parts(parts, B::from(bytes)), Some(fields)))
}
