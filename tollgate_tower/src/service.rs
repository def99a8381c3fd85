use std::{
    fmt,
    future::Future,
    mem,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use bytes::Bytes;
use http::{Request, Response};
use http_body::Body;
use tollgate::{AuthError, AuthOptions, Gate, Responder};
use tower_layer::Layer;
use tower_service::Service;

use crate::{body::buffer_fields, BoxError};

/// Default upper bound on the size of a form or JSON body read for a token
pub const DEFAULT_BODY_LIMIT: usize = 64 * 1024;

/// Layer that authenticates the bearer token presented with each request
///
/// Authenticated requests reach the inner service with the token, its claims
/// and, if requested, the holder's profile in their extensions. They can be
/// read back with [`AuthenticatedRequest`][tollgate::AuthenticatedRequest].
///
/// Rejected requests never reach the inner service. By default they are
/// answered with a JSON error response. With [`respond(false)`][Self::respond]
/// the [`AuthError`] is returned as the service's error instead, for the host
/// to handle.
#[derive(Clone)]
pub struct AuthLayer {
    gate: Gate,
    options: Arc<AuthOptions>,
    responder: Responder,
    body_limit: usize,
}

impl fmt::Debug for AuthLayer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AuthLayer")
            .field("options", &self.options)
            .field("responder", &self.responder)
            .field("body_limit", &self.body_limit)
            .finish_non_exhaustive()
    }
}

impl AuthLayer {
    /// Constructs a layer that requires a token and answers failures itself
    pub fn new(gate: Gate) -> Self {
        Self {
            gate,
            options: Arc::new(AuthOptions::new()),
            responder: Responder::default(),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    /// Replaces the options used for every request
    #[must_use]
    pub fn with_options(self, options: AuthOptions) -> Self {
        Self {
            options: Arc::new(options),
            ..self
        }
    }

    /// Lets requests without a token through, unauthenticated
    #[must_use]
    pub fn allow_no_token(mut self, allow: bool) -> Self {
        Arc::make_mut(&mut self.options).allow_no_token = allow;
        self
    }

    /// Retrieves the token holder's profile for every authenticated request
    #[must_use]
    pub fn load_user_info(mut self, load: bool) -> Self {
        Arc::make_mut(&mut self.options).load_user_info = load;
        self
    }

    /// Sets whether failures are answered directly or returned as errors
    #[must_use]
    pub fn respond(self, respond: bool) -> Self {
        Self {
            responder: Responder::new(respond),
            ..self
        }
    }

    /// Bounds the size of a form or JSON body read while looking for a token
    #[must_use]
    pub fn body_limit(self, limit: usize) -> Self {
        Self {
            body_limit: limit,
            ..self
        }
    }

    async fn authenticate<B>(&self, request: Request<B>) -> Result<Request<B>, AuthError>
    where
        B: Body + From<Bytes>,
        B::Error: Into<BoxError>,
    {
        let (mut request, fields) = buffer_fields(request, self.body_limit).await?;

        self.gate
            .authenticate_request(&mut request, fields.as_ref(), &self.options)
            .await?;

        Ok(request)
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            layer: self.clone(),
        }
    }
}

/// Service produced by an [`AuthLayer`]
#[derive(Clone, Debug)]
pub struct AuthService<S> {
    inner: S,
    layer: AuthLayer,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for AuthService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send + 'static,
    ReqBody: Body + From<Bytes> + Send + 'static,
    ReqBody::Data: Send,
    ReqBody::Error: Into<BoxError>,
    ResBody: From<Bytes> + 'static,
{
    type Response = Response<ResBody>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        // The readied service is the one that must handle this request
        let clone = self.inner.clone();
        let mut inner = mem::replace(&mut self.inner, clone);
        let layer = self.layer.clone();

        Box::pin(async move {
            match layer.authenticate(request).await {
                Ok(request) => inner.call(request).await.map_err(Into::into),
                Err(err) => layer.responder.handle(err).map_err(BoxError::from),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{
        convert::Infallible,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use color_eyre::Result;
    use http::{header, StatusCode};
    use http_body_util::{BodyExt, Full};
    use serde_json::json;
    use tollgate::{
        AccessTokenClaims, AccessTokenRef, AuthenticatedRequest, IdentityProvider, TokenVerifier,
        TrustProvider, UserInfo, VerifyOptions,
    };
    use tower::{service_fn, ServiceExt};

    use super::*;

    struct Stub;

    #[async_trait]
    impl TrustProvider for Stub {
        async fn initialize(&self) -> Result<(), AuthError> {
            Ok(())
        }
    }

    #[async_trait]
    impl TokenVerifier for Stub {
        async fn verify(
            &self,
            token: &AccessTokenRef,
            options: &VerifyOptions,
        ) -> Result<AccessTokenClaims, AuthError> {
            match token.as_str() {
                "expired" => Err(AuthError::invalid_token("Expired access token")),
                "narrow" if options.scope.is_some() => {
                    Err(AuthError::insufficient_scope("Insufficient scope"))
                }
                sub => Ok(serde_json::from_value(json!({ "sub": sub })).unwrap()),
            }
        }
    }

    #[async_trait]
    impl IdentityProvider for Stub {
        async fn user_info(&self, _token: &AccessTokenRef) -> Result<UserInfo, AuthError> {
            Ok(serde_json::from_value(json!({ "name": "Ada" })).unwrap())
        }
    }

    type Req = Request<Full<Bytes>>;
    type Resp = Response<Full<Bytes>>;

    /// Runs one request through the layer, echoing what the inner service saw
    async fn run(layer: AuthLayer, request: Req) -> (Result<Resp, BoxError>, usize) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let svc = layer.layer(service_fn(move |req: Req| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                let sub = req.claims().and_then(|c| c.subject()).map(str::to_owned);
                let name = req.user_info().and_then(|u| u.get_str("name")).map(str::to_owned);
                let body = req.into_body().collect().await?.to_bytes();
                let seen = json!({
                    "sub": sub,
                    "name": name,
                    "body": String::from_utf8_lossy(&body),
                });
                Ok::<_, Infallible>(Response::new(Full::from(seen.to_string())))
            }
        }));

        let resp = svc.oneshot(request).await;
        (resp, calls.load(Ordering::SeqCst))
    }

    async fn json_body(resp: Resp) -> Result<serde_json::Value> {
        let bytes = resp.into_body().collect().await?.to_bytes();
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn layer() -> AuthLayer {
        AuthLayer::new(Gate::new(Stub))
    }

    fn bearer(token: &str) -> Req {
        Request::get("/")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Full::default())
            .unwrap()
    }

    #[tokio::test]
    async fn header_token_reaches_inner_service() -> Result<()> {
        let (resp, calls) = run(layer(), bearer("alice")).await;
        let resp = resp.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(calls, 1);
        assert_eq!(json_body(resp).await?["sub"], "alice");
        Ok(())
    }

    #[tokio::test]
    async fn missing_token_is_answered_with_challenge() -> Result<()> {
        let request = Request::get("/").body(Full::default())?;
        let (resp, calls) = run(layer(), request).await;
        let resp = resp.unwrap();

        assert_eq!(calls, 0);
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");
        assert!(resp.headers()[header::WWW_AUTHENTICATE]
            .to_str()?
            .starts_with(r#"Bearer realm="user""#));
        assert_eq!(
            json_body(resp).await?,
            json!({
                "error": "invalid_request",
                "error_description": "An access token is required",
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn failure_is_forwarded_when_not_responding() -> Result<()> {
        let (resp, calls) = run(layer().respond(false), bearer("expired")).await;

        assert_eq!(calls, 0);
        let err = resp.unwrap_err().downcast::<AuthError>().unwrap();
        assert_eq!(*err, AuthError::invalid_token("Expired access token"));
        Ok(())
    }

    #[tokio::test]
    async fn missing_token_is_allowed_when_configured() -> Result<()> {
        let request = Request::get("/").body(Full::default())?;
        let (resp, calls) = run(layer().allow_no_token(true), request).await;
        let resp = resp.unwrap();

        assert_eq!(calls, 1);
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await?["sub"], serde_json::Value::Null);
        Ok(())
    }

    #[tokio::test]
    async fn query_token_is_accepted() -> Result<()> {
        let request = Request::get("/items?access_token=bob").body(Full::default())?;
        let (resp, _) = run(layer(), request).await;

        assert_eq!(json_body(resp.unwrap()).await?["sub"], "bob");
        Ok(())
    }

    #[tokio::test]
    async fn form_body_token_is_accepted_and_body_preserved() -> Result<()> {
        let request = Request::post("/")
            .header(header::CONTENT_TYPE, tollgate::FORM_URLENCODED)
            .body(Full::from("access_token=carol&item=1"))?;
        let (resp, calls) = run(layer(), request).await;
        let body = json_body(resp.unwrap()).await?;

        assert_eq!(calls, 1);
        assert_eq!(body["sub"], "carol");
        assert_eq!(body["body"], "access_token=carol&item=1");
        Ok(())
    }

    #[tokio::test]
    async fn json_body_token_is_rejected() -> Result<()> {
        let request = Request::post("/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Full::from(r#"{"access_token":"carol"}"#))?;
        let (resp, calls) = run(layer(), request).await;
        let resp = resp.unwrap();

        assert_eq!(calls, 0);
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(resp).await?["error_description"],
            "Invalid content-type"
        );
        Ok(())
    }

    #[tokio::test]
    async fn token_in_header_and_body_is_rejected() -> Result<()> {
        let request = Request::post("/")
            .header(header::AUTHORIZATION, "Bearer alice")
            .header(header::CONTENT_TYPE, tollgate::FORM_URLENCODED)
            .body(Full::from("access_token=alice"))?;
        let (resp, calls) = run(layer(), request).await;
        let resp = resp.unwrap();

        assert_eq!(calls, 0);
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(resp).await?["error_description"],
            "Multiple authentication methods"
        );
        Ok(())
    }

    #[tokio::test]
    async fn insufficient_scope_is_forbidden() -> Result<()> {
        let layer = layer().with_options(
            AuthOptions::new().with_verify(VerifyOptions::new().with_scope("write")),
        );
        let (resp, calls) = run(layer, bearer("narrow")).await;
        let resp = resp.unwrap();

        assert_eq!(calls, 0);
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));
        Ok(())
    }

    #[tokio::test]
    async fn oversized_body_is_a_bad_request() -> Result<()> {
        let request = Request::post("/")
            .header(header::CONTENT_TYPE, tollgate::FORM_URLENCODED)
            .body(Full::from("access_token=alice&padding=0123456789"))?;
        let (resp, calls) = run(layer().body_limit(16), request).await;
        let resp = resp.unwrap();

        assert_eq!(calls, 0);
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn user_info_is_attached_when_requested() -> Result<()> {
        let (resp, _) = run(layer().load_user_info(true), bearer("alice")).await;
        let body = json_body(resp.unwrap()).await?;

        assert_eq!(body["sub"], "alice");
        assert_eq!(body["name"], "Ada");
        Ok(())
    }
}
