use std::{net::SocketAddr, time::Duration};

use axum::{
    error_handling::HandleErrorLayer,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use clap::Parser;
use tollgate::{AccessTokenClaims, AuthError, AuthOptions, Gate, UserInfo, VerifyOptions};
use tollgate_oidc::{OidcClient, OidcConfig};
use tollgate_tower::{AuthLayer, BoxError};
use tower::ServiceBuilder;

#[derive(Debug, Parser)]
struct Opts {
    /// The issuer of accepted access tokens, used for discovery
    #[arg(short, long, env = "TOLLGATE_ISSUER")]
    issuer: String,

    /// An audience the access token must be issued to
    #[arg(short, long = "client", env = "TOLLGATE_CLIENTS", value_delimiter = ',')]
    clients: Vec<String>,

    /// Scopes that must all be granted to reach `/private`
    #[arg(short, long, env = "TOLLGATE_SCOPE")]
    scope: Option<String>,

    /// How often to refresh the signing keys, in seconds
    #[arg(short, long, env = "TOLLGATE_REFRESH_SECS", default_value_t = 0)]
    refresh_secs: u64,

    /// The address to listen on
    #[arg(short, long, env = "TOLLGATE_LISTEN", default_value = "127.0.0.1:8080")]
    listen: SocketAddr,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();

    let config = opts
        .clients
        .iter()
        .fold(OidcConfig::new(&opts.issuer), |config, client| {
            config.with_client(client)
        })
        .with_refresh_interval(Duration::from_secs(opts.refresh_secs));

    let gate = Gate::new(OidcClient::new(config)?);

    let verify = opts
        .scope
        .iter()
        .fold(VerifyOptions::new(), |verify, scope| verify.with_scope(scope));

    // Failures are returned as errors and rendered by `handle_auth_error`
    let private = ServiceBuilder::new()
        .layer(HandleErrorLayer::new(handle_auth_error))
        .layer(
            AuthLayer::new(gate.clone())
                .with_options(AuthOptions::new().with_verify(verify))
                .load_user_info(true)
                .respond(false),
        );

    // Failures are rendered by the layer itself
    let optional = ServiceBuilder::new()
        .layer(HandleErrorLayer::new(handle_auth_error))
        .layer(AuthLayer::new(gate).allow_no_token(true));

    let app = Router::new()
        .route("/private", get(handle_private).layer(private))
        .route("/public", get(handle_public).layer(optional));

    tracing::info!(listen = %opts.listen, "serving");
    let listener = tokio::net::TcpListener::bind(opts.listen).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn handle_auth_error(err: BoxError) -> Response {
    match err.downcast::<AuthError>() {
        Ok(err) => tollgate::error_response(&err),
        Err(err) => {
            tracing::error!(error = %err, "unhandled error");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

async fn handle_private(
    Extension(claims): Extension<AccessTokenClaims>,
    user_info: Option<Extension<UserInfo>>,
) -> String {
    let name = user_info
        .as_ref()
        .and_then(|Extension(info)| info.get_str("name"))
        .unwrap_or("(unnamed)");

    format!(
        "Hello, {name}! Your subject is `{}`.",
        claims.subject().unwrap_or("(none)")
    )
}

async fn handle_public(claims: Option<Extension<AccessTokenClaims>>) -> String {
    match claims {
        Some(Extension(claims)) => format!(
            "Hello, `{}`. No token was needed, but yours was valid.",
            claims.subject().unwrap_or("(none)")
        ),
        None => "Hello, stranger.".to_owned(),
    }
}
