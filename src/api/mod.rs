use crate::{
    api::handlers::{
        avatar::AvatarStore, bind_platform, change_password, get_avatar, health, login, register,
        send_verify_code, upload_avatar,
    },
    cli::globals::GlobalArgs,
    token::TokenAuthority,
    verification::{self, CodeRegistry},
};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    routing::{get, post},
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer, request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;

pub(crate) mod email;
pub(crate) mod handlers;
mod openapi;
pub(crate) mod storage;

use email::{EmailSender, LogEmailSender, SmtpEmailSender};

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, dsn: String, globals: &GlobalArgs) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let authority = Arc::new(
        TokenAuthority::new(globals.token_secret.clone())
            .with_ttl_seconds(globals.token_ttl_hours * 60 * 60),
    );

    let registry = Arc::new(CodeRegistry::new());
    // Expired codes are rejected lazily at redemption; the sweep only reclaims memory.
    verification::spawn_sweeper(Arc::clone(&registry), verification::SWEEP_INTERVAL);

    let sender: Arc<dyn EmailSender> = match &globals.smtp {
        Some(config) => Arc::new(
            SmtpEmailSender::new(config).context("Failed to create SMTP email sender")?,
        ),
        None => Arc::new(LogEmailSender),
    };

    tokio::fs::create_dir_all(&globals.avatar_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create avatar directory {}",
                globals.avatar_dir.display()
            )
        })?;
    let avatars = AvatarStore::new(globals.avatar_dir.clone());

    let app = Router::new()
        .route("/", get(|| async { "Welcome to Melodia!" }))
        .route("/health", get(health))
        .route("/openapi.json", get(openapi::openapi_json))
        .route("/user/verify_code", post(send_verify_code))
        .route("/user/register", post(register))
        .route("/user/login", post(login))
        .route("/user/password", post(change_password))
        .route("/user/platform", post(bind_platform))
        .route("/user/avatar", post(upload_avatar))
        .route("/user/avatar/:id", get(get_avatar))
        .fallback(|| async {
            handlers::message_response(axum::http::StatusCode::NOT_FOUND, "Not found")
        })
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(CorsLayer::permissive())
                .layer(Extension(authority))
                .layer(Extension(registry))
                .layer(Extension(sender))
                .layer(Extension(avatars))
                .layer(Extension(pool)),
        );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
