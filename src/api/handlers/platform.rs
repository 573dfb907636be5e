//! Third-party platform account linking.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, instrument};
use utoipa::ToSchema;

use crate::api::handlers::{bearer_identity, message_response, ApiMessage};
use crate::api::storage::{bind_platform as store_platform, Platform};
use crate::token::TokenAuthority;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct BindPlatformRequest {
    platform: String,
    platform_id: String,
}

#[utoipa::path(
    post,
    path = "/user/platform",
    request_body = BindPlatformRequest,
    params(
        ("Authorization" = String, Header, description = "Session token")
    ),
    responses(
        (status = 200, description = "Platform id linked", body = ApiMessage),
        (status = 400, description = "Unknown platform or missing id", body = ApiMessage),
        (status = 401, description = "Invalid token", body = ApiMessage),
    ),
    tag = "platform"
)]
#[instrument(skip(headers, pool, authority, payload))]
pub async fn bind_platform(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    authority: Extension<Arc<TokenAuthority>>,
    payload: Option<Json<BindPlatformRequest>>,
) -> impl IntoResponse {
    let request: BindPlatformRequest = match payload {
        Some(Json(payload)) => payload,
        None => return message_response(StatusCode::BAD_REQUEST, "Missing payload"),
    };

    let Some(platform) = Platform::parse(&request.platform) else {
        return message_response(StatusCode::BAD_REQUEST, "Unknown platform");
    };
    if request.platform_id.trim().is_empty() {
        return message_response(StatusCode::BAD_REQUEST, "Missing platform id");
    }

    let Some(claims) = bearer_identity(&headers, &authority) else {
        return message_response(StatusCode::UNAUTHORIZED, "Invalid token");
    };

    match store_platform(&pool, claims.sub, platform, request.platform_id.trim()).await {
        Ok(true) => message_response(StatusCode::OK, "Platform id linked"),
        Ok(false) => message_response(StatusCode::NOT_FOUND, "User not found"),
        Err(err) => {
            error!("Failed to bind platform id: {err}");
            message_response(StatusCode::INTERNAL_SERVER_ERROR, "Platform link failed")
        }
    }
}
