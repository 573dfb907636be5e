//! Login endpoint: credential check plus session token mint.

use axum::{
    extract::Extension,
    http::{header::AUTHORIZATION, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, instrument};
use utoipa::ToSchema;

use crate::api::handlers::{hash_password, message_response, ApiMessage};
use crate::api::storage::{find_by_username, UserRecord};
use crate::token::TokenAuthority;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    username: String,
    password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub qq_id: Option<String>,
    pub netease_id: Option<String>,
}

impl From<UserRecord> for UserInfo {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            created_at: user.created_at,
            qq_id: user.qq_id,
            netease_id: user.netease_id,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub message: String,
    pub code: u16,
    pub user: UserInfo,
}

#[utoipa::path(
    post,
    path = "/user/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful, token in the Authorization header", body = LoginResponse),
        (status = 401, description = "Invalid username or password", body = ApiMessage),
    ),
    tag = "login"
)]
#[instrument(skip(pool, authority, payload))]
pub async fn login(
    pool: Extension<PgPool>,
    authority: Extension<Arc<TokenAuthority>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => {
            return message_response(StatusCode::BAD_REQUEST, "Missing payload").into_response()
        }
    };

    if request.username.is_empty() || request.password.is_empty() {
        return message_response(StatusCode::BAD_REQUEST, "Missing username or password")
            .into_response();
    }

    let user = match find_by_username(&pool, &request.username).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            // Unknown user and bad password answer identically.
            return message_response(StatusCode::UNAUTHORIZED, "Invalid username or password")
                .into_response();
        }
        Err(err) => {
            error!("Failed to lookup user: {err}");
            return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Login failed")
                .into_response();
        }
    };

    if hash_password(&request.password) != user.passwd_hash {
        return message_response(StatusCode::UNAUTHORIZED, "Invalid username or password")
            .into_response();
    }

    let token = match authority.issue(user.id, &user.username) {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to issue session token: {err}");
            return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Login failed")
                .into_response();
        }
    };

    let mut headers = HeaderMap::new();
    match HeaderValue::from_str(&token) {
        Ok(value) => {
            headers.insert(AUTHORIZATION, value);
        }
        Err(err) => {
            error!("Failed to encode session token header: {err}");
            return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Login failed")
                .into_response();
        }
    }

    let body = LoginResponse {
        message: "Login successful".to_string(),
        code: StatusCode::OK.as_u16(),
        user: user.into(),
    };

    (StatusCode::OK, headers, Json(body)).into_response()
}
