//! Password change endpoint, gated by an emailed verification code.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, instrument};
use utoipa::ToSchema;

use crate::api::handlers::{
    hash_password, message_response, normalize_email, valid_email, valid_password,
    valid_verify_code, ApiMessage,
};
use crate::api::storage::{find_by_username, update_password};
use crate::verification::CodeRegistry;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ChangePasswordRequest {
    username: String,
    new_password: String,
    email: String,
    verify_code: String,
}

#[utoipa::path(
    post,
    path = "/user/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = ApiMessage),
        (status = 400, description = "Invalid input or verification code", body = ApiMessage),
        (status = 404, description = "User not found", body = ApiMessage),
    ),
    tag = "password"
)]
#[instrument(skip(pool, registry, payload))]
pub async fn change_password(
    pool: Extension<PgPool>,
    registry: Extension<Arc<CodeRegistry>>,
    payload: Option<Json<ChangePasswordRequest>>,
) -> impl IntoResponse {
    let request: ChangePasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => return message_response(StatusCode::BAD_REQUEST, "Missing payload"),
    };

    if request.username.is_empty() {
        return message_response(StatusCode::BAD_REQUEST, "Missing username");
    }
    if !valid_password(&request.new_password) {
        return message_response(StatusCode::BAD_REQUEST, "Invalid password");
    }
    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return message_response(StatusCode::BAD_REQUEST, "Invalid email");
    }
    if !valid_verify_code(&request.verify_code) {
        return message_response(StatusCode::BAD_REQUEST, "Invalid verification code");
    }

    if !registry.redeem(&email, &request.verify_code).await {
        return message_response(
            StatusCode::BAD_REQUEST,
            "Invalid or expired verification code",
        );
    }

    // Code/key match alone authorizes the change; the email is not re-checked
    // against the account's address.
    let user = match find_by_username(&pool, &request.username).await {
        Ok(Some(user)) => user,
        Ok(None) => return message_response(StatusCode::NOT_FOUND, "User not found"),
        Err(err) => {
            error!("Failed to lookup user: {err}");
            return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Password change failed");
        }
    };

    let passwd_hash = hash_password(&request.new_password);
    match update_password(&pool, user.id, &passwd_hash).await {
        Ok(true) => message_response(StatusCode::OK, "Password changed"),
        Ok(false) => message_response(StatusCode::NOT_FOUND, "User not found"),
        Err(err) => {
            error!("Failed to update password: {err}");
            message_response(StatusCode::INTERNAL_SERVER_ERROR, "Password change failed")
        }
    }
}
