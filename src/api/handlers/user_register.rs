//! Registration endpoint, gated by an emailed verification code.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, instrument};
use utoipa::ToSchema;

use crate::api::handlers::{
    hash_password, message_response, normalize_email, valid_email, valid_password,
    valid_username, valid_verify_code, ApiMessage,
};
use crate::api::storage::{create_user, SignupOutcome};
use crate::verification::CodeRegistry;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    username: String,
    password: String,
    email: String,
    verify_code: String,
}

#[utoipa::path(
    post,
    path = "/user/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registration successful", body = ApiMessage),
        (status = 400, description = "Invalid input or verification code", body = ApiMessage),
        (status = 409, description = "Username already exists", body = ApiMessage),
    ),
    tag = "register"
)]
#[instrument(skip(pool, registry, payload))]
pub async fn register(
    pool: Extension<PgPool>,
    registry: Extension<Arc<CodeRegistry>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let request: RegisterRequest = match payload {
        Some(Json(payload)) => payload,
        None => return message_response(StatusCode::BAD_REQUEST, "Missing payload"),
    };

    if !valid_username(&request.username) {
        return message_response(StatusCode::BAD_REQUEST, "Invalid username");
    }
    if !valid_password(&request.password) {
        return message_response(StatusCode::BAD_REQUEST, "Invalid password");
    }
    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return message_response(StatusCode::BAD_REQUEST, "Invalid email");
    }
    if !valid_verify_code(&request.verify_code) {
        return message_response(StatusCode::BAD_REQUEST, "Invalid verification code");
    }

    // Single-use: a successful redeem spends the code even if the insert below fails.
    if !registry.redeem(&email, &request.verify_code).await {
        return message_response(
            StatusCode::BAD_REQUEST,
            "Invalid or expired verification code",
        );
    }

    let passwd_hash = hash_password(&request.password);
    match create_user(&pool, &request.username, &passwd_hash, &email).await {
        Ok(SignupOutcome::Created) => message_response(StatusCode::CREATED, "Registration successful"),
        Ok(SignupOutcome::Conflict) => {
            message_response(StatusCode::CONFLICT, "Username already exists")
        }
        Err(err) => {
            error!("Failed to register user: {err}");
            message_response(StatusCode::INTERNAL_SERVER_ERROR, "Registration failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    fn lazy_pool() -> PgPool {
        PgPoolOptions::new()
            .connect_lazy("postgres://postgres@localhost/postgres")
            .unwrap()
    }

    fn request(verify_code: &str) -> RegisterRequest {
        RegisterRequest {
            username: "alice".to_string(),
            password: "secret".to_string(),
            email: "alice@example.com".to_string(),
            verify_code: verify_code.to_string(),
        }
    }

    #[tokio::test]
    async fn missing_payload_is_bad_request() {
        let registry = Arc::new(CodeRegistry::new());
        let response = register(Extension(lazy_pool()), Extension(registry), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_fields_are_rejected_before_the_registry() {
        let registry = Arc::new(CodeRegistry::new());
        let code = registry.issue("alice@example.com").await;

        let mut bad_username = request(&code);
        bad_username.username = "a!".to_string();
        let response = register(
            Extension(lazy_pool()),
            Extension(Arc::clone(&registry)),
            Some(Json(bad_username)),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let mut bad_code = request(&code);
        bad_code.verify_code = "12ab".to_string();
        let response = register(
            Extension(lazy_pool()),
            Extension(Arc::clone(&registry)),
            Some(Json(bad_code)),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // The stored code was never consumed by the rejected requests.
        assert!(registry.redeem("alice@example.com", &code).await);
    }

    #[tokio::test]
    async fn unknown_verification_code_is_rejected() {
        let registry = Arc::new(CodeRegistry::new());
        let response = register(
            Extension(lazy_pool()),
            Extension(registry),
            Some(Json(request("123456"))),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
