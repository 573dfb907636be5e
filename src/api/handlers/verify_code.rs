//! Verification-code issuance endpoint.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, instrument};
use utoipa::ToSchema;

use crate::api::email::{verify_code_message, EmailSender};
use crate::api::handlers::{message_response, normalize_email, valid_email, ApiMessage};
use crate::verification::CodeRegistry;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyCodeRequest {
    email: String,
}

#[utoipa::path(
    post,
    path = "/user/verify_code",
    request_body = VerifyCodeRequest,
    responses(
        (status = 200, description = "Verification code sent", body = ApiMessage),
        (status = 400, description = "Invalid email", body = ApiMessage),
        (status = 500, description = "Delivery failed", body = ApiMessage),
    ),
    tag = "verify_code"
)]
#[instrument(skip(registry, sender, payload))]
pub async fn send_verify_code(
    registry: Extension<Arc<CodeRegistry>>,
    sender: Extension<Arc<dyn EmailSender>>,
    payload: Option<Json<VerifyCodeRequest>>,
) -> impl IntoResponse {
    let request: VerifyCodeRequest = match payload {
        Some(Json(payload)) => payload,
        None => return message_response(StatusCode::BAD_REQUEST, "Missing payload"),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return message_response(StatusCode::BAD_REQUEST, "Invalid email");
    }

    // Any previous unredeemed code for this address is replaced.
    let code = registry.issue(&email).await;
    debug!(%email, "issued verification code");

    let message = verify_code_message(&email, &code);
    let sender = Arc::clone(&sender);
    let delivery = tokio::task::spawn_blocking(move || sender.send(&message)).await;
    match delivery {
        Ok(Ok(())) => message_response(StatusCode::OK, "Verification code sent"),
        Ok(Err(err)) => {
            // The issued code stays in the registry; the caller can retry.
            error!("Failed to send verification code to {email}: {err}");
            message_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to send verification code",
            )
        }
        Err(err) => {
            error!("Verification email task failed: {err}");
            message_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to send verification code",
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::email::{EmailMessage, LogEmailSender};
    use anyhow::anyhow;
    use axum::response::IntoResponse;

    fn sender() -> Extension<Arc<dyn EmailSender>> {
        Extension(Arc::new(LogEmailSender) as Arc<dyn EmailSender>)
    }

    struct BrokenSender;

    impl EmailSender for BrokenSender {
        fn send(&self, _message: &EmailMessage) -> anyhow::Result<()> {
            Err(anyhow!("relay unreachable"))
        }
    }

    #[tokio::test]
    async fn missing_payload_is_bad_request() {
        let registry = Arc::new(CodeRegistry::new());
        let response = send_verify_code(Extension(registry), sender(), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn invalid_email_is_bad_request() {
        let registry = Arc::new(CodeRegistry::new());
        let response = send_verify_code(
            Extension(Arc::clone(&registry)),
            sender(),
            Some(Json(VerifyCodeRequest {
                email: "not-an-email".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn valid_email_issues_and_stores_a_code() {
        let registry = Arc::new(CodeRegistry::new());
        let response = send_verify_code(
            Extension(Arc::clone(&registry)),
            sender(),
            Some(Json(VerifyCodeRequest {
                email: "User@Example.com".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn delivery_failure_is_internal_server_error() {
        let registry = Arc::new(CodeRegistry::new());
        let response = send_verify_code(
            Extension(Arc::clone(&registry)),
            Extension(Arc::new(BrokenSender) as Arc<dyn EmailSender>),
            Some(Json(VerifyCodeRequest {
                email: "user@example.com".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        // The issued code remains redeemable for a retried request.
        assert_eq!(registry.len().await, 1);
    }
}
