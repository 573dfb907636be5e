//! OpenAPI document over the annotated account routes.

use axum::{response::IntoResponse, Json};
use utoipa::OpenApi;

use super::handlers;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::verify_code::send_verify_code,
        handlers::user_register::register,
        handlers::user_login::login,
        handlers::password::change_password,
        handlers::platform::bind_platform,
        handlers::avatar::upload_avatar,
        handlers::avatar::get_avatar,
    ),
    components(schemas(
        handlers::ApiMessage,
        handlers::verify_code::VerifyCodeRequest,
        handlers::user_register::RegisterRequest,
        handlers::user_login::LoginRequest,
        handlers::user_login::LoginResponse,
        handlers::user_login::UserInfo,
        handlers::password::ChangePasswordRequest,
        handlers::platform::BindPlatformRequest,
        handlers::avatar::UploadAvatarRequest,
    )),
    tags(
        (name = "verify_code", description = "Verification code issuance"),
        (name = "register", description = "Account registration"),
        (name = "login", description = "Credential verification and session tokens"),
        (name = "password", description = "Password reset"),
        (name = "platform", description = "Third-party account linking"),
        (name = "avatar", description = "Avatar storage"),
    )
)]
pub struct ApiDoc;

pub async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
