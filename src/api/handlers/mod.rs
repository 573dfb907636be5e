pub mod health;
pub use self::health::health;

pub mod verify_code;
pub use self::verify_code::send_verify_code;

pub mod user_register;
pub use self::user_register::register;

pub mod user_login;
pub use self::user_login::login;

pub mod password;
pub use self::password::change_password;

pub mod platform;
pub use self::platform::bind_platform;

pub mod avatar;
pub use self::avatar::{get_avatar, upload_avatar};

// common functions for the handlers
use crate::token::{Claims, TokenAuthority};
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::Json;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

/// Uniform `{ message, code }` response body used by every account endpoint.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ApiMessage {
    pub message: String,
    pub code: u16,
}

pub(crate) fn message_response(
    status: StatusCode,
    message: &str,
) -> (StatusCode, Json<ApiMessage>) {
    (
        status,
        Json(ApiMessage {
            message: message.to_string(),
            code: status.as_u16(),
        }),
    )
}

/// Normalize an email for lookup/uniqueness checks.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

/// Usernames are 3-50 characters of letters, digits, and underscores.
pub(crate) fn valid_username(username: &str) -> bool {
    (3..=50).contains(&username.len())
        && Regex::new(r"^[a-zA-Z0-9_]+$").is_ok_and(|re| re.is_match(username))
}

pub(crate) fn valid_password(password: &str) -> bool {
    password.len() >= 6
}

pub(crate) fn valid_verify_code(code: &str) -> bool {
    code.len() == 6 && code.chars().all(|c| c.is_ascii_digit())
}

/// One-way hash for stored passwords; comparison is by recomputation.
pub(crate) fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Resolve the `Authorization` header into verified token claims.
///
/// Accepts the raw token or a `Bearer `-prefixed one; any failure is `None`.
pub(crate) fn bearer_identity(headers: &HeaderMap, authority: &TokenAuthority) -> Option<Claims> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let token = value.strip_prefix("Bearer ").unwrap_or(value);
    authority.verify(token)
}
