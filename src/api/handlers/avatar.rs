//! Avatar upload and retrieval.
//!
//! Avatars arrive as base64 data URLs and are stored on disk as `<user id>.<ext>`
//! under the configured directory. A user has at most one avatar; uploading
//! removes any previous file regardless of extension. Retrieval falls back to
//! `default.png` when the user has no avatar.

use axum::{
    extract::{Extension, Path},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use base64ct::{Base64, Encoding};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, instrument};
use utoipa::ToSchema;

use crate::api::handlers::{bearer_identity, message_response, ApiMessage};
use crate::token::TokenAuthority;

const AVATAR_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "gif"];

/// Filesystem location for avatar images.
#[derive(Clone, Debug)]
pub struct AvatarStore {
    dir: PathBuf,
}

impl AvatarStore {
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// First existing `<user id>.<ext>` variant, if any.
    async fn find(&self, user_id: i64) -> Option<PathBuf> {
        for ext in AVATAR_EXTENSIONS {
            let path = self.path_for(&format!("{user_id}.{ext}"));
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Some(path);
            }
        }
        None
    }

    /// Write the new avatar, removing any previous variant first.
    async fn save(&self, user_id: i64, extension: &str, bytes: &[u8]) -> anyhow::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        for ext in AVATAR_EXTENSIONS {
            // Missing files are fine; only one variant usually exists.
            let _ = tokio::fs::remove_file(self.path_for(&format!("{user_id}.{ext}"))).await;
        }
        let path = self.path_for(&format!("{user_id}.{extension}"));
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UploadAvatarRequest {
    /// Base64 data URL, e.g. `data:image/png;base64,...`.
    avatar: String,
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/gif" => "gif",
        // jpeg, jpg, and anything unrecognized are stored as jpg.
        _ => "jpg",
    }
}

fn content_type_for_path(path: &std::path::Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    }
}

fn parse_data_url(avatar: &str) -> Option<(String, Vec<u8>)> {
    let re = Regex::new(r"^data:([A-Za-z0-9.+/-]+);base64,(.+)$").ok()?;
    let captures = re.captures(avatar)?;
    let mime = captures.get(1)?.as_str().to_string();
    let bytes = Base64::decode_vec(captures.get(2)?.as_str()).ok()?;
    Some((mime, bytes))
}

#[utoipa::path(
    post,
    path = "/user/avatar",
    request_body = UploadAvatarRequest,
    params(
        ("Authorization" = String, Header, description = "Session token")
    ),
    responses(
        (status = 200, description = "Avatar stored", body = ApiMessage),
        (status = 400, description = "Missing or malformed image data", body = ApiMessage),
        (status = 401, description = "Invalid token", body = ApiMessage),
    ),
    tag = "avatar"
)]
#[instrument(skip(headers, authority, store, payload))]
pub async fn upload_avatar(
    headers: HeaderMap,
    authority: Extension<Arc<TokenAuthority>>,
    store: Extension<AvatarStore>,
    payload: Option<Json<UploadAvatarRequest>>,
) -> impl IntoResponse {
    let Some(claims) = bearer_identity(&headers, &authority) else {
        return message_response(StatusCode::UNAUTHORIZED, "Invalid token");
    };

    let request: UploadAvatarRequest = match payload {
        Some(Json(payload)) => payload,
        None => return message_response(StatusCode::BAD_REQUEST, "Missing image data"),
    };
    if request.avatar.is_empty() {
        return message_response(StatusCode::BAD_REQUEST, "Missing image data");
    }

    let Some((mime, bytes)) = parse_data_url(&request.avatar) else {
        return message_response(StatusCode::BAD_REQUEST, "Invalid image data format");
    };

    let extension = extension_for_mime(&mime);
    match store.save(claims.sub, extension, &bytes).await {
        Ok(path) => {
            tracing::debug!(user_id = claims.sub, path = %path.display(), "avatar stored");
            message_response(StatusCode::OK, "Avatar uploaded")
        }
        Err(err) => {
            error!("Failed to store avatar for user {}: {err}", claims.sub);
            message_response(StatusCode::INTERNAL_SERVER_ERROR, "Avatar upload failed")
        }
    }
}

#[utoipa::path(
    get,
    path = "/user/avatar/{id}",
    params(
        ("id" = i64, Path, description = "User id")
    ),
    responses(
        (status = 200, description = "Avatar image bytes"),
        (status = 404, description = "No avatar and no default image", body = ApiMessage),
    ),
    tag = "avatar"
)]
#[instrument(skip(store))]
pub async fn get_avatar(
    store: Extension<AvatarStore>,
    Path(user_id): Path<i64>,
) -> impl IntoResponse {
    let path = match store.find(user_id).await {
        Some(path) => path,
        None => store.path_for("default.png"),
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let mut headers = HeaderMap::new();
            if let Ok(value) = content_type_for_path(&path).parse() {
                headers.insert(CONTENT_TYPE, value);
            }
            (StatusCode::OK, headers, bytes).into_response()
        }
        Err(err) => {
            error!("Failed to read avatar {}: {err}", path.display());
            message_response(StatusCode::NOT_FOUND, "Avatar not found").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header::AUTHORIZATION, HeaderValue};
    use secrecy::SecretString;
    use tempfile::tempdir;

    fn authority() -> Arc<TokenAuthority> {
        Arc::new(TokenAuthority::new(SecretString::from("test-secret".to_string())))
    }

    fn auth_headers(authority: &TokenAuthority, user_id: i64) -> HeaderMap {
        let token = authority.issue(user_id, "tester").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&token).unwrap());
        headers
    }

    fn png_data_url() -> String {
        format!("data:image/png;base64,{}", Base64::encode_string(b"png-bytes"))
    }

    #[test]
    fn parse_data_url_extracts_mime_and_bytes() {
        let (mime, bytes) = parse_data_url(&png_data_url()).unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, b"png-bytes");
    }

    #[test]
    fn parse_data_url_rejects_garbage() {
        assert!(parse_data_url("not a data url").is_none());
        assert!(parse_data_url("data:image/png;base64,!!!").is_none());
        assert!(parse_data_url("data:image/png,plain").is_none());
    }

    #[test]
    fn extension_mapping_defaults_to_jpg() {
        assert_eq!(extension_for_mime("image/png"), "png");
        assert_eq!(extension_for_mime("image/gif"), "gif");
        assert_eq!(extension_for_mime("image/jpeg"), "jpg");
        assert_eq!(extension_for_mime("image/webp"), "jpg");
    }

    #[tokio::test]
    async fn upload_requires_a_token() {
        let dir = tempdir().unwrap();
        let store = AvatarStore::new(dir.path().to_path_buf());
        let response = upload_avatar(
            HeaderMap::new(),
            Extension(authority()),
            Extension(store),
            Some(Json(UploadAvatarRequest {
                avatar: png_data_url(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn upload_replaces_previous_variant() {
        let dir = tempdir().unwrap();
        let store = AvatarStore::new(dir.path().to_path_buf());
        let authority = authority();
        let headers = auth_headers(&authority, 5);

        let response = upload_avatar(
            headers.clone(),
            Extension(Arc::clone(&authority)),
            Extension(store.clone()),
            Some(Json(UploadAvatarRequest {
                avatar: png_data_url(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(dir.path().join("5.png").exists());

        // A second upload with a different type replaces the png.
        let gif = format!("data:image/gif;base64,{}", Base64::encode_string(b"gif"));
        let response = upload_avatar(
            headers,
            Extension(authority),
            Extension(store),
            Some(Json(UploadAvatarRequest { avatar: gif })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!dir.path().join("5.png").exists());
        assert!(dir.path().join("5.gif").exists());
    }

    #[tokio::test]
    async fn get_avatar_serves_stored_file_then_default() {
        let dir = tempdir().unwrap();
        let store = AvatarStore::new(dir.path().to_path_buf());
        std::fs::create_dir_all(dir.path()).unwrap();
        std::fs::write(dir.path().join("7.jpg"), b"jpg-bytes").unwrap();
        std::fs::write(dir.path().join("default.png"), b"default").unwrap();

        let response = get_avatar(Extension(store.clone()), Path(7))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "image/jpeg"
        );

        let response = get_avatar(Extension(store), Path(8)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "image/png");
    }

    #[tokio::test]
    async fn get_avatar_without_default_is_not_found() {
        let dir = tempdir().unwrap();
        let store = AvatarStore::new(dir.path().to_path_buf());
        let response = get_avatar(Extension(store), Path(1)).await.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
