//! Static-file stage: client assets and production snapshots served
//! straight from the active storage backend.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::application::{
    error::AppError,
    intercept::{Intercept, is_asset_path},
    readiness::ActiveVersion,
    storage::{StorageBackend, StorageError, StoredFile},
};

pub const ASSET_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";
pub const SNAPSHOT_CACHE_CONTROL: &str = "public, max-age=0, must-revalidate";

/// Claims file-like paths and serves them from storage.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssetIntercept;

#[async_trait]
impl Intercept for AssetIntercept {
    async fn intercept(&self, version: &ActiveVersion, path: &str) -> Option<Response> {
        if !is_asset_path(path) {
            return None;
        }
        Some(serve_asset(version.storage.as_ref(), path).await)
    }
}

pub async fn serve_asset(storage: &dyn StorageBackend, path: &str) -> Response {
    const SOURCE: &str = "infra::http::static_files::serve_asset";

    match storage.read_stream(path).await {
        Ok(file) => stored_file_response(path, file, ASSET_CACHE_CONTROL),
        Err(err) => {
            if !matches!(err, StorageError::NotFound(_) | StorageError::InvalidPath(_)) {
                error!(
                    target = SOURCE,
                    path = %path,
                    error = %err,
                    "failed to read stored asset"
                );
            }
            AppError::from(err).into_response()
        }
    }
}

/// Stream a stored file with a guessed content type and explicit length.
pub fn stored_file_response(path: &str, file: StoredFile, cache_control: &'static str) -> Response {
    let mut response = Response::new(Body::from_stream(file.body));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(CONTENT_TYPE, value);
    }
    headers.insert(CONTENT_LENGTH, HeaderValue::from(file.len));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(cache_control));

    response
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http_body_util::BodyExt;

    use super::*;
    use crate::infra::storage::MemoryStorage;

    #[tokio::test]
    async fn serves_assets_with_guessed_type() {
        let storage = MemoryStorage::new();
        storage
            .write("app.css", Bytes::from_static(b"body{}"))
            .await
            .expect("write");

        let response = serve_asset(&storage, "/app.css").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/css");
        assert_eq!(response.headers()[CONTENT_LENGTH], "6");
        assert_eq!(response.headers()[CACHE_CONTROL], ASSET_CACHE_CONTROL);

        let body = response.into_body().collect().await.expect("body").to_bytes();
        assert_eq!(body.as_ref(), b"body{}");
    }

    #[tokio::test]
    async fn missing_assets_are_not_found() {
        let storage = MemoryStorage::new();
        let response = serve_asset(&storage, "/nope.js").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
