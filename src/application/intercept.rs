//! Interception seam consulted before the streaming pipeline.

use async_trait::async_trait;
use axum::response::Response;

use crate::application::readiness::ActiveVersion;

/// A stage that may claim a request before any rendering happens.
///
/// Returning `Some` bypasses the pipeline entirely.
#[async_trait]
pub trait Intercept: Send + Sync {
    async fn intercept(&self, version: &ActiveVersion, path: &str) -> Option<Response>;
}

/// Whether a request path names a file rather than an application route.
pub fn is_asset_path(path: &str) -> bool {
    path.rsplit('/')
        .next()
        .is_some_and(|last| last.contains('.') && last != "." && last != "..")
}
