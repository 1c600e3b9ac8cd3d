//! Ahead-of-time snapshot generation for parameter-free static routes.

use std::sync::Arc;

use bytes::BytesMut;
use futures::StreamExt;
use thiserror::Error;
use tracing::{info, warn};

use crate::application::{
    pipeline::{StreamingPipeline, persist_snapshot},
    readiness::ActiveVersion,
    render::RenderError,
    snapshot::SnapshotPath,
    storage::StorageError,
};

const SOURCE: &str = "application::prerender";

/// Why a single route produced no snapshot.
#[derive(Debug, Error)]
pub enum PrerenderError {
    #[error("render failed: {0}")]
    Render(#[from] RenderError),
    #[error("snapshot write failed: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Default)]
pub struct PrerenderReport {
    pub written: Vec<SnapshotPath>,
    pub skipped: Vec<SnapshotPath>,
    pub failed: Vec<(String, PrerenderError)>,
}

impl PrerenderReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Render every literal static route and write its snapshot.
///
/// Existing snapshots are kept unless `force` is set. A route only counts as
/// written once its write has returned successfully.
pub async fn prerender_static_routes(
    pipeline: &StreamingPipeline,
    version: &Arc<ActiveVersion>,
    force: bool,
) -> Result<PrerenderReport, StorageError> {
    let mut report = PrerenderReport::default();
    let urls: Vec<String> = pipeline
        .routes()
        .literal_paths()
        .map(str::to_string)
        .collect();

    for url in urls {
        let path = SnapshotPath::for_url(&url);
        if !force && version.storage.exists(path.as_str()).await? {
            info!(target = SOURCE, url, path = %path, "snapshot exists, skipping");
            report.skipped.push(path);
            continue;
        }

        match prerender_one(pipeline, version, &url, &path).await {
            Ok(()) => report.written.push(path),
            Err(err) => {
                warn!(target = SOURCE, url, path = %path, error = %err, "prerender failed");
                report.failed.push((url, err));
            }
        }
    }

    Ok(report)
}

async fn prerender_one(
    pipeline: &StreamingPipeline,
    version: &Arc<ActiveVersion>,
    url: &str,
    path: &SnapshotPath,
) -> Result<(), PrerenderError> {
    let mut stream = pipeline.render(version, url, None);
    let mut html = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        html.extend_from_slice(&chunk?);
    }

    persist_snapshot(version.storage.as_ref(), path, html.freeze()).await?;
    Ok(())
}
