//! Per-request streaming pipeline.
//!
//! Await readiness, classify the URL, then either hand back a stored
//! snapshot or stream a fresh render. Static-eligible renders are teed into
//! an accumulation buffer. Once the stream completes cleanly the buffer is
//! handed to a detached write that outlives the response.

use std::{
    fmt,
    future::Future,
    str::FromStr,
    sync::{Arc, Mutex},
    time::Instant,
};

use async_stream::stream;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use metrics::{counter, histogram};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::{
    application::{
        readiness::{ActiveVersion, ReadinessGate},
        render::{HtmlStream, RenderRequest, Renderer},
        snapshot::{Eligibility, SnapshotPath, StaticRoutes},
        storage::{StorageBackend, StorageError, StoredFile},
    },
    cache::lock::mutex_lock,
};

const SOURCE: &str = "application::pipeline";

pub(crate) const METRIC_SNAPSHOT_HIT: &str = "streamsnap_snapshot_hit_total";
pub(crate) const METRIC_SNAPSHOT_WRITTEN: &str = "streamsnap_snapshot_written_total";
pub(crate) const METRIC_SNAPSHOT_WRITE_FAILED: &str = "streamsnap_snapshot_write_failed_total";
pub(crate) const METRIC_RENDER_ERROR: &str = "streamsnap_render_error_total";
pub(crate) const METRIC_RENDER_MS: &str = "streamsnap_render_ms";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Development,
    Production,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Development => "development",
            RunMode::Production => "production",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(RunMode::Development),
            "production" | "prod" => Ok(RunMode::Production),
            other => Err(format!("unknown mode `{other}`")),
        }
    }
}

/// What the HTTP layer should send for one request.
pub enum Outcome {
    /// A live render. Already teed into snapshot persistence when eligible.
    Rendered(HtmlStream),
    /// Development: stream the stored snapshot inline as HTML.
    Snapshot { path: SnapshotPath, file: StoredFile },
    /// Production: hand the stored snapshot to the static-file stage.
    StaticFile { path: SnapshotPath, file: StoredFile },
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Rendered(_) => f.write_str("Rendered"),
            Outcome::Snapshot { path, file } => f
                .debug_struct("Snapshot")
                .field("path", path)
                .field("len", &file.len)
                .finish(),
            Outcome::StaticFile { path, file } => f
                .debug_struct("StaticFile")
                .field("path", path)
                .field("len", &file.len)
                .finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StreamingPipeline {
    gate: ReadinessGate,
    routes: Arc<StaticRoutes>,
    mode: RunMode,
    page_title: Arc<str>,
    writes: Arc<PendingWrites>,
}

impl StreamingPipeline {
    pub fn new(
        gate: ReadinessGate,
        routes: StaticRoutes,
        mode: RunMode,
        page_title: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            gate,
            routes: Arc::new(routes),
            mode,
            page_title: page_title.into(),
            writes: Arc::new(PendingWrites::default()),
        }
    }

    pub fn gate(&self) -> &ReadinessGate {
        &self.gate
    }

    pub fn routes(&self) -> &StaticRoutes {
        &self.routes
    }

    /// Wait for readiness, then respond against the version current at that moment.
    pub async fn handle(&self, url: &str) -> Outcome {
        let version = self.gate.await_ready().await;
        self.respond(&version, url).await
    }

    pub async fn respond(&self, version: &Arc<ActiveVersion>, url: &str) -> Outcome {
        let snapshot = match self.routes.classify(url) {
            Eligibility::Static(path) => Some(path),
            Eligibility::Dynamic => None,
        };

        if let Some(path) = snapshot.as_ref()
            && let Some(file) = open_snapshot(version.storage.as_ref(), path).await
        {
            counter!(METRIC_SNAPSHOT_HIT).increment(1);
            debug!(
                target = SOURCE,
                url,
                path = %path,
                mode = self.mode.as_str(),
                "serving stored snapshot"
            );
            let path = path.clone();
            return match self.mode {
                RunMode::Development => Outcome::Snapshot { path, file },
                RunMode::Production => Outcome::StaticFile { path, file },
            };
        }

        Outcome::Rendered(self.render(version, url, snapshot))
    }

    /// Wait for every snapshot write started so far to finish.
    pub async fn flush_snapshots(&self) {
        self.writes.drain().await;
    }

    /// Render `url`, persisting the output to `snapshot` when given.
    ///
    /// The write starts once the inner stream has ended cleanly and runs
    /// detached from the returned stream. An aborted or failed render
    /// writes nothing.
    pub fn render(
        &self,
        version: &Arc<ActiveVersion>,
        url: &str,
        snapshot: Option<SnapshotPath>,
    ) -> HtmlStream {
        let request = RenderRequest::new(url, self.page_title.as_ref());
        let mut inner = version.renderer.render_to_stream(request);
        let storage = Arc::clone(&version.storage);
        let generation = version.generation;
        let writes = Arc::clone(&self.writes);
        let url = url.to_string();
        let started = Instant::now();

        if let Some(path) = snapshot.as_ref() {
            info!(target = SOURCE, url, path = %path, "generating snapshot");
        }

        Box::pin(stream! {
            let mut buffer = snapshot.as_ref().map(|_| BytesMut::new());

            while let Some(item) = inner.next().await {
                match item {
                    Ok(chunk) => {
                        if let Some(buffer) = buffer.as_mut() {
                            buffer.extend_from_slice(&chunk);
                        }
                        yield Ok(chunk);
                    }
                    Err(err) => {
                        counter!(METRIC_RENDER_ERROR).increment(1);
                        error!(
                            target = SOURCE,
                            url,
                            generation,
                            error = %err,
                            "render stream failed"
                        );
                        record_elapsed(&url, started);
                        yield Err(err);
                        return;
                    }
                }
            }

            record_elapsed(&url, started);

            if let (Some(path), Some(buffer)) = (snapshot, buffer) {
                let html = buffer.freeze();
                writes.spawn(async move {
                    // Outcome is logged and counted inside.
                    let _ = persist_snapshot(storage.as_ref(), &path, html).await;
                });
            }
        })
    }
}

/// Open a stored snapshot, treating any failure as a miss.
async fn open_snapshot(storage: &dyn StorageBackend, path: &SnapshotPath) -> Option<StoredFile> {
    match storage.exists(path.as_str()).await {
        Ok(true) => {}
        Ok(false) => return None,
        Err(err) => {
            warn!(target = SOURCE, path = %path, error = %err, "snapshot lookup failed");
            return None;
        }
    }

    match storage.read_stream(path.as_str()).await {
        Ok(file) => Some(file),
        Err(err) => {
            warn!(
                target = SOURCE,
                path = %path,
                error = %err,
                "snapshot read failed, rendering instead"
            );
            None
        }
    }
}

/// Snapshot writes detached from the render streams that produced them.
#[derive(Debug, Default)]
struct PendingWrites {
    tasks: Mutex<JoinSet<()>>,
}

impl PendingWrites {
    fn spawn<F>(&self, write: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = mutex_lock(&self.tasks, SOURCE, "spawn");
        // Reap finished writes so the set only holds in-flight ones.
        while let Some(result) = tasks.try_join_next() {
            log_join(result);
        }
        tasks.spawn(write);
    }

    async fn drain(&self) {
        let mut tasks = std::mem::take(&mut *mutex_lock(&self.tasks, SOURCE, "drain"));
        if !tasks.is_empty() {
            debug!(target = SOURCE, pending = tasks.len(), "waiting for snapshot writes");
        }
        while let Some(result) = tasks.join_next().await {
            log_join(result);
        }
    }
}

fn log_join(result: Result<(), tokio::task::JoinError>) {
    if let Err(err) = result {
        error!(target = SOURCE, error = %err, "snapshot write task did not complete");
    }
}

/// Write a completed render, logging and counting the outcome.
pub(crate) async fn persist_snapshot(
    storage: &dyn StorageBackend,
    path: &SnapshotPath,
    html: Bytes,
) -> Result<(), StorageError> {
    let len = html.len();
    match write_snapshot(storage, path, html).await {
        Ok(()) => {
            counter!(METRIC_SNAPSHOT_WRITTEN).increment(1);
            info!(target = SOURCE, path = %path, bytes = len, "snapshot written");
            Ok(())
        }
        Err(err) => {
            counter!(METRIC_SNAPSHOT_WRITE_FAILED).increment(1);
            error!(target = SOURCE, path = %path, error = %err, "snapshot write failed");
            Err(err)
        }
    }
}

async fn write_snapshot(
    storage: &dyn StorageBackend,
    path: &SnapshotPath,
    html: Bytes,
) -> Result<(), StorageError> {
    storage.create_dir_all(path.parent()).await?;
    storage.write(path.as_str(), html).await
}

fn record_elapsed(url: &str, started: Instant) {
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_RENDER_MS).record(elapsed_ms);
    debug!(target = SOURCE, url, elapsed_ms, "render stream finished");
}
