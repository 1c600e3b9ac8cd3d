//! Development build watcher.
//!
//! Polls the build output, and on every change reloads it, mirrors the
//! client assets into the in-memory backend and publishes a new version.

use std::{path::Path, sync::Arc, time::Duration};

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, error, info};

use crate::{
    application::{
        error::AppError,
        readiness::ReadinessGate,
        storage::{StorageBackend, parent_dir},
    },
    cache::FragmentCacheConfig,
    domain::ClientManifest,
    infra::storage::MemoryStorage,
};

use super::artifacts::{ArtifactPaths, Fingerprint, fingerprint, load_build, read_artifact};

const SOURCE: &str = "infra::dev";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Artifacts are missing or unchanged since the last poll.
    Idle,
    Published(u64),
    Failed,
}

pub struct DevWatcher {
    paths: ArtifactPaths,
    gate: ReadinessGate,
    storage: Arc<MemoryStorage>,
    fragment_cache: FragmentCacheConfig,
    interval: Duration,
    last: Option<Fingerprint>,
}

impl DevWatcher {
    pub fn new(
        paths: ArtifactPaths,
        gate: ReadinessGate,
        storage: Arc<MemoryStorage>,
        fragment_cache: FragmentCacheConfig,
        interval: Duration,
    ) -> Self {
        Self {
            paths,
            gate,
            storage,
            fragment_cache,
            interval,
            last: None,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        info!(
            target = SOURCE,
            output_dir = %self.paths.output_dir.display(),
            interval_ms = self.interval.as_millis() as u64,
            "watching build output"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.poll().await;
        }
    }

    /// Check the artifacts once and reload them if they changed.
    pub async fn poll(&mut self) -> PollOutcome {
        let Some(current) = fingerprint(&self.paths).await else {
            debug!(target = SOURCE, "build output incomplete");
            return PollOutcome::Idle;
        };
        if self.last.as_ref() == Some(&current) {
            return PollOutcome::Idle;
        }
        self.last = Some(current);

        match self.reload().await {
            Ok(generation) => PollOutcome::Published(generation),
            Err(err) => {
                error!(
                    target = SOURCE,
                    error = %err,
                    ready = self.gate.is_ready(),
                    "rebuild failed, keeping previous version"
                );
                PollOutcome::Failed
            }
        }
    }

    async fn reload(&self) -> Result<u64, AppError> {
        let build = load_build(&self.paths).await?;
        mirror_assets(
            &self.paths.output_dir,
            &build.bundle.manifest,
            self.storage.as_ref(),
        )
        .await?;
        let renderer = build.into_renderer(self.fragment_cache)?;

        let storage: Arc<dyn StorageBackend> = self.storage.clone();
        let version = self.gate.publish(Arc::new(renderer), storage);
        Ok(version.generation)
    }
}

/// Copy every manifest asset from the build output into storage,
/// overwriting older copies. Snapshots are left alone.
async fn mirror_assets(
    output_dir: &Path,
    manifest: &ClientManifest,
    storage: &dyn StorageBackend,
) -> Result<usize, AppError> {
    for file in &manifest.all {
        let data = read_artifact(&output_dir.join(file)).await?;
        storage.create_dir_all(parent_dir(file)).await?;
        storage.write(file, data.into()).await?;
    }
    debug!(target = SOURCE, assets = manifest.all.len(), "mirrored client assets");
    Ok(manifest.all.len())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tempfile::TempDir;

    use super::*;
    use crate::domain::{CLIENT_MANIFEST_FILE, SERVER_BUNDLE_FILE};

    const TEMPLATE: &str = "<html><body><!--ssr-outlet--></body></html>";

    fn write_build(dir: &Path, body: &str) {
        let server = format!(
            r#"{{ "entry": "app", "components": {{ "app": {{ "template": "<p>{body}</p>" }} }} }}"#
        );
        std::fs::write(dir.join(SERVER_BUNDLE_FILE), server).expect("server");
        std::fs::write(
            dir.join(CLIENT_MANIFEST_FILE),
            r#"{ "publicPath": "/", "all": ["app.js", "css/app.css"], "initial": ["app.js"], "async": [] }"#,
        )
        .expect("manifest");
        std::fs::create_dir_all(dir.join("css")).expect("css dir");
        std::fs::write(dir.join("app.js"), format!("// {body}")).expect("js");
        std::fs::write(dir.join("css/app.css"), "p{}").expect("css");
        std::fs::write(dir.join("index.template.html"), TEMPLATE).expect("template");
    }

    fn watcher(dir: &Path, gate: &ReadinessGate, storage: &Arc<MemoryStorage>) -> DevWatcher {
        DevWatcher::new(
            ArtifactPaths::new(dir, dir.join("index.template.html")),
            gate.clone(),
            Arc::clone(storage),
            FragmentCacheConfig::default(),
            Duration::from_millis(10),
        )
    }

    #[tokio::test]
    async fn publishes_on_first_build_and_mirrors_assets() {
        let dir = TempDir::new().expect("tempdir");
        let gate = ReadinessGate::pending();
        let storage = Arc::new(MemoryStorage::new());
        let mut watcher = watcher(dir.path(), &gate, &storage);

        assert_eq!(watcher.poll().await, PollOutcome::Idle);
        assert!(!gate.is_ready());

        write_build(dir.path(), "one");
        assert_eq!(watcher.poll().await, PollOutcome::Published(1));
        assert!(gate.is_ready());
        assert!(storage.exists("app.js").await.expect("exists"));
        assert!(storage.exists("css/app.css").await.expect("exists"));

        assert_eq!(watcher.poll().await, PollOutcome::Idle);
    }

    #[tokio::test]
    async fn failed_rebuild_keeps_previous_version_and_snapshots() {
        let dir = TempDir::new().expect("tempdir");
        let gate = ReadinessGate::pending();
        let storage = Arc::new(MemoryStorage::new());
        let mut watcher = watcher(dir.path(), &gate, &storage);

        write_build(dir.path(), "one");
        assert_eq!(watcher.poll().await, PollOutcome::Published(1));

        storage.create_dir_all("static").await.expect("mkdir");
        storage
            .write("static/home.html", Bytes::from_static(b"<p>one</p>"))
            .await
            .expect("snapshot");

        std::fs::write(dir.path().join(SERVER_BUNDLE_FILE), "{ broken").expect("corrupt");
        assert_eq!(watcher.poll().await, PollOutcome::Failed);
        assert_eq!(gate.current().expect("still ready").generation, 1);

        write_build(dir.path(), "two, longer");
        assert_eq!(watcher.poll().await, PollOutcome::Published(2));
        assert!(storage.exists("static/home.html").await.expect("exists"));
    }
}
