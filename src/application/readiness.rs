//! Readiness gate holding the active application version.
//!
//! The gate is a single-slot cell: publishers replace the slot, readers take
//! a snapshot of it at request start. Until the first publish every reader
//! waits.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::application::{render::BundleRenderer, storage::StorageBackend};

const SOURCE: &str = "application::readiness";

/// One published build: the renderer and the storage handle it came with.
///
/// Held behind one `Arc` so readers never see a renderer paired with
/// another build's storage.
pub struct ActiveVersion {
    pub generation: u64,
    pub renderer: Arc<BundleRenderer>,
    pub storage: Arc<dyn StorageBackend>,
}

impl std::fmt::Debug for ActiveVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveVersion")
            .field("generation", &self.generation)
            .field("renderer", &self.renderer)
            .field("storage", &self.storage.kind())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ReadinessGate {
    slot: Arc<watch::Sender<Option<Arc<ActiveVersion>>>>,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::pending()
    }
}

impl ReadinessGate {
    pub fn pending() -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            slot: Arc::new(slot),
        }
    }

    /// A gate that is ready from the start, as used in production.
    pub fn ready(renderer: Arc<BundleRenderer>, storage: Arc<dyn StorageBackend>) -> Self {
        let gate = Self::pending();
        gate.publish(renderer, storage);
        gate
    }

    /// Make a new version current and release every waiter.
    ///
    /// Renders already running keep the version they started with. The
    /// generation is derived and swapped under the slot's lock, so concurrent
    /// publishers always get distinct, increasing generations.
    pub fn publish(
        &self,
        renderer: Arc<BundleRenderer>,
        storage: Arc<dyn StorageBackend>,
    ) -> Arc<ActiveVersion> {
        let mut published = None;
        self.slot.send_modify(|slot| {
            let generation = slot.as_ref().map_or(1, |current| current.generation + 1);
            let version = Arc::new(ActiveVersion {
                generation,
                renderer,
                storage,
            });
            let previous = slot.replace(Arc::clone(&version));
            published = Some((version, previous.is_none()));
        });
        let Some((version, first)) = published else {
            unreachable!("send_modify runs its closure exactly once");
        };

        info!(
            target = SOURCE,
            generation = version.generation,
            storage = version.storage.kind().as_str(),
            first,
            "published application version"
        );
        version
    }

    pub fn current(&self) -> Option<Arc<ActiveVersion>> {
        self.slot.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Wait until a version exists and return the latest one.
    ///
    /// Never resolves if nothing is ever published.
    pub async fn await_ready(&self) -> Arc<ActiveVersion> {
        let mut receiver = self.slot.subscribe();
        loop {
            if let Some(version) = receiver.borrow_and_update().clone() {
                return version;
            }
            if receiver.changed().await.is_err() {
                // Sender gone without a version: stay pending.
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, time::Duration};

    use super::*;
    use crate::{
        application::render::{RendererOptions, create_renderer},
        cache::FragmentCacheConfig,
        domain::{Bundle, ClientManifest, PageTemplate},
        infra::storage::MemoryStorage,
    };

    fn renderer() -> Arc<BundleRenderer> {
        let server = serde_json::from_str(
            r#"{ "entry": "app", "components": { "app": { "template": "<p>ok</p>" } } }"#,
        )
        .expect("server bundle");
        let options = RendererOptions {
            template: PageTemplate::parse("<body><!--ssr-outlet--></body>").expect("shell"),
            fragment_cache: FragmentCacheConfig::default(),
        };
        Arc::new(
            create_renderer(Bundle::new(server, ClientManifest::default()), &options)
                .expect("renderer"),
        )
    }

    #[tokio::test]
    async fn pending_gate_blocks_until_publish() {
        let gate = ReadinessGate::pending();
        assert!(!gate.is_ready());

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let gate = gate.clone();
                tokio::spawn(async move { gate.await_ready().await.generation })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(waiters.iter().all(|waiter| !waiter.is_finished()));

        gate.publish(renderer(), Arc::new(MemoryStorage::new()));
        for waiter in waiters {
            assert_eq!(waiter.await.expect("join"), 1);
        }
    }

    #[tokio::test]
    async fn ready_gate_returns_latest_version_immediately() {
        let gate = ReadinessGate::ready(renderer(), Arc::new(MemoryStorage::new()));
        let first = gate.await_ready().await;
        assert_eq!(first.generation, 1);

        gate.publish(renderer(), Arc::new(MemoryStorage::new()));
        let second = gate.await_ready().await;
        assert_eq!(second.generation, 2);
        // Holders of the previous version keep it.
        assert_eq!(first.generation, 1);
        assert!(!Arc::ptr_eq(&first.renderer, &second.renderer));
    }

    #[test]
    fn concurrent_publishers_get_distinct_generations() {
        const PUBLISHERS: u64 = 16;
        let gate = ReadinessGate::pending();

        let generations: HashSet<u64> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..PUBLISHERS)
                .map(|_| {
                    let gate = gate.clone();
                    scope.spawn(move || {
                        gate.publish(renderer(), Arc::new(MemoryStorage::new()))
                            .generation
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("publisher thread"))
                .collect()
        });

        assert_eq!(generations, (1..=PUBLISHERS).collect::<HashSet<_>>());
        let current = gate.current().expect("published");
        assert_eq!(current.generation, PUBLISHERS);
    }

    #[tokio::test]
    async fn never_published_gate_never_resolves() {
        let gate = ReadinessGate::pending();
        let waited =
            tokio::time::timeout(Duration::from_millis(20), gate.await_ready()).await;
        assert!(waited.is_err());
        assert!(gate.current().is_none());
    }
}
