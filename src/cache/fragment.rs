//! Bounded, expiring store of rendered component markup.

use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use lru::LruCache;
use metrics::counter;

use super::config::FragmentCacheConfig;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::fragment";

pub(crate) const METRIC_FRAGMENT_HIT: &str = "streamsnap_fragment_cache_hit_total";
pub(crate) const METRIC_FRAGMENT_MISS: &str = "streamsnap_fragment_cache_miss_total";
pub(crate) const METRIC_FRAGMENT_EVICT: &str = "streamsnap_fragment_cache_evict_total";
pub(crate) const METRIC_FRAGMENT_EXPIRED: &str = "streamsnap_fragment_cache_expired_total";

struct Fragment {
    html: Arc<str>,
    stored_at: Instant,
}

/// LRU fragment store with a fixed time-to-live per entry.
///
/// Keys are the serialized render context of a component. Entries are never
/// mutated after insertion; a concurrent re-render of the same key simply
/// replaces the value with identical markup.
pub struct FragmentCache {
    entries: Mutex<LruCache<String, Fragment>>,
    ttl: Duration,
}

impl FragmentCache {
    pub fn new(config: &FragmentCacheConfig) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(config.capacity_non_zero())),
            ttl: config.ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<str>> {
        self.get_at(key, Instant::now())
    }

    pub fn insert(&self, key: String, html: Arc<str>) {
        self.insert_at(key, html, Instant::now());
    }

    fn get_at(&self, key: &str, now: Instant) -> Option<Arc<str>> {
        let mut entries = mutex_lock(&self.entries, SOURCE, "get");

        let expired = match entries.get(key) {
            Some(fragment) if now.saturating_duration_since(fragment.stored_at) < self.ttl => {
                counter!(METRIC_FRAGMENT_HIT).increment(1);
                return Some(Arc::clone(&fragment.html));
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.pop(key);
            counter!(METRIC_FRAGMENT_EXPIRED).increment(1);
        }
        counter!(METRIC_FRAGMENT_MISS).increment(1);
        None
    }

    fn insert_at(&self, key: String, html: Arc<str>, now: Instant) {
        let mut entries = mutex_lock(&self.entries, SOURCE, "insert");
        let fragment = Fragment {
            html,
            stored_at: now,
        };
        if let Some((evicted, _)) = entries.push(key.clone(), fragment)
            && evicted != key
        {
            counter!(METRIC_FRAGMENT_EVICT).increment(1);
        }
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "capacity").cap().get()
    }
}
