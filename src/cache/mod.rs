//! Render-fragment cache.
//!
//! Memoizes the markup of cacheable bundle components across requests. The
//! cache is bounded by entry count (LRU eviction) and by entry age (checked
//! on access). It is purely an optimization: a miss re-renders the fragment.
//!
//! ```toml
//! [render]
//! fragment_cache_capacity = 1000
//! fragment_cache_ttl_seconds = 900
//! ```

mod config;
mod fragment;
pub(crate) mod lock;

pub use config::FragmentCacheConfig;
pub use fragment::FragmentCache;
