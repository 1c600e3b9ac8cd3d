//! Fragment cache configuration.

use std::{num::NonZeroUsize, time::Duration};

pub(crate) const DEFAULT_FRAGMENT_CACHE_CAPACITY: usize = 1000;
pub(crate) const DEFAULT_FRAGMENT_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentCacheConfig {
    /// Maximum number of memoized fragments.
    pub capacity: usize,
    /// Age after which a fragment is treated as absent.
    pub ttl: Duration,
}

impl Default for FragmentCacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_FRAGMENT_CACHE_CAPACITY,
            ttl: DEFAULT_FRAGMENT_CACHE_TTL,
        }
    }
}

impl From<&crate::config::RenderSettings> for FragmentCacheConfig {
    fn from(settings: &crate::config::RenderSettings) -> Self {
        Self {
            capacity: settings.fragment_cache_capacity.get(),
            ttl: settings.fragment_cache_ttl,
        }
    }
}

impl FragmentCacheConfig {
    /// Returns the capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = FragmentCacheConfig::default();
        assert_eq!(config.capacity, 1000);
        assert_eq!(config.ttl, Duration::from_secs(900));
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = FragmentCacheConfig {
            capacity: 0,
            ..Default::default()
        };
        assert_eq!(config.capacity_non_zero().get(), 1);
    }
}
