//! Detail cache with LRU eviction and TTL expiry.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use flowmirror_types::Timestamp;
use lru::LruCache;
use tracing::trace;

/// Entry stored in the cache.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    /// Wall-clock write time, compared against upstream `updatedAt`.
    pub written_at: Timestamp,
    /// Monotonic write time, used for TTL expiry.
    pub inserted: Instant,
}

/// Bounded cache of detail payloads.
#[derive(Debug)]
pub struct DetailCache<V> {
    lru: LruCache<String, CacheEntry<V>>,
    ttl: Duration,
}

impl<V: Clone> DetailCache<V> {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            lru: LruCache::new(cap),
            ttl,
        }
    }

    /// Live entry for `key`. Expired entries are dropped on access.
    pub fn get(&mut self, key: &str, now: Instant) -> Option<CacheEntry<V>> {
        let expired = match self.lru.get(key) {
            None => return None,
            Some(entry) => now.saturating_duration_since(entry.inserted) > self.ttl,
        };

        if expired {
            trace!(key, "Cache entry expired");
            self.lru.pop(key);
            return None;
        }
        self.lru.peek(key).cloned()
    }

    pub fn put(&mut self, key: &str, value: V, now: Instant) {
        self.lru.put(
            key.to_string(),
            CacheEntry {
                value,
                written_at: flowmirror_types::now(),
                inserted: now,
            },
        );
    }

    /// Remove `key`, returning whether an entry was present.
    pub fn invalidate(&mut self, key: &str) -> bool {
        self.lru.pop(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lru.is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_expires_after_ttl() {
        let mut cache = DetailCache::new(4, Duration::from_secs(300));
        let t0 = Instant::now();
        cache.put("wf-1", "detail".to_string(), t0);

        assert!(cache.get("wf-1", t0 + Duration::from_secs(299)).is_some());
        assert!(cache.get("wf-1", t0 + Duration::from_secs(301)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lru_eviction() {
        let mut cache = DetailCache::new(2, Duration::from_secs(300));
        let t0 = Instant::now();
        cache.put("a", 1, t0);
        cache.put("b", 2, t0);
        cache.get("a", t0);
        cache.put("c", 3, t0);

        assert!(cache.get("a", t0).is_some());
        assert!(cache.get("b", t0).is_none());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_invalidate() {
        let mut cache = DetailCache::new(2, Duration::from_secs(1));
        cache.put("a", 1, Instant::now());
        assert!(cache.invalidate("a"));
        assert!(!cache.invalidate("a"));
    }
}
