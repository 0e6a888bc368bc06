//! Tunables for the freshness service.

use std::time::Duration;

/// Default window after which the last known execution is considered stale.
pub const DEFAULT_STALENESS_WINDOW: Duration = Duration::from_secs(30 * 60);

/// Default lifetime of a cached detail payload.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Default bound on each of the breaker and cache maps.
pub const DEFAULT_MAX_ENTRIES: usize = 1_000;

/// Default number of consecutive failures that opens a breaker.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Default time an open breaker waits before admitting a trial call.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Configuration for [`FreshnessService`](crate::FreshnessService).
#[derive(Debug, Clone)]
pub struct FreshnessPolicy {
    pub staleness_window: Duration,
    pub cache_ttl: Duration,
    /// Maximum entries per map before LRU eviction.
    pub max_entries: usize,
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            staleness_window: DEFAULT_STALENESS_WINDOW,
            cache_ttl: DEFAULT_CACHE_TTL,
            max_entries: DEFAULT_MAX_ENTRIES,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

impl FreshnessPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_staleness_window(mut self, window: Duration) -> Self {
        self.staleness_window = window;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Set the failure threshold (clamped to at least 1).
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}
