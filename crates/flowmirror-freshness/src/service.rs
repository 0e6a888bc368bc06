//! The freshness service: refresh decisions over the breaker and cache maps.

use std::time::Instant;

use chrono::Duration as ChronoDuration;
use flowmirror_types::Timestamp;
use parking_lot::Mutex;
use tracing::debug;

use crate::breaker::{BreakerState, CircuitBreakers};
use crate::cache::{CacheEntry, DetailCache};
use crate::config::FreshnessPolicy;
use crate::error::{Error, Result};

/// What the caller knows about the locally stored entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FreshnessInput {
    /// Start time of the most recent stored execution.
    pub last_execution_at: Option<Timestamp>,
    /// Upstream `updatedAt` of the entity, if known.
    pub remote_updated_at: Option<Timestamp>,
}

/// Why a refresh is warranted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    NotCached,
    StaleExecutions,
    RemoteUpdated,
}

/// Outcome of [`FreshnessService::should_refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshDecision {
    Refresh(RefreshReason),
    /// The cached copy can be served.
    Fresh,
    /// A refresh would be warranted but the breaker is open.
    Suppressed,
}

impl RefreshDecision {
    pub fn is_refresh(&self) -> bool {
        matches!(self, Self::Refresh(_))
    }
}

/// Process-wide freshness state, shared behind an `Arc`.
#[derive(Debug)]
pub struct FreshnessService<V> {
    policy: FreshnessPolicy,
    breakers: Mutex<CircuitBreakers>,
    cache: Mutex<DetailCache<V>>,
}

impl<V: Clone> FreshnessService<V> {
    pub fn new(policy: FreshnessPolicy) -> Self {
        let breakers = CircuitBreakers::new(
            policy.max_entries,
            policy.failure_threshold,
            policy.cooldown,
        );
        let cache = DetailCache::new(policy.max_entries, policy.cache_ttl);
        Self {
            policy,
            breakers: Mutex::new(breakers),
            cache: Mutex::new(cache),
        }
    }

    pub fn policy(&self) -> &FreshnessPolicy {
        &self.policy
    }

    /// Decide whether `key` needs an upstream refresh.
    ///
    /// A missing last execution does not count as stale. An open breaker
    /// suppresses the refresh whatever the other inputs say.
    pub fn should_refresh(&self, key: &str, input: &FreshnessInput) -> RefreshDecision {
        self.should_refresh_at(key, input, Instant::now(), flowmirror_types::now())
    }

    fn should_refresh_at(
        &self,
        key: &str,
        input: &FreshnessInput,
        now: Instant,
        wall_now: Timestamp,
    ) -> RefreshDecision {
        if self.breakers.lock().is_suppressed(key, now) {
            debug!(key, "Refresh suppressed by open circuit");
            return RefreshDecision::Suppressed;
        }

        let Some(entry) = self.cache.lock().get(key, now) else {
            return RefreshDecision::Refresh(RefreshReason::NotCached);
        };

        let window = ChronoDuration::from_std(self.policy.staleness_window)
            .unwrap_or(ChronoDuration::MAX);
        if let Some(last) = input.last_execution_at
            && wall_now.signed_duration_since(last) > window
        {
            return RefreshDecision::Refresh(RefreshReason::StaleExecutions);
        }

        if let Some(remote) = input.remote_updated_at
            && remote > entry.written_at
        {
            return RefreshDecision::Refresh(RefreshReason::RemoteUpdated);
        }

        RefreshDecision::Fresh
    }

    // ── Breaker ─────────────────────────────────────────────────────

    /// Ask permission for an upstream call for `key`.
    pub fn allow(&self, key: &str) -> Result<()> {
        let now = Instant::now();
        let mut breakers = self.breakers.lock();
        if breakers.allow(key, now) {
            Ok(())
        } else {
            Err(Error::CircuitOpen {
                key: key.to_string(),
                retry_in: breakers.retry_in(key, now),
            })
        }
    }

    pub fn record_success(&self, key: &str) {
        self.breakers.lock().record_success(key);
    }

    pub fn record_failure(&self, key: &str) {
        self.breakers.lock().record_failure(key, Instant::now());
    }

    /// The admitted call for `key` ended without saying anything about
    /// upstream health (a local error). Reopens a half-open breaker.
    pub fn release(&self, key: &str) {
        self.breakers.lock().release(key, Instant::now());
    }

    pub fn breaker_state(&self, key: &str) -> BreakerState {
        self.breakers.lock().state(key)
    }

    // ── Cache ───────────────────────────────────────────────────────

    pub fn cached(&self, key: &str) -> Option<CacheEntry<V>> {
        self.cache.lock().get(key, Instant::now())
    }

    pub fn store(&self, key: &str, value: V) {
        self.cache.lock().put(key, value, Instant::now());
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.cache.lock().invalidate(key)
    }

    /// Clear both the cache entry and the breaker state for `key`.
    pub fn reset(&self, key: &str) {
        self.cache.lock().invalidate(key);
        self.breakers.lock().reset(key);
        debug!(key, "Freshness state reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn service() -> FreshnessService<String> {
        FreshnessService::new(
            FreshnessPolicy::default()
                .with_staleness_window(Duration::from_secs(30 * 60))
                .with_failure_threshold(2)
                .with_cooldown(Duration::from_secs(60)),
        )
    }

    #[test]
    fn test_uncached_key_needs_refresh() {
        let svc = service();
        assert_eq!(
            svc.should_refresh("wf-1", &FreshnessInput::default()),
            RefreshDecision::Refresh(RefreshReason::NotCached)
        );
    }

    #[test]
    fn test_cached_and_recent_is_fresh() {
        let svc = service();
        svc.store("wf-1", "detail".into());
        let input = FreshnessInput {
            last_execution_at: Some(flowmirror_types::now() - ChronoDuration::minutes(5)),
            remote_updated_at: None,
        };
        assert_eq!(svc.should_refresh("wf-1", &input), RefreshDecision::Fresh);
    }

    #[test]
    fn test_missing_last_execution_is_not_stale() {
        let svc = service();
        svc.store("wf-1", "detail".into());
        assert_eq!(
            svc.should_refresh("wf-1", &FreshnessInput::default()),
            RefreshDecision::Fresh
        );
    }

    #[test]
    fn test_stale_executions_trigger_refresh() {
        let svc = service();
        svc.store("wf-1", "detail".into());
        let input = FreshnessInput {
            last_execution_at: Some(flowmirror_types::now() - ChronoDuration::hours(2)),
            remote_updated_at: None,
        };
        assert_eq!(
            svc.should_refresh("wf-1", &input),
            RefreshDecision::Refresh(RefreshReason::StaleExecutions)
        );
    }

    #[test]
    fn test_remote_update_after_cache_write() {
        let svc = service();
        svc.store("wf-1", "detail".into());
        let input = FreshnessInput {
            last_execution_at: None,
            remote_updated_at: Some(flowmirror_types::now() + ChronoDuration::seconds(10)),
        };
        assert_eq!(
            svc.should_refresh("wf-1", &input),
            RefreshDecision::Refresh(RefreshReason::RemoteUpdated)
        );
    }

    #[test]
    fn test_open_breaker_suppresses_refresh() {
        let svc = service();
        svc.record_failure("wf-1");
        assert!(svc.allow("wf-1").is_ok());
        svc.record_failure("wf-1");

        assert_eq!(
            svc.should_refresh("wf-1", &FreshnessInput::default()),
            RefreshDecision::Suppressed
        );
        assert!(matches!(svc.allow("wf-1"), Err(Error::CircuitOpen { .. })));
        assert_eq!(svc.breaker_state("wf-1"), BreakerState::Open);
    }

    #[test]
    fn test_cooldown_moves_to_half_open() {
        let svc = service();
        svc.record_failure("wf-1");
        svc.record_failure("wf-1");
        let after = Instant::now() + Duration::from_secs(61);
        let decision =
            svc.should_refresh_at("wf-1", &FreshnessInput::default(), after, flowmirror_types::now());
        assert_eq!(decision, RefreshDecision::Refresh(RefreshReason::NotCached));
    }

    #[test]
    fn test_reset_clears_everything() {
        let svc = service();
        svc.store("wf-1", "detail".into());
        svc.record_failure("wf-1");
        svc.record_failure("wf-1");

        svc.reset("wf-1");
        assert!(svc.cached("wf-1").is_none());
        assert_eq!(svc.breaker_state("wf-1"), BreakerState::Closed);
        assert!(svc.allow("wf-1").is_ok());
    }
}
