//! Per-key circuit breaker.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use tracing::{debug, warn};

/// Breaker state for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls flow normally.
    Closed,
    /// Calls are suppressed until the cooldown elapses.
    Open,
    /// One trial call is in flight; everything else is suppressed until it
    /// reports back or a cooldown passes without a verdict.
    HalfOpen,
}

#[derive(Debug, Clone)]
struct BreakerEntry {
    failures: u32,
    last_failure: Instant,
    trial_started: Option<Instant>,
    state: BreakerState,
}

impl BreakerEntry {
    /// Open with an elapsed cooldown, or half-open with an abandoned trial.
    fn admits_trial(&self, now: Instant, cooldown: Duration) -> bool {
        match self.state {
            BreakerState::Closed => true,
            BreakerState::Open => now.saturating_duration_since(self.last_failure) >= cooldown,
            BreakerState::HalfOpen => self
                .trial_started
                .is_none_or(|at| now.saturating_duration_since(at) >= cooldown),
        }
    }
}

/// Bounded map of breaker states.
///
/// Entries are created lazily on the first failure and removed on success,
/// so a key with no entry is closed.
#[derive(Debug)]
pub struct CircuitBreakers {
    entries: LruCache<String, BreakerEntry>,
    threshold: u32,
    cooldown: Duration,
}

impl CircuitBreakers {
    pub fn new(max_entries: usize, threshold: u32, cooldown: Duration) -> Self {
        let cap = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(cap),
            threshold: threshold.max(1),
            cooldown,
        }
    }

    /// Ask to make a call for `key`.
    ///
    /// An open breaker whose cooldown has elapsed moves to half-open and
    /// admits exactly this one call. A trial that has not reported back
    /// within a cooldown is treated as abandoned and replaced.
    pub fn allow(&mut self, key: &str, now: Instant) -> bool {
        let cooldown = self.cooldown;
        let Some(entry) = self.entries.get_mut(key) else {
            return true;
        };

        if entry.state == BreakerState::Closed {
            return true;
        }
        if !entry.admits_trial(now, cooldown) {
            return false;
        }
        if entry.state == BreakerState::HalfOpen {
            warn!(key, "Trial call never reported back, admitting a new one");
        } else {
            debug!(key, "Circuit half-open, admitting trial call");
        }
        entry.state = BreakerState::HalfOpen;
        entry.trial_started = Some(now);
        true
    }

    /// A call for `key` succeeded: forget its failure history.
    pub fn record_success(&mut self, key: &str) {
        if self.entries.pop(key).is_some() {
            debug!(key, "Circuit closed");
        }
    }

    /// A call for `key` failed.
    pub fn record_failure(&mut self, key: &str, now: Instant) {
        let threshold = self.threshold;
        let entry = self.entries.get_or_insert_mut(key.to_string(), || BreakerEntry {
            failures: 0,
            last_failure: now,
            trial_started: None,
            state: BreakerState::Closed,
        });

        entry.failures = entry.failures.saturating_add(1);
        entry.last_failure = now;
        entry.trial_started = None;

        let reopen = entry.state == BreakerState::HalfOpen;
        if reopen || entry.failures >= threshold {
            if entry.state != BreakerState::Open {
                warn!(key, failures = entry.failures, "Circuit opened");
            }
            entry.state = BreakerState::Open;
        }
    }

    /// Settle a trial call that ended without a verdict on upstream health.
    ///
    /// The breaker goes back to open and the cooldown restarts, but the
    /// failure count is left alone.
    pub fn release(&mut self, key: &str, now: Instant) {
        if let Some(entry) = self.entries.get_mut(key)
            && entry.state == BreakerState::HalfOpen
        {
            entry.state = BreakerState::Open;
            entry.last_failure = now;
            entry.trial_started = None;
            debug!(key, "Trial call released, circuit open again");
        }
    }

    /// Current state without side effects.
    pub fn state(&self, key: &str) -> BreakerState {
        self.entries
            .peek(key)
            .map(|e| e.state)
            .unwrap_or(BreakerState::Closed)
    }

    /// Whether a call for `key` would currently be refused.
    pub fn is_suppressed(&self, key: &str, now: Instant) -> bool {
        match self.entries.peek(key) {
            None => false,
            Some(entry) => !entry.admits_trial(now, self.cooldown),
        }
    }

    /// Time left before an open breaker admits a trial call.
    pub fn retry_in(&self, key: &str, now: Instant) -> Duration {
        self.entries
            .peek(key)
            .filter(|e| e.state == BreakerState::Open)
            .map(|e| {
                self.cooldown
                    .saturating_sub(now.saturating_duration_since(e.last_failure))
            })
            .unwrap_or(Duration::ZERO)
    }

    pub fn failures(&self, key: &str) -> u32 {
        self.entries.peek(key).map(|e| e.failures).unwrap_or(0)
    }

    /// Drop all state for `key`.
    pub fn reset(&mut self, key: &str) {
        self.entries.pop(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const COOLDOWN: Duration = Duration::from_secs(60);

    fn breakers(threshold: u32) -> CircuitBreakers {
        CircuitBreakers::new(16, threshold, COOLDOWN)
    }

    #[test]
    fn test_opens_after_threshold() {
        let mut b = breakers(3);
        let t0 = Instant::now();

        b.record_failure("wf", t0);
        b.record_failure("wf", t0);
        assert_eq!(b.state("wf"), BreakerState::Closed);
        assert!(b.allow("wf", t0));

        b.record_failure("wf", t0);
        assert_eq!(b.state("wf"), BreakerState::Open);
        assert!(!b.allow("wf", t0 + Duration::from_secs(1)));
        assert!(b.is_suppressed("wf", t0));
    }

    #[test]
    fn test_half_open_admits_single_trial() {
        let mut b = breakers(1);
        let t0 = Instant::now();
        b.record_failure("wf", t0);

        let later = t0 + COOLDOWN;
        assert!(!b.is_suppressed("wf", later));
        assert!(b.allow("wf", later));
        assert_eq!(b.state("wf"), BreakerState::HalfOpen);
        assert!(!b.allow("wf", later));
        assert!(b.is_suppressed("wf", later));
    }

    #[test]
    fn test_trial_success_closes() {
        let mut b = breakers(1);
        let t0 = Instant::now();
        b.record_failure("wf", t0);
        assert!(b.allow("wf", t0 + COOLDOWN));

        b.record_success("wf");
        assert_eq!(b.state("wf"), BreakerState::Closed);
        assert!(b.is_empty());
    }

    #[test]
    fn test_trial_failure_reopens_and_restarts_cooldown() {
        let mut b = breakers(5);
        let t0 = Instant::now();
        for _ in 0..5 {
            b.record_failure("wf", t0);
        }
        let trial = t0 + COOLDOWN;
        assert!(b.allow("wf", trial));

        b.record_failure("wf", trial);
        assert_eq!(b.state("wf"), BreakerState::Open);
        assert!(!b.allow("wf", trial + Duration::from_secs(30)));
        assert_eq!(b.retry_in("wf", trial + Duration::from_secs(30)), Duration::from_secs(30));
        assert!(b.allow("wf", trial + COOLDOWN));
    }

    #[test]
    fn test_keys_are_independent_and_bounded() {
        let mut b = CircuitBreakers::new(2, 1, COOLDOWN);
        let t0 = Instant::now();
        b.record_failure("a", t0);
        b.record_failure("b", t0);
        b.record_failure("c", t0);

        assert_eq!(b.len(), 2);
        assert_eq!(b.state("a"), BreakerState::Closed);
        assert_eq!(b.state("c"), BreakerState::Open);
    }

    #[test]
    fn test_release_reopens_without_counting() {
        let mut b = breakers(1);
        let t0 = Instant::now();
        b.record_failure("wf", t0);
        let trial = t0 + COOLDOWN;
        assert!(b.allow("wf", trial));

        b.release("wf", trial);
        assert_eq!(b.state("wf"), BreakerState::Open);
        assert_eq!(b.failures("wf"), 1);
        assert!(b.is_suppressed("wf", trial + Duration::from_secs(1)));
        assert!(b.allow("wf", trial + COOLDOWN));
    }

    #[test]
    fn test_release_ignores_closed_and_unknown_keys() {
        let mut b = breakers(3);
        let t0 = Instant::now();
        b.release("missing", t0);
        assert!(b.is_empty());

        b.record_failure("wf", t0);
        b.release("wf", t0);
        assert_eq!(b.state("wf"), BreakerState::Closed);
    }

    #[test]
    fn test_abandoned_trial_is_replaced_after_cooldown() {
        let mut b = breakers(1);
        let t0 = Instant::now();
        b.record_failure("wf", t0);
        let trial = t0 + COOLDOWN;
        assert!(b.allow("wf", trial));

        assert!(b.is_suppressed("wf", trial + Duration::from_secs(30)));
        assert!(!b.allow("wf", trial + Duration::from_secs(30)));

        let later = trial + COOLDOWN;
        assert!(!b.is_suppressed("wf", later));
        assert!(b.allow("wf", later));
        assert_eq!(b.state("wf"), BreakerState::HalfOpen);
        assert!(!b.allow("wf", later));
    }

    proptest! {
        #[test]
        fn prop_breaker_opens_exactly_at_threshold(threshold in 1u32..10, failures in 0u32..20) {
            let mut b = breakers(threshold);
            let t0 = Instant::now();
            for _ in 0..failures {
                b.record_failure("k", t0);
            }
            let open = failures >= threshold;
            prop_assert_eq!(b.state("k") == BreakerState::Open, open);
            prop_assert_eq!(b.allow("k", t0), !open);
        }

        #[test]
        fn prop_at_most_one_trial_per_cooldown(extra_calls in 1usize..10) {
            let mut b = breakers(1);
            let t0 = Instant::now();
            b.record_failure("k", t0);
            let later = t0 + COOLDOWN;
            let admitted = (0..=extra_calls).filter(|_| b.allow("k", later)).count();
            prop_assert_eq!(admitted, 1);
        }
    }
}
