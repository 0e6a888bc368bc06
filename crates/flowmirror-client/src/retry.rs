//! Retry with growing backoff.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Default number of attempts per request.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay between attempts.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// How many times to try a request and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Always at least 1.
    pub max_attempts: u32,
    /// Delay before attempt `n + 1` is `base_delay * n`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// A policy that tries exactly once.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Pause after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Run `f` until it succeeds, fails with a non-retryable error, or the
/// policy runs out of attempts.
///
/// No delay follows the final attempt. When all attempts fail with retryable
/// errors the last one is wrapped in [`Error::Exhausted`].
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, label: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        match f().await {
            Ok(value) => {
                debug!(request = label, attempt, "Request succeeded");
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => {
                warn!(request = label, attempt, error = %e, "Request failed, not retrying");
                return Err(e);
            }
            Err(e) => {
                warn!(
                    request = label,
                    attempt,
                    max_attempts,
                    error = %e,
                    "Request attempt failed"
                );
                last_error = Some(e);
                if attempt < max_attempts {
                    tokio::time::sleep(policy.delay_after(attempt)).await;
                }
            }
        }
    }

    Err(Error::Exhausted {
        attempts: max_attempts,
        last: Box::new(
            last_error.unwrap_or_else(|| Error::Config("no attempts were made".to_string())),
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[test]
    fn test_delay_grows_linearly() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100));
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(3), Duration::from_millis(300));
    }

    #[test]
    fn test_zero_attempts_clamped() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast(3), "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::Timeout(Duration::from_millis(1)))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&fast(3), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Api {
                status: 503,
                message: "unavailable".into(),
            })
        })
        .await;

        assert!(matches!(result, Err(Error::Exhausted { attempts: 3, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&fast(5), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Api {
                status: 400,
                message: "bad request".into(),
            })
        })
        .await;

        assert!(matches!(result, Err(Error::Api { status: 400, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
