//! Error types for freshness operations.

use std::time::Duration;

/// Error type for freshness operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Calls for this key are suppressed until the breaker cools down.
    #[error("Circuit open for {key}, retry in {retry_in:?}")]
    CircuitOpen { key: String, retry_in: Duration },
}

/// Result type for freshness operations.
pub type Result<T> = std::result::Result<T, Error>;
