//! Client error types.

use std::time::Duration;

use thiserror::Error;

/// Client error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport-level failure (connect, reset, TLS, ...).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A single attempt exceeded its timeout and was aborted.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Response body could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Upstream returned a non-2xx response.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Every attempt failed with a retryable error.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<Error>,
    },
}

impl Error {
    /// Whether a fresh attempt might succeed.
    ///
    /// Network failures, timeouts, 5xx, 408 and 429 are transient; other
    /// 4xx responses mean the request itself is wrong.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => !e.is_builder() && !e.is_decode(),
            Error::Timeout(_) => true,
            Error::Api { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            Error::InvalidUrl(_) | Error::Json(_) | Error::Config(_) | Error::Exhausted { .. } => {
                false
            }
        }
    }

    /// HTTP status of the final failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::Exhausted { last, .. } => last.status(),
            _ => None,
        }
    }

    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Check if this is an authentication error.
    pub fn is_auth_error(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16) -> Error {
        Error::Api {
            status,
            message: String::new(),
        }
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(api(500).is_retryable());
        assert!(api(503).is_retryable());
        assert!(api(429).is_retryable());
        assert!(api(408).is_retryable());
        assert!(!api(400).is_retryable());
        assert!(!api(401).is_retryable());
        assert!(!api(404).is_retryable());
        assert!(Error::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!Error::Config("x".into()).is_retryable());
    }

    #[test]
    fn test_status_sees_through_exhausted() {
        let err = Error::Exhausted {
            attempts: 3,
            last: Box::new(api(404)),
        };
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
    }
}
