//! Error types for the sync pipeline.

use flowmirror_store::StoreError;
use thiserror::Error;

/// Sync pipeline error type.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Upstream fetch failed after retries. Fatal for the phase that needed it.
    #[error("Fetch failed: {0}")]
    Fetch(#[from] flowmirror_client::Error),

    /// Writing a single entity failed.
    #[error("Failed to persist {entity}: {source}")]
    Persistence {
        entity: String,
        #[source]
        source: StoreError,
    },

    /// A bulk derivation step failed. Fatal for the run.
    #[error("Derivation step '{step}' failed: {source}")]
    Derivation {
        step: &'static str,
        #[source]
        source: StoreError,
    },

    /// Calls for this key are suppressed by its circuit breaker.
    #[error(transparent)]
    CircuitOpen(#[from] flowmirror_freshness::Error),

    #[error("A sync run is already in progress")]
    AlreadyRunning,

    #[error("Configuration error: {0}")]
    Config(String),

    /// Store access outside a single-entity write.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl SyncError {
    pub(crate) fn persistence(entity: impl Into<String>, source: StoreError) -> Self {
        Self::Persistence {
            entity: entity.into(),
            source,
        }
    }

    pub(crate) fn derivation(step: &'static str, source: StoreError) -> Self {
        Self::Derivation { step, source }
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
