//! Freshness decisions for the on-demand detail path.
//!
//! [`FreshnessService`] owns two bounded LRU maps, one of per-key circuit
//! breaker states and one of cached detail payloads. It is created once per
//! process and shared behind an `Arc`; state is in-memory only and resets on
//! restart.
//!
//! # Example
//!
//! ```rust,ignore
//! use flowmirror_freshness::{FreshnessPolicy, FreshnessService, FreshnessInput};
//!
//! let service: FreshnessService<String> = FreshnessService::new(FreshnessPolicy::default());
//! let decision = service.should_refresh("wf-1", &FreshnessInput::default());
//! assert!(decision.is_refresh());
//! ```

mod breaker;
mod cache;
mod config;
mod error;
mod service;

pub use breaker::{BreakerState, CircuitBreakers};
pub use cache::{CacheEntry, DetailCache};
pub use config::FreshnessPolicy;
pub use error::{Error, Result};
pub use service::{FreshnessInput, FreshnessService, RefreshDecision, RefreshReason};
