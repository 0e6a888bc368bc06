//! Resilient HTTP client for the upstream automation-engine API.
//!
//! Each request is retried on transient failures (network errors, timeouts,
//! 5xx, 408, 429) with a linearly growing delay, and every attempt carries its
//! own timeout. List endpoints return the `{ data: [...] }` envelope, decoded
//! item by item into the typed payloads from `flowmirror-types`; items that
//! fail to decode are reported in [`Listing::rejected`].
//!
//! # API Coverage
//!
//! - **Workflows**: list (all cursor pages), get by id
//! - **Executions**: list (with optional full data), get by id

pub mod api;
pub mod client;
pub mod error;
pub mod retry;
pub mod types;

pub use api::{ExecutionsApi, ListExecutionsQuery, WorkflowsApi};
pub use client::{ClientBuilder, MirrorClient};
pub use error::{Error, Result};
pub use retry::{RetryPolicy, with_retry};
pub use types::{ListEnvelope, Listing, RejectedItem};
