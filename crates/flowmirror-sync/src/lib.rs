//! Synchronization and enrichment pipeline for flowmirror.
//!
//! Pulls workflows and executions from the upstream API, writes them
//! idempotently into the [`MirrorStore`](flowmirror_store::MirrorStore),
//! and derives statistics from stored data only.
//!
//! # Components
//!
//! - [`upsert`]: change detection and upsert-by-key
//! - [`enrich`]: bulk-or-per-item execution enrichment
//! - [`derive`]: set-based derivation over stored rows
//! - [`extensions`]: enhanced and ultra deepening passes
//! - [`orchestrator`]: one full sync run
//! - [`detail`]: on-demand detail reads behind the freshness policy
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use flowmirror_sync::{SyncOptions, SyncOrchestrator};
//!
//! let orchestrator = SyncOrchestrator::new(client, Arc::new(store));
//! let result = orchestrator.run(&SyncOptions::default()).await?;
//! println!("{} workflows synced", result.workflows_synced);
//! ```

pub mod classify;
pub mod derive;
pub mod detail;
pub mod enrich;
pub mod error;
pub mod extensions;
pub mod orchestrator;
pub mod structure;
pub mod upsert;

pub use classify::{ClassificationRule, DEFAULT_RULES, NodeCategory, NodeClassifier};
pub use derive::{DerivationReport, Deriver, StepReport};
pub use detail::{DetailService, RefreshOutcome, WorkflowDetail};
pub use enrich::{DetailedStep, EnrichedExecution, Enricher, EnrichmentOutcome, EnrichmentStrategy};
pub use error::{Result, SyncError};
pub use extensions::{ExtensionReport, ExtensionRunner};
pub use orchestrator::{SyncOptions, SyncOrchestrator};
pub use upsert::{UpsertOutcome, Upserter};
