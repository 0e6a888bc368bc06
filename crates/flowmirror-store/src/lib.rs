//! Local relational mirror of upstream workflows and executions.
//!
//! A single SQLite database holds the mirrored rows, the node metadata table,
//! the extension tables and the sync-run audit log. Schema changes are
//! embedded refinery migrations applied on open.
//!
//! Writes are idempotent upserts keyed by the upstream id. Derived columns
//! are only written by the set-based derivation statements in
//! [`MirrorStore`], so re-running them over unchanged data is a no-op.

pub mod error;
pub mod rows;
pub mod store;

pub use error::{Result, StoreError};
pub use rows::{
    AnalysisRow, DevelopmentRow, EdgeRow, ExecutionFingerprint, ExecutionRecord,
    ExecutionSummary, NodeRow, SettingsRow, StoredPayload, TagRow, TriggerRow, WorkflowFingerprint,
    WorkflowRecord, WorkflowStructure, WorkflowSummary, from_millis, to_millis,
};
pub use store::MirrorStore;
