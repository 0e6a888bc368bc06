//! Shared types for the flowmirror sync pipeline.
//!
//! Raw upstream payloads are decoded once at ingestion into the typed
//! structures in [`payload`], so downstream code never walks untyped JSON.

mod de;
pub mod payload;
pub mod result;
pub mod status;

pub use payload::{
    ConnectionEdge, ConnectionMap, RawConnectionTarget, RawError, RawExecutionData, RawExecutionPayload,
    RawNode, RawNodeRun, RawResultData, RawTag, RawWorkflowPayload, RawWorkflowSettings,
};
pub use result::{ExtensionCounts, SyncMode, SyncResult, UltraCounts};
pub use status::ExecutionStatus;

/// Timestamp type used across crates.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Current UTC time.
pub fn now() -> Timestamp {
    chrono::Utc::now()
}
