//! Change detection and idempotent upserts.
//!
//! Stored rows are compared cheaply first (timestamps, status) and only then
//! by their canonical raw payload. Unchanged entities are never rewritten.

use std::sync::Arc;

use flowmirror_store::{
    ExecutionFingerprint, ExecutionRecord, MirrorStore, WorkflowFingerprint, WorkflowRecord,
};
use flowmirror_types::RawWorkflowPayload;
use tracing::debug;

use crate::enrich::EnrichedExecution;
use crate::error::{Result, SyncError};

/// Result of one upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// The entity was processed (written or confirmed unchanged).
    pub synced: bool,
    /// A write replaced an existing row.
    pub updated: bool,
}

impl UpsertOutcome {
    const UNCHANGED: Self = Self {
        synced: true,
        updated: false,
    };
}

/// Whether a stored workflow differs from the incoming record.
pub fn workflow_changed(stored: &WorkflowFingerprint, incoming: &WorkflowRecord) -> bool {
    let newer = match (incoming.updated_at, stored.updated_at) {
        (Some(remote), Some(local)) => remote > local,
        (Some(_), None) => true,
        _ => false,
    };
    newer || stored.raw_data != incoming.raw_data
}

/// Whether a stored execution differs from the incoming record.
///
/// A basic payload never replaces a detailed one while status and
/// `stoppedAt` are unchanged.
pub fn execution_changed(stored: &ExecutionFingerprint, incoming: &ExecutionRecord) -> bool {
    let state_moved = stored.remote_status != incoming.remote_status
        || stored.stopped_at != incoming.stopped_at;
    if state_moved {
        return true;
    }
    if stored.has_detailed_data && !incoming.has_detailed_data {
        return false;
    }
    stored.raw_data != incoming.raw_data
}

/// Writes entities through the change detector.
#[derive(Debug, Clone)]
pub struct Upserter {
    store: Arc<MirrorStore>,
}

impl Upserter {
    pub fn new(store: Arc<MirrorStore>) -> Self {
        Self { store }
    }

    pub fn upsert_workflow(&self, payload: &RawWorkflowPayload, force: bool) -> Result<UpsertOutcome> {
        let entity = format!("workflow {}", payload.id);
        let record = WorkflowRecord::from_payload(payload);

        let stored = self
            .store
            .workflow_fingerprint(&record.id)
            .map_err(|e| SyncError::persistence(&entity, e))?;
        if let Some(fp) = &stored
            && !force
            && !workflow_changed(fp, &record)
        {
            debug!(workflow_id = %record.id, "Workflow unchanged");
            return Ok(UpsertOutcome::UNCHANGED);
        }

        let existed = self
            .store
            .upsert_workflow(&record)
            .map_err(|e| SyncError::persistence(&entity, e))?;
        Ok(UpsertOutcome {
            synced: true,
            updated: existed,
        })
    }

    pub fn upsert_execution(&self, execution: &EnrichedExecution, force: bool) -> Result<UpsertOutcome> {
        let entity = format!("execution {}", execution.payload.id);
        let record = execution.to_record();

        let stored = self
            .store
            .execution_fingerprint(&record.id)
            .map_err(|e| SyncError::persistence(&entity, e))?;
        if let Some(fp) = &stored
            && !force
            && !execution_changed(fp, &record)
        {
            debug!(execution_id = %record.id, "Execution unchanged");
            return Ok(UpsertOutcome::UNCHANGED);
        }

        let existed = self
            .store
            .upsert_execution(&record)
            .map_err(|e| SyncError::persistence(&entity, e))?;
        Ok(UpsertOutcome {
            synced: true,
            updated: existed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowmirror_types::RawExecutionPayload;
    use serde_json::{Value, json};

    fn wf(value: Value) -> RawWorkflowPayload {
        RawWorkflowPayload::from_value(value).unwrap()
    }

    fn exec(value: Value) -> EnrichedExecution {
        EnrichedExecution::from_payload(RawExecutionPayload::from_value(value).unwrap())
    }

    fn upserter() -> Upserter {
        Upserter::new(Arc::new(MirrorStore::open_in_memory().unwrap()))
    }

    #[test]
    fn test_insert_then_noop() {
        let up = upserter();
        let payload = wf(json!({"id": "wf-1", "name": "A", "updatedAt": 1000}));

        let first = up.upsert_workflow(&payload, false).unwrap();
        assert_eq!(first, UpsertOutcome { synced: true, updated: false });

        let second = up.upsert_workflow(&payload, false).unwrap();
        assert_eq!(second, UpsertOutcome::UNCHANGED);
    }

    #[test]
    fn test_newer_updated_at_rewrites() {
        let up = upserter();
        up.upsert_workflow(&wf(json!({"id": "wf-1", "updatedAt": 1000})), false)
            .unwrap();
        let outcome = up
            .upsert_workflow(&wf(json!({"id": "wf-1", "updatedAt": 2000})), false)
            .unwrap();
        assert!(outcome.updated);
    }

    #[test]
    fn test_same_timestamp_different_payload_rewrites() {
        let up = upserter();
        up.upsert_workflow(&wf(json!({"id": "wf-1", "updatedAt": 1000, "name": "A"})), false)
            .unwrap();
        let outcome = up
            .upsert_workflow(&wf(json!({"id": "wf-1", "updatedAt": 1000, "name": "B"})), false)
            .unwrap();
        assert!(outcome.updated);
    }

    #[test]
    fn test_force_rewrites_unchanged() {
        let up = upserter();
        let payload = wf(json!({"id": "wf-1"}));
        up.upsert_workflow(&payload, false).unwrap();
        assert!(up.upsert_workflow(&payload, true).unwrap().updated);
    }

    #[test]
    fn test_basic_does_not_downgrade_detailed() {
        let up = upserter();
        let detailed = exec(json!({
            "id": "1", "workflowId": "wf", "status": "success", "stoppedAt": 500,
            "data": {"resultData": {"runData": {}}}
        }));
        up.upsert_execution(&detailed, false).unwrap();

        let basic = exec(json!({"id": "1", "workflowId": "wf", "status": "success", "stoppedAt": 500}));
        assert_eq!(up.upsert_execution(&basic, false).unwrap(), UpsertOutcome::UNCHANGED);

        let moved = exec(json!({"id": "1", "workflowId": "wf", "status": "error", "stoppedAt": 900}));
        assert!(up.upsert_execution(&moved, false).unwrap().updated);
    }

    #[test]
    fn test_empty_id_is_persistence_error() {
        let up = upserter();
        let err = up.upsert_execution(&exec(json!({"workflowId": "wf"})), false).unwrap_err();
        assert!(matches!(err, SyncError::Persistence { .. }));
    }
}
