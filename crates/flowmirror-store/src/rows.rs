//! Row types written to and read from the store.

use chrono::DateTime;
use flowmirror_types::{ExecutionStatus, RawExecutionPayload, RawWorkflowPayload, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Convert a timestamp into the epoch-millisecond column representation.
pub fn to_millis(ts: Option<Timestamp>) -> Option<i64> {
    ts.map(|t| t.timestamp_millis())
}

/// Convert an epoch-millisecond column back into a timestamp.
pub fn from_millis(ms: Option<i64>) -> Option<Timestamp> {
    ms.and_then(DateTime::from_timestamp_millis)
}

fn field_json(raw: &Value, key: &str, fallback: &str) -> String {
    match raw.get(key) {
        Some(Value::Null) | None => fallback.to_string(),
        Some(v) => v.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Write models
// ─────────────────────────────────────────────────────────────────────────────

/// Upstream-owned workflow columns.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowRecord {
    pub id: String,
    pub name: String,
    pub active: bool,
    pub nodes: String,
    pub connections: String,
    pub settings: Option<String>,
    pub tags: String,
    pub version_id: Option<String>,
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
    pub raw_data: String,
}

impl WorkflowRecord {
    pub fn from_payload(payload: &RawWorkflowPayload) -> Self {
        let raw = &payload.raw;
        let settings = match raw.get("settings") {
            Some(Value::Null) | None => None,
            Some(v) => Some(v.to_string()),
        };
        Self {
            id: payload.id.clone(),
            name: payload.name.clone(),
            active: payload.active,
            nodes: field_json(raw, "nodes", "[]"),
            connections: field_json(raw, "connections", "{}"),
            settings,
            tags: field_json(raw, "tags", "[]"),
            version_id: payload.version_id.clone(),
            created_at: to_millis(payload.created_at),
            updated_at: to_millis(payload.updated_at),
            raw_data: payload.canonical_json(),
        }
    }
}

/// Upstream-owned execution columns plus enrichment output.
///
/// `status` is `None` when the upstream status maps to unknown; the
/// derivation engine fills it in from the other columns.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRecord {
    pub id: String,
    pub workflow_id: String,
    pub status: Option<ExecutionStatus>,
    pub remote_status: Option<String>,
    pub mode: Option<String>,
    pub started_at: Option<i64>,
    pub stopped_at: Option<i64>,
    pub wait_till: Option<i64>,
    pub finished: bool,
    pub retry_of: Option<String>,
    pub raw_data: String,
    pub raw_error: Option<String>,
    pub has_detailed_data: bool,
    pub detailed_steps: Option<String>,
    pub business_context: Option<String>,
    pub last_node_executed: Option<String>,
}

impl ExecutionRecord {
    /// Build the record from a payload. Enrichment columns start empty.
    pub fn from_payload(payload: &RawExecutionPayload) -> Self {
        let status = match ExecutionStatus::from_upstream(payload.status.as_deref()) {
            ExecutionStatus::Unknown => None,
            known => Some(known),
        };
        Self {
            id: payload.id.clone(),
            workflow_id: payload.workflow_id.clone(),
            status,
            remote_status: payload.status.clone(),
            mode: payload.mode.clone(),
            started_at: to_millis(payload.started_at),
            stopped_at: to_millis(payload.stopped_at),
            wait_till: to_millis(payload.wait_till),
            finished: payload.finished,
            retry_of: payload.retry_of.clone(),
            raw_data: payload.canonical_json(),
            raw_error: payload.error_message(),
            has_detailed_data: payload.has_detailed_data(),
            detailed_steps: None,
            business_context: None,
            last_node_executed: payload.last_node_executed().map(String::from),
        }
    }
}

/// Structural metrics computed from a workflow's node list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowStructure {
    pub workflow_id: String,
    pub node_count: i64,
    pub connection_count: i64,
    pub trigger_count: i64,
    pub ai_node_count: i64,
    pub database_node_count: i64,
    pub http_node_count: i64,
    pub webhook_node_count: i64,
    pub unique_node_types: i64,
    pub has_manual_trigger: bool,
    pub has_wait_node: bool,
    pub has_error_handler: bool,
    pub complexity_score: f64,
    pub nodes: Vec<NodeRow>,
}

/// One row of the node metadata table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRow {
    pub node_id: String,
    pub name: String,
    pub node_type: String,
    pub category: Option<String>,
    pub show_order: Option<i64>,
    pub notes: Option<String>,
    pub disabled: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Change fingerprints
// ─────────────────────────────────────────────────────────────────────────────

/// What the change detector needs to know about a stored workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowFingerprint {
    pub updated_at: Option<i64>,
    pub raw_data: String,
}

/// What the change detector needs to know about a stored execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionFingerprint {
    pub remote_status: Option<String>,
    pub stopped_at: Option<i64>,
    pub has_detailed_data: bool,
    pub raw_data: String,
}

/// A stored raw payload, re-read by derivation and extension passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPayload {
    pub id: String,
    pub raw_data: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Extension rows
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRow {
    pub tag_id: String,
    pub tag_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsRow {
    pub timezone: Option<String>,
    pub error_workflow: Option<String>,
    pub save_data_on_error: Option<String>,
    pub save_data_on_success: Option<String>,
    pub execution_timeout: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRow {
    pub source_node: String,
    pub target_node: String,
    pub connection_type: String,
    pub output_index: i64,
    pub input_index: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerRow {
    pub node_id: String,
    pub trigger_type: String,
    pub webhook_path: Option<String>,
    pub http_method: Option<String>,
    pub schedule: Option<String>,
}

/// Development artefacts left in a workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DevelopmentRow {
    pub has_pinned_data: bool,
    pub has_static_data: bool,
    pub disabled_nodes: i64,
}

/// Graph shape of a workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRow {
    pub entry_nodes: Vec<String>,
    pub terminal_nodes: Vec<String>,
    pub orphan_nodes: Vec<String>,
    pub max_depth: i64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Read models
// ─────────────────────────────────────────────────────────────────────────────

/// A workflow with its derived statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
    pub active: bool,
    pub version_id: Option<String>,
    pub updated_at: Option<Timestamp>,
    pub synced_at: Option<Timestamp>,

    pub node_count: i64,
    pub connection_count: i64,
    pub trigger_count: i64,
    pub ai_node_count: i64,
    pub database_node_count: i64,
    pub http_node_count: i64,
    pub webhook_node_count: i64,
    pub unique_node_types: i64,
    pub has_manual_trigger: bool,
    pub has_wait_node: bool,
    pub has_error_handler: bool,
    pub complexity_score: f64,
    pub complexity_level: Option<String>,

    pub execution_count: i64,
    pub success_count: i64,
    pub failure_count: i64,
    /// Percentage of executions that succeeded, 0-100.
    pub success_rate: Option<f64>,
    pub avg_duration_ms: Option<f64>,
    pub min_duration_ms: Option<i64>,
    pub max_duration_ms: Option<i64>,
    pub last_execution_at: Option<Timestamp>,
    pub last_success_at: Option<Timestamp>,
    pub last_failure_at: Option<Timestamp>,

    pub timezone: Option<String>,
    pub error_workflow: Option<String>,
    pub tag_names: Option<String>,
}

/// An execution as served to readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub id: String,
    pub workflow_id: String,
    pub status: Option<String>,
    pub mode: Option<String>,
    pub started_at: Option<Timestamp>,
    pub stopped_at: Option<Timestamp>,
    pub duration_ms: Option<i64>,
    pub finished: bool,
    pub has_detailed_data: bool,
    pub error_message: Option<String>,
    pub last_node_executed: Option<String>,
    pub detailed_steps: Option<Value>,
    pub business_context: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_workflow_record_keeps_raw_sections() {
        let payload = RawWorkflowPayload::from_value(json!({
            "id": "wf-1",
            "name": "Intake",
            "active": true,
            "nodes": [{"id": "n1", "name": "Start", "type": "n8n-nodes-base.manualTrigger"}],
            "connections": {},
            "settings": {"timezone": "UTC"},
            "updatedAt": "2024-01-01T00:00:00Z"
        }))
        .unwrap();

        let record = WorkflowRecord::from_payload(&payload);
        assert_eq!(record.id, "wf-1");
        assert!(record.nodes.contains("manualTrigger"));
        assert_eq!(record.settings.as_deref(), Some(r#"{"timezone":"UTC"}"#));
        assert_eq!(record.tags, "[]");
        assert_eq!(record.updated_at, Some(1_704_067_200_000));
    }

    #[test]
    fn test_unknown_status_left_for_derivation() {
        let payload = RawExecutionPayload::from_value(json!({
            "id": "1",
            "workflowId": "wf-1",
            "finished": true,
            "status": "something-new"
        }))
        .unwrap();

        let record = ExecutionRecord::from_payload(&payload);
        assert_eq!(record.status, None);
        assert_eq!(record.remote_status.as_deref(), Some("something-new"));
        assert!(!record.has_detailed_data);
    }

    #[test]
    fn test_millis_round_trip() {
        let ts = DateTime::from_timestamp_millis(1_700_000_000_123);
        assert_eq!(from_millis(to_millis(ts)), ts);
        assert_eq!(from_millis(None), None);
    }
}
