//! Typed views over raw upstream payloads.
//!
//! Each payload keeps the original JSON in `raw` so change detection can
//! compare the exact upstream document, while derivation code reads the
//! typed fields.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::Timestamp;
use crate::de::{id_string, lenient_datetime, null_as_default, null_as_false, opt_id_string};

// ─────────────────────────────────────────────────────────────────────────────
// Workflows
// ─────────────────────────────────────────────────────────────────────────────

/// Connection graph: source node name → connection type (`main`,
/// `ai_languageModel`, ...) → output index → targets.
pub type ConnectionMap = BTreeMap<String, BTreeMap<String, Vec<Option<Vec<RawConnectionTarget>>>>>;

/// A workflow as returned by `GET /workflows`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawWorkflowPayload {
    #[serde(default, deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_false")]
    pub active: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub nodes: Vec<RawNode>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub connections: ConnectionMap,
    #[serde(default)]
    pub settings: Option<RawWorkflowSettings>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<RawTag>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub version_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub created_at: Option<Timestamp>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub updated_at: Option<Timestamp>,
    #[serde(default)]
    pub pin_data: Option<Value>,
    #[serde(default)]
    pub static_data: Option<Value>,

    /// The untouched upstream document.
    #[serde(skip)]
    pub raw: Value,
}

impl RawWorkflowPayload {
    /// Decode a workflow, keeping the original document alongside.
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        let mut payload: Self = serde_json::from_value(value.clone())?;
        payload.raw = value;
        Ok(payload)
    }

    /// Stable serialization of the raw payload used for change detection.
    pub fn canonical_json(&self) -> String {
        self.raw.to_string()
    }

    /// Total number of connection targets across all outputs.
    pub fn connection_count(&self) -> usize {
        self.edges().count()
    }

    /// Iterate over every edge in the connection graph.
    pub fn edges(&self) -> impl Iterator<Item = ConnectionEdge<'_>> {
        self.connections.iter().flat_map(|(source, by_type)| {
            by_type.iter().flat_map(move |(kind, outputs)| {
                outputs
                    .iter()
                    .enumerate()
                    .filter_map(|(idx, targets)| targets.as_ref().map(|t| (idx, t)))
                    .flat_map(move |(output_index, targets)| {
                        targets.iter().map(move |target| ConnectionEdge {
                            source: source.as_str(),
                            kind: kind.as_str(),
                            output_index,
                            target: target.node.as_str(),
                            input_index: target.index,
                        })
                    })
            })
        })
    }

    /// True when the workflow carries pinned test data.
    pub fn has_pinned_data(&self) -> bool {
        match &self.pin_data {
            Some(Value::Object(map)) => !map.is_empty(),
            Some(Value::Null) | None => false,
            Some(_) => true,
        }
    }

    /// True when the workflow carries non-empty static data.
    pub fn has_static_data(&self) -> bool {
        match &self.static_data {
            Some(Value::Object(map)) => !map.is_empty(),
            Some(Value::Null) | None => false,
            Some(_) => true,
        }
    }
}

/// One edge of the connection graph, borrowed from the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionEdge<'a> {
    pub source: &'a str,
    pub kind: &'a str,
    pub output_index: usize,
    pub target: &'a str,
    pub input_index: i64,
}

/// A single node in the workflow graph.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNode {
    #[serde(default, deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub node_type: String,
    #[serde(default)]
    pub type_version: Option<f64>,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "null_as_false")]
    pub disabled: bool,
    #[serde(default)]
    pub webhook_id: Option<String>,
}

impl RawNode {
    /// Node key used for the node table; older payloads lack ids, so fall
    /// back to the (unique within a workflow) node name.
    pub fn key(&self) -> &str {
        if self.id.is_empty() { &self.name } else { &self.id }
    }

    /// String parameter lookup.
    pub fn parameter_str(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).and_then(Value::as_str)
    }
}

/// Target of a connection.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConnectionTarget {
    #[serde(default, deserialize_with = "null_as_default")]
    pub node: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub index: i64,
}

/// Workflow-level settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawWorkflowSettings {
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub error_workflow: Option<String>,
    #[serde(default)]
    pub save_data_error_execution: Option<String>,
    #[serde(default)]
    pub save_data_success_execution: Option<String>,
    #[serde(default)]
    pub execution_timeout: Option<i64>,
}

/// A workflow tag.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTag {
    #[serde(default, deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Executions
// ─────────────────────────────────────────────────────────────────────────────

/// An execution as returned by `GET /executions` (optionally with data).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawExecutionPayload {
    #[serde(default, deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_false")]
    pub finished: bool,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub retry_of: Option<String>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub started_at: Option<Timestamp>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub stopped_at: Option<Timestamp>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub wait_till: Option<Timestamp>,
    #[serde(default, deserialize_with = "id_string")]
    pub workflow_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub data: Option<RawExecutionData>,

    /// The untouched upstream document.
    #[serde(skip)]
    pub raw: Value,
}

impl RawExecutionPayload {
    /// Decode an execution, keeping the original document alongside.
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        let mut payload: Self = serde_json::from_value(value.clone())?;
        payload.raw = value;
        Ok(payload)
    }

    /// Stable serialization of the raw payload used for change detection.
    pub fn canonical_json(&self) -> String {
        self.raw.to_string()
    }

    /// Whether the payload includes the step-by-step result data.
    pub fn has_detailed_data(&self) -> bool {
        self.result_data().is_some()
    }

    /// Result data, if present.
    pub fn result_data(&self) -> Option<&RawResultData> {
        self.data.as_ref().and_then(|d| d.result_data.as_ref())
    }

    /// Top-level error message. An error object without any message still
    /// counts as an error.
    pub fn error_message(&self) -> Option<String> {
        self.result_data()
            .and_then(|r| r.error.as_ref())
            .map(RawError::summary)
    }

    /// Name of the last node the engine executed.
    pub fn last_node_executed(&self) -> Option<&str> {
        self.result_data()
            .and_then(|r| r.last_node_executed.as_deref())
    }
}

/// The `data` block of a detailed execution.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawExecutionData {
    #[serde(default)]
    pub result_data: Option<RawResultData>,
}

/// Per-node run results.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawResultData {
    #[serde(default, deserialize_with = "null_as_default")]
    pub run_data: BTreeMap<String, Vec<RawNodeRun>>,
    #[serde(default)]
    pub error: Option<RawError>,
    #[serde(default)]
    pub last_node_executed: Option<String>,
}

/// One run of one node.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNodeRun {
    #[serde(default)]
    pub start_time: Option<i64>,
    #[serde(default)]
    pub execution_time: Option<i64>,
    #[serde(default)]
    pub execution_status: Option<String>,
    #[serde(default)]
    pub error: Option<RawError>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl RawNodeRun {
    /// JSON items emitted on the first `main` output.
    pub fn output_items(&self) -> Vec<&Value> {
        self.data
            .as_ref()
            .and_then(|d| d.get("main"))
            .and_then(Value::as_array)
            .and_then(|outputs| outputs.first())
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(|item| item.get("json")).collect())
            .unwrap_or_default()
    }
}

/// Error structure attached to an execution or a node run.
#[derive(Debug, Clone, Deserialize)]
pub struct RawError {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl RawError {
    /// Best available human-readable message.
    pub fn summary(&self) -> String {
        self.message
            .as_deref()
            .or(self.description.as_deref())
            .or(self.name.as_deref())
            .filter(|s| !s.is_empty())
            .unwrap_or("Unknown error")
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_workflow_decodes_and_keeps_raw() {
        let value = json!({
            "id": "wf-1",
            "name": "Lead intake",
            "active": true,
            "nodes": [
                {"id": "n1", "name": "Webhook", "type": "n8n-nodes-base.webhook", "parameters": {"path": "lead"}},
                {"id": "n2", "name": "HTTP", "type": "n8n-nodes-base.httpRequest"}
            ],
            "connections": {
                "Webhook": {"main": [[{"node": "HTTP", "type": "main", "index": 0}]]}
            },
            "updatedAt": "2024-05-01T10:00:00.000Z",
            "somethingNew": 42
        });

        let wf = RawWorkflowPayload::from_value(value.clone()).unwrap();
        assert_eq!(wf.id, "wf-1");
        assert_eq!(wf.nodes.len(), 2);
        assert_eq!(wf.nodes[0].parameter_str("path"), Some("lead"));
        assert_eq!(wf.connection_count(), 1);
        assert_eq!(wf.raw, value);
        assert!(wf.updated_at.is_some());
    }

    #[test]
    fn test_null_fields_decode_as_empty() {
        let wf = RawWorkflowPayload::from_value(json!({
            "id": "wf-2",
            "name": null,
            "nodes": null,
            "connections": null,
            "tags": null
        }))
        .unwrap();
        assert_eq!(wf.name, "");
        assert!(wf.nodes.is_empty());
        assert_eq!(wf.connection_count(), 0);
        assert!(wf.tags.is_empty());
    }

    #[test]
    fn test_numeric_ids_and_null_outputs() {
        let wf = RawWorkflowPayload::from_value(json!({
            "id": 17,
            "nodes": [],
            "connections": {"A": {"main": [null, [{"node": "B", "index": 0}, {"node": "C", "index": 1}]]}}
        }))
        .unwrap();

        assert_eq!(wf.id, "17");
        let edges: Vec<_> = wf.edges().collect();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].output_index, 1);
        assert_eq!(edges[1].target, "C");
        assert_eq!(edges[1].input_index, 1);
    }

    #[test]
    fn test_bad_timestamp_is_none() {
        let wf = RawWorkflowPayload::from_value(json!({"id": "x", "updatedAt": "yesterday"})).unwrap();
        assert!(wf.updated_at.is_none());
    }

    #[test]
    fn test_execution_detail_and_error() {
        let exec = RawExecutionPayload::from_value(json!({
            "id": "100",
            "finished": false,
            "workflowId": "wf-1",
            "startedAt": "2024-05-01T10:00:00.000Z",
            "stoppedAt": "2024-05-01T10:00:00.250Z",
            "data": {"resultData": {
                "runData": {"HTTP": [{"startTime": 1714557600000_i64, "executionTime": 200}]},
                "error": {"message": "Request failed with status code 500"},
                "lastNodeExecuted": "HTTP"
            }}
        }))
        .unwrap();

        assert!(exec.has_detailed_data());
        assert_eq!(
            exec.error_message().as_deref(),
            Some("Request failed with status code 500")
        );
        assert_eq!(exec.last_node_executed(), Some("HTTP"));
    }

    #[test]
    fn test_error_without_message_still_counts() {
        let exec = RawExecutionPayload::from_value(json!({
            "id": "1",
            "data": {"resultData": {"runData": {}, "error": {}}}
        }))
        .unwrap();
        assert_eq!(exec.error_message().as_deref(), Some("Unknown error"));
    }

    #[test]
    fn test_summary_execution_has_no_detail() {
        let exec = RawExecutionPayload::from_value(json!({"id": "2", "finished": true})).unwrap();
        assert!(!exec.has_detailed_data());
        assert!(exec.error_message().is_none());
    }

    #[test]
    fn test_output_items() {
        let run: RawNodeRun = serde_json::from_value(json!({
            "startTime": 1,
            "data": {"main": [[{"json": {"email": "a@b.c"}}, {"json": {"email": "d@e.f"}}]]}
        }))
        .unwrap();
        let items = run.output_items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["email"], "a@b.c");
    }
}
