//! Common test utilities for pipeline integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use flowmirror_client::{MirrorClient, RetryPolicy};
use flowmirror_store::MirrorStore;
use flowmirror_sync::SyncOptions;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A fake upstream plus an in-memory store.
pub struct TestUpstream {
    pub server: MockServer,
    pub store: Arc<MirrorStore>,
}

impl TestUpstream {
    pub async fn start() -> anyhow::Result<Self> {
        Ok(Self {
            server: MockServer::start().await,
            store: Arc::new(MirrorStore::open_in_memory()?),
        })
    }

    /// Client for the mock server; single attempt, short timeout.
    pub fn client(&self) -> anyhow::Result<MirrorClient> {
        Ok(MirrorClient::builder()
            .base_url(format!("{}/api/v1", self.server.uri()))
            .api_key("test-key")
            .timeout(Duration::from_secs(2))
            .retry(RetryPolicy::no_retry())
            .build()?)
    }

    /// Respond to `GET <route>` with a `{ data: [...] }` envelope.
    pub async fn mount_list(&self, route: &str, items: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/api/v1/{route}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": items })))
            .mount(&self.server)
            .await;
    }

    /// Respond to `GET <route>` with a bare JSON document.
    pub async fn mount_one(&self, route: &str, body: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/api/v1/{route}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Respond to `GET <route>` with an error status.
    pub async fn mount_status(&self, route: &str, status: u16) {
        Mock::given(method("GET"))
            .and(path(format!("/api/v1/{route}")))
            .respond_with(ResponseTemplate::new(status).set_body_string("upstream failure"))
            .mount(&self.server)
            .await;
    }
}

/// Options that keep tests fast: one attempt, no batch pauses.
pub fn fast_options() -> SyncOptions {
    SyncOptions {
        max_retries: 1,
        retry_delay: Duration::from_millis(1),
        batch_delay: Duration::ZERO,
        ..SyncOptions::default()
    }
}

/// RFC 3339 timestamp for `at`, at millisecond precision.
pub fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Webhook → HTTP → AI agent → Postgres → Wait.
pub fn five_node_workflow(id: &str) -> Value {
    json!({
        "id": id,
        "name": "Lead intake",
        "active": true,
        "versionId": "v-1",
        "updatedAt": "2024-05-01T09:00:00.000Z",
        "tags": [{"id": "t1", "name": "sales"}],
        "nodes": [
            {"id": "n1", "name": "Hook", "type": "n8n-nodes-base.webhook", "notes": "show-1",
             "parameters": {"path": "leads", "httpMethod": "POST"}},
            {"id": "n2", "name": "Enrich", "type": "n8n-nodes-base.httpRequest", "notes": "show-2"},
            {"id": "n3", "name": "Score", "type": "@n8n/n8n-nodes-langchain.agent"},
            {"id": "n4", "name": "Save", "type": "n8n-nodes-base.postgres"},
            {"id": "n5", "name": "Pause", "type": "n8n-nodes-base.wait"}
        ],
        "connections": {
            "Hook": {"main": [[{"node": "Enrich", "type": "main", "index": 0}]]},
            "Enrich": {"main": [[{"node": "Score", "type": "main", "index": 0}]]},
            "Score": {"main": [[{"node": "Save", "type": "main", "index": 0}]]},
            "Save": {"main": [[{"node": "Pause", "type": "main", "index": 0}]]}
        }
    })
}

/// Webhook → HTTP → HTTP → OpenAI → Code.
pub fn order_sync_workflow(id: &str) -> Value {
    json!({
        "id": id,
        "name": "Order sync",
        "active": true,
        "updatedAt": "2024-05-02T09:00:00.000Z",
        "nodes": [
            {"id": "n1", "name": "Order hook", "type": "n8n-nodes-base.webhook"},
            {"id": "n2", "name": "Fetch order", "type": "n8n-nodes-base.httpRequest"},
            {"id": "n3", "name": "Fetch customer", "type": "n8n-nodes-base.httpRequest"},
            {"id": "n4", "name": "Summarize", "type": "@n8n/n8n-nodes-langchain.openAi"},
            {"id": "n5", "name": "Shape", "type": "n8n-nodes-base.code"}
        ],
        "connections": {
            "Order hook": {"main": [[{"node": "Fetch order", "type": "main", "index": 0}]]},
            "Fetch order": {"main": [[{"node": "Fetch customer", "type": "main", "index": 0}]]},
            "Fetch customer": {"main": [[{"node": "Summarize", "type": "main", "index": 0}]]},
            "Summarize": {"main": [[{"node": "Shape", "type": "main", "index": 0}]]}
        }
    })
}

/// A detailed execution lasting `duration_ms`, started `minutes_ago`.
pub fn detailed_execution(id: &str, workflow_id: &str, minutes_ago: i64, duration_ms: i64, failed: bool) -> Value {
    let mut result_data = json!({
        "lastNodeExecuted": "Save",
        "runData": {
            "Hook": [{"startTime": 1, "executionTime": 2,
                      "data": {"main": [[{"json": {"email": format!("lead{id}@example.com")}}]]}}],
            "Save": [{"startTime": 5, "executionTime": 8, "data": {"main": [[{"json": {"ok": true}}]]}}]
        }
    });
    if failed {
        result_data["error"] = json!({"message": "Postgres unavailable"});
    }
    let started = Utc::now() - chrono::Duration::minutes(minutes_ago);
    let stopped = started + chrono::Duration::milliseconds(duration_ms);
    json!({
        "id": id,
        "workflowId": workflow_id,
        "finished": !failed,
        "mode": "webhook",
        "status": if failed { "error" } else { "success" },
        "startedAt": ts(started),
        "stoppedAt": ts(stopped),
        "data": {"resultData": result_data}
    })
}

/// The same execution without `data`.
pub fn basic(mut execution: Value) -> Value {
    if let Some(obj) = execution.as_object_mut() {
        obj.remove("data");
    }
    execution
}
