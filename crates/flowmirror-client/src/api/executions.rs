//! Executions API.

use flowmirror_types::RawExecutionPayload;
use serde_json::Value;

use crate::client::MirrorClient;
use crate::error::Result;
use crate::types::Listing;

/// Query parameters for listing executions.
#[derive(Debug, Default, Clone)]
pub struct ListExecutionsQuery {
    /// Maximum number of executions to return.
    pub limit: Option<u32>,
    /// Ask the upstream to embed full run data in each item.
    pub include_data: bool,
    /// Filter by owning workflow.
    pub workflow_id: Option<String>,
    /// Filter by upstream status.
    pub status: Option<String>,
}

impl ListExecutionsQuery {
    pub(crate) fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        if self.include_data {
            pairs.push(("includeData", "true".to_string()));
        }
        if let Some(id) = &self.workflow_id {
            pairs.push(("workflowId", id.clone()));
        }
        if let Some(status) = &self.status {
            pairs.push(("status", status.clone()));
        }
        pairs
    }
}

/// Executions API client.
pub struct ExecutionsApi {
    client: MirrorClient,
}

impl ExecutionsApi {
    pub(crate) fn new(client: MirrorClient) -> Self {
        Self { client }
    }

    /// List executions (single page, capped by `limit`).
    pub async fn list(&self, query: &ListExecutionsQuery) -> Result<Listing<RawExecutionPayload>> {
        let values: Vec<Value> = self
            .client
            .fetch_list("executions", &query.to_pairs())
            .await?;
        Ok(Listing::decode("execution", values, RawExecutionPayload::from_value))
    }

    /// Get one execution, optionally with its full run data.
    pub async fn get(&self, id: &str, include_data: bool) -> Result<RawExecutionPayload> {
        let query = if include_data {
            vec![("includeData", "true".to_string())]
        } else {
            Vec::new()
        };
        let value: Value = self
            .client
            .fetch_one(&format!("executions/{}", id), &query)
            .await?;
        Ok(RawExecutionPayload::from_value(value)?)
    }
}
