//! Workflows API.

use flowmirror_types::RawWorkflowPayload;
use serde_json::Value;

use crate::client::MirrorClient;
use crate::error::Result;
use crate::types::Listing;

/// Workflows API client.
pub struct WorkflowsApi {
    client: MirrorClient,
}

impl WorkflowsApi {
    pub(crate) fn new(client: MirrorClient) -> Self {
        Self { client }
    }

    /// List every workflow, following cursor pages.
    pub async fn list(&self) -> Result<Listing<RawWorkflowPayload>> {
        let values: Vec<Value> = self.client.fetch_all_pages("workflows", &[]).await?;
        Ok(Listing::decode("workflow", values, RawWorkflowPayload::from_value))
    }

    /// Get a workflow by ID.
    pub async fn get(&self, id: &str) -> Result<RawWorkflowPayload> {
        let value: Value = self
            .client
            .fetch_one(&format!("workflows/{}", id), &[])
            .await?;
        Ok(RawWorkflowPayload::from_value(value)?)
    }
}
