//! On-demand workflow detail with freshness-aware refresh.
//!
//! Reads are served from the cache or the store. When the freshness policy
//! asks for a refresh and the workflow's breaker admits the call, a scoped
//! single-workflow sync runs first. Upstream failures only feed the breaker;
//! the caller still gets whatever is stored locally.

use std::sync::Arc;

use flowmirror_client::{ListExecutionsQuery, MirrorClient};
use flowmirror_freshness::{FreshnessInput, FreshnessService, RefreshDecision};
use flowmirror_store::{ExecutionSummary, MirrorStore, NodeRow, WorkflowSummary};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classify::NodeClassifier;
use crate::derive::Deriver;
use crate::enrich::Enricher;
use crate::error::{Result, SyncError};
use crate::orchestrator::DEFAULT_EXECUTION_LIMIT;
use crate::upsert::Upserter;

/// A workflow with its node rows and latest executions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDetail {
    pub workflow: WorkflowSummary,
    pub nodes: Vec<NodeRow>,
    pub recent_executions: Vec<ExecutionSummary>,
}

/// Result of an explicit refresh.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    /// Upstream data was obtained and stored.
    pub fresh: bool,
    /// Stored detail after the attempt, if the workflow is known at all.
    pub detail: Option<WorkflowDetail>,
    pub warnings: Vec<String>,
}

/// Serves workflow detail reads for one upstream and one store.
#[derive(Debug, Clone)]
pub struct DetailService {
    client: MirrorClient,
    store: Arc<MirrorStore>,
    freshness: Arc<FreshnessService<WorkflowDetail>>,
    classifier: NodeClassifier,
    execution_limit: u32,
}

impl DetailService {
    pub fn new(
        client: MirrorClient,
        store: Arc<MirrorStore>,
        freshness: Arc<FreshnessService<WorkflowDetail>>,
    ) -> Self {
        Self {
            client,
            store,
            freshness,
            classifier: NodeClassifier::default(),
            execution_limit: DEFAULT_EXECUTION_LIMIT,
        }
    }

    pub fn with_execution_limit(mut self, limit: u32) -> Self {
        self.execution_limit = limit.max(1);
        self
    }

    pub fn with_classifier(mut self, classifier: NodeClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn freshness(&self) -> &Arc<FreshnessService<WorkflowDetail>> {
        &self.freshness
    }

    /// Detail for `id`, refreshed from upstream first when warranted.
    ///
    /// `Ok(None)` means the workflow is neither stored nor fetchable.
    pub async fn workflow_detail(&self, id: &str) -> Result<Option<WorkflowDetail>> {
        let stored = self.store.get_workflow(id)?;
        let input = FreshnessInput {
            last_execution_at: stored.as_ref().and_then(|w| w.last_execution_at),
            remote_updated_at: stored.as_ref().and_then(|w| w.updated_at),
        };

        match self.freshness.should_refresh(id, &input) {
            RefreshDecision::Fresh => {
                if let Some(entry) = self.freshness.cached(id) {
                    debug!(workflow_id = id, "Serving cached detail");
                    return Ok(Some(entry.value));
                }
                self.load_local(id)
            }
            RefreshDecision::Suppressed => {
                debug!(workflow_id = id, "Breaker open, serving stored detail");
                self.load_local(id)
            }
            RefreshDecision::Refresh(reason) => {
                if let Err(e) = self.freshness.allow(id) {
                    debug!(workflow_id = id, error = %e, "Refresh not admitted");
                    return self.load_local(id);
                }
                debug!(workflow_id = id, ?reason, "Refreshing workflow detail");
                let (_, detail, _) = self.refresh_scoped(id).await?;
                Ok(detail)
            }
        }
    }

    /// Drop cached state for `id` and resync it from upstream.
    pub async fn force_refresh(&self, id: &str) -> Result<RefreshOutcome> {
        self.freshness.reset(id);
        info!(workflow_id = id, "Forced refresh");
        let (fresh, detail, warnings) = self.refresh_scoped(id).await?;
        Ok(RefreshOutcome {
            fresh,
            detail,
            warnings,
        })
    }

    /// Scoped sync plus breaker and cache bookkeeping.
    async fn refresh_scoped(&self, id: &str) -> Result<(bool, Option<WorkflowDetail>, Vec<String>)> {
        match self.sync_one(id).await {
            Ok(warnings) => {
                self.freshness.record_success(id);
                let detail = self.load_local(id)?;
                if let Some(detail) = &detail {
                    self.freshness.store(id, detail.clone());
                }
                Ok((true, detail, warnings))
            }
            Err(SyncError::Fetch(e)) => {
                warn!(workflow_id = id, error = %e, "Scoped refresh failed, serving stored data");
                self.freshness.record_failure(id);
                let detail = self.load_local(id)?;
                Ok((false, detail, vec![format!("refresh {id}: {e}")]))
            }
            Err(e) => {
                warn!(workflow_id = id, error = %e, "Scoped refresh failed locally");
                self.freshness.release(id);
                Err(e)
            }
        }
    }

    /// Fetch one workflow and its executions, upsert, and derive for it.
    async fn sync_one(&self, id: &str) -> Result<Vec<String>> {
        let mut warnings = Vec::new();
        let upserter = Upserter::new(self.store.clone());

        let payload = self.client.workflows().get(id).await?;
        upserter.upsert_workflow(&payload, false)?;

        let query = ListExecutionsQuery {
            limit: Some(self.execution_limit),
            workflow_id: Some(id.to_string()),
            ..Default::default()
        };
        let outcome = Enricher::new(self.client.clone()).fetch(&query).await?;
        warnings.extend(outcome.warnings);
        for execution in &outcome.executions {
            if let Err(e) = upserter.upsert_execution(execution, false) {
                warn!(execution_id = %execution.payload.id, error = %e, "Execution upsert failed");
                warnings.push(e.to_string());
            }
        }

        let report = Deriver::with_classifier(self.store.clone(), self.classifier.clone())
            .derive_all(Some(id))?;
        warnings.extend(report.warnings);
        Ok(warnings)
    }

    fn load_local(&self, id: &str) -> Result<Option<WorkflowDetail>> {
        let Some(workflow) = self.store.get_workflow(id)? else {
            return Ok(None);
        };
        Ok(Some(WorkflowDetail {
            workflow,
            nodes: self.store.workflow_nodes(id)?,
            recent_executions: self
                .store
                .recent_executions(Some(id), self.execution_limit)?,
        }))
    }
}
