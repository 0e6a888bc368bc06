//! Dual-strategy execution enrichment.
//!
//! The bulk list is asked for full run data first. Deployments that ignore
//! `includeData` return basic items, in which case every item is fetched
//! individually in small, rate-limited batches.

use std::collections::BTreeMap;
use std::time::Duration;

use flowmirror_client::{ListExecutionsQuery, MirrorClient};
use flowmirror_store::ExecutionRecord;
use flowmirror_types::{RawExecutionPayload, RawNodeRun};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Default number of concurrent per-item fetches.
pub const DEFAULT_BATCH_SIZE: usize = 3;

/// Default pause between per-item batches.
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_secs(1);

/// Business fields pulled from node output, with the keys that feed them.
/// The first node run (by start time) carrying a key wins.
pub const BUSINESS_FIELDS: &[(&str, &[&str])] = &[
    ("email", &["email", "emailAddress", "email_address"]),
    ("customer_name", &["customerName", "customer_name", "fullName", "full_name"]),
    ("company", &["company", "companyName", "company_name", "organization"]),
    ("phone", &["phone", "phoneNumber", "phone_number"]),
    ("order_id", &["orderId", "order_id", "orderNumber"]),
    ("invoice_id", &["invoiceId", "invoice_id"]),
    ("ticket_id", &["ticketId", "ticket_id"]),
    ("lead_id", &["leadId", "lead_id"]),
    ("amount", &["amount", "total", "totalAmount"]),
    ("currency", &["currency"]),
];

/// How the execution details were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichmentStrategy {
    /// The list call already carried full run data.
    Bulk,
    /// Each item was fetched on its own.
    PerItem,
}

/// One node run, flattened for storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedStep {
    pub node: String,
    pub started_at: Option<i64>,
    pub execution_time_ms: Option<i64>,
    pub items: usize,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// An execution payload with its parsed enrichment.
#[derive(Debug, Clone)]
pub struct EnrichedExecution {
    pub payload: RawExecutionPayload,
    pub steps: Vec<DetailedStep>,
    pub business_context: BTreeMap<String, Value>,
}

impl EnrichedExecution {
    /// Parse steps and business context out of whatever detail the payload has.
    pub fn from_payload(payload: RawExecutionPayload) -> Self {
        let runs = ordered_runs(&payload);
        let steps = runs.iter().map(|(name, run)| step(name, run)).collect();
        let business_context = business_context(&runs);
        Self {
            payload,
            steps,
            business_context,
        }
    }

    pub fn is_detailed(&self) -> bool {
        self.payload.has_detailed_data()
    }

    /// Store record including the enrichment columns.
    pub fn to_record(&self) -> ExecutionRecord {
        let mut record = ExecutionRecord::from_payload(&self.payload);
        if self.is_detailed() {
            record.detailed_steps = serde_json::to_string(&self.steps).ok();
        }
        if !self.business_context.is_empty() {
            record.business_context = serde_json::to_string(&self.business_context).ok();
        }
        record
    }
}

fn ordered_runs(payload: &RawExecutionPayload) -> Vec<(&str, &RawNodeRun)> {
    let Some(result) = payload.result_data() else {
        return Vec::new();
    };
    let mut runs: Vec<(&str, &RawNodeRun)> = result
        .run_data
        .iter()
        .flat_map(|(name, runs)| runs.iter().map(move |run| (name.as_str(), run)))
        .collect();
    runs.sort_by_key(|(_, run)| (run.start_time.is_none(), run.start_time));
    runs
}

fn step(node: &str, run: &RawNodeRun) -> DetailedStep {
    let error = run.error.as_ref().map(|e| e.summary());
    let fallback = if error.is_some() { "error" } else { "success" };
    let status = run
        .execution_status
        .clone()
        .unwrap_or_else(|| fallback.to_string());
    DetailedStep {
        node: node.to_string(),
        started_at: run.start_time,
        execution_time_ms: run.execution_time,
        items: run.output_items().len(),
        status,
        error,
    }
}

fn business_context(runs: &[(&str, &RawNodeRun)]) -> BTreeMap<String, Value> {
    let mut context = BTreeMap::new();
    for (_, run) in runs {
        for item in run.output_items() {
            let Some(object) = item.as_object() else {
                continue;
            };
            for (field, keys) in BUSINESS_FIELDS {
                if context.contains_key(*field) {
                    continue;
                }
                let found = keys
                    .iter()
                    .filter_map(|k| object.get(*k))
                    .find(|v| matches!(v, Value::String(_) | Value::Number(_) | Value::Bool(_)));
                if let Some(value) = found {
                    context.insert(field.to_string(), value.clone());
                }
            }
        }
        if context.len() == BUSINESS_FIELDS.len() {
            break;
        }
    }
    context
}

/// Result of an enrichment pass.
#[derive(Debug, Clone)]
pub struct EnrichmentOutcome {
    pub executions: Vec<EnrichedExecution>,
    pub strategy: EnrichmentStrategy,
    /// Recoverable problems (degraded items, list fallback).
    pub warnings: Vec<String>,
}

/// Fetches executions and brings them to the most detailed form available.
#[derive(Debug, Clone)]
pub struct Enricher {
    client: MirrorClient,
    batch_size: usize,
    batch_delay: Duration,
}

impl Enricher {
    pub fn new(client: MirrorClient) -> Self {
        Self {
            client,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: DEFAULT_BATCH_DELAY,
        }
    }

    pub fn with_batching(mut self, batch_size: usize, batch_delay: Duration) -> Self {
        self.batch_size = batch_size.max(1);
        self.batch_delay = batch_delay;
        self
    }

    /// List executions and enrich them.
    ///
    /// A failed `includeData` list is retried once without it; only when
    /// that also fails does the phase fail.
    pub async fn fetch(&self, query: &ListExecutionsQuery) -> Result<EnrichmentOutcome> {
        let mut warnings = Vec::new();
        let detailed_query = ListExecutionsQuery {
            include_data: true,
            ..query.clone()
        };

        let listing = match self.client.executions().list(&detailed_query).await {
            Ok(listing) => listing,
            Err(e) => {
                warn!(error = %e, "Detailed execution list failed, retrying without includeData");
                warnings.push(format!("execution list with data failed: {e}"));
                let basic_query = ListExecutionsQuery {
                    include_data: false,
                    ..query.clone()
                };
                self.client.executions().list(&basic_query).await?
            }
        };
        warnings.extend(listing.rejected.iter().map(|r| format!("execution {r}")));
        let items = listing.items;

        let bulk = items.first().is_none_or(RawExecutionPayload::has_detailed_data);
        let mut outcome = if bulk {
            info!(count = items.len(), "Using bulk execution details");
            EnrichmentOutcome {
                executions: items.into_iter().map(EnrichedExecution::from_payload).collect(),
                strategy: EnrichmentStrategy::Bulk,
                warnings: Vec::new(),
            }
        } else {
            info!(count = items.len(), "Bulk list lacks run data, fetching per item");
            self.enrich_executions(items).await
        };

        warnings.append(&mut outcome.warnings);
        outcome.warnings = warnings;
        Ok(outcome)
    }

    /// Fetch every item's detail in batches. Failed items keep their basic
    /// form and add a warning.
    pub async fn enrich_executions(&self, items: Vec<RawExecutionPayload>) -> EnrichmentOutcome {
        let mut executions = Vec::with_capacity(items.len());
        let mut warnings = Vec::new();
        let executions_api = self.client.executions();
        let api = &executions_api;

        for (index, batch) in items.chunks(self.batch_size).enumerate() {
            if index > 0 && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }
            debug!(batch = index, size = batch.len(), "Fetching execution details");

            let fetches = batch.iter().map(|item| async move {
                if item.id.is_empty() {
                    return None;
                }
                Some(api.get(&item.id, true).await)
            });
            let results = join_all(fetches).await;

            for (item, result) in batch.iter().zip(results) {
                match result {
                    Some(Ok(detailed)) => executions.push(EnrichedExecution::from_payload(detailed)),
                    Some(Err(e)) => {
                        warn!(execution_id = %item.id, error = %e, "Detail fetch failed, keeping basic payload");
                        warnings.push(format!("execution {}: detail fetch failed: {e}", item.id));
                        executions.push(EnrichedExecution::from_payload(item.clone()));
                    }
                    None => executions.push(EnrichedExecution::from_payload(item.clone())),
                }
            }
        }

        EnrichmentOutcome {
            executions,
            strategy: EnrichmentStrategy::PerItem,
            warnings,
        }
    }
}
