//! Sync orchestrator: sequences the pipeline phases for one run.
//!
//! ```text
//! workflows ─▶ workflow derivation ─▶ executions ─▶ execution derivation
//!     ─▶ extension passes ─▶ sync_runs audit row
//! ```
//!
//! A failed list fetch is recorded and the next phase still runs, since the
//! workflow and execution endpoints are independent. A derivation failure
//! stops the run; the partial result is still persisted and returned.

use std::sync::Arc;
use std::time::Duration;

use flowmirror_client::{
    ListExecutionsQuery, MirrorClient, RetryPolicy,
    retry::{DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS},
};
use flowmirror_store::MirrorStore;
use flowmirror_types::{SyncMode, SyncResult};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::classify::NodeClassifier;
use crate::derive::Deriver;
use crate::enrich::{DEFAULT_BATCH_DELAY, DEFAULT_BATCH_SIZE, Enricher};
use crate::error::{Result, SyncError};
use crate::extensions::ExtensionRunner;
use crate::upsert::Upserter;

/// Default number of executions requested per run.
pub const DEFAULT_EXECUTION_LIMIT: u32 = 100;

/// Knobs for one sync run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Total attempts per upstream request.
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub execution_limit: u32,
    /// Rewrite every entity even when unchanged.
    pub force_refresh: bool,
    pub mode: SyncMode,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_BASE_DELAY,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: DEFAULT_BATCH_DELAY,
            execution_limit: DEFAULT_EXECUTION_LIMIT,
            force_refresh: false,
            mode: SyncMode::Basic,
        }
    }
}

impl SyncOptions {
    pub fn with_mode(mut self, mode: SyncMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }
}

/// Runs full syncs against one upstream and one store.
///
/// Only one run may be active per orchestrator.
#[derive(Debug)]
pub struct SyncOrchestrator {
    client: MirrorClient,
    store: Arc<MirrorStore>,
    classifier: NodeClassifier,
    running: Mutex<()>,
}

impl SyncOrchestrator {
    pub fn new(client: MirrorClient, store: Arc<MirrorStore>) -> Self {
        Self {
            client,
            store,
            classifier: NodeClassifier::default(),
            running: Mutex::new(()),
        }
    }

    pub fn with_classifier(mut self, classifier: NodeClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn store(&self) -> &Arc<MirrorStore> {
        &self.store
    }

    /// Execute one run.
    ///
    /// Returns `Err` only when another run is in progress; every other
    /// failure is recorded in the returned [`SyncResult`].
    pub async fn run(&self, options: &SyncOptions) -> Result<SyncResult> {
        let _guard = self
            .running
            .try_lock()
            .map_err(|_| SyncError::AlreadyRunning)?;

        let mut result = SyncResult::new(options.mode);
        info!(run_id = %result.id, mode = %options.mode, force = options.force_refresh, "Sync run starting");

        let client = self
            .client
            .with_retry_policy(RetryPolicy::new(options.max_retries, options.retry_delay));
        let upserter = Upserter::new(self.store.clone());
        let deriver = Deriver::with_classifier(self.store.clone(), self.classifier.clone());

        if let Err(e) = self.run_phases(&client, &upserter, &deriver, options, &mut result).await {
            error!(run_id = %result.id, error = %e, "Sync run aborted");
            result.error(e.to_string());
        }

        result.finish();
        if let Err(e) = self.store.record_sync_run(&result) {
            error!(run_id = %result.id, error = %e, "Failed to record sync run");
        }

        info!(
            run_id = %result.id,
            workflows_synced = result.workflows_synced,
            workflows_updated = result.workflows_updated,
            executions_synced = result.executions_synced,
            executions_updated = result.executions_updated,
            warnings = result.warnings.len(),
            errors = result.errors.len(),
            duration_ms = result.duration_ms,
            "Sync run complete"
        );
        Ok(result)
    }

    /// The ordered phases. An `Err` here is fatal for the rest of the run.
    async fn run_phases(
        &self,
        client: &MirrorClient,
        upserter: &Upserter,
        deriver: &Deriver,
        options: &SyncOptions,
        result: &mut SyncResult,
    ) -> Result<()> {
        self.sync_workflows(client, upserter, options, result).await;

        info!("Phase: workflow derivation");
        let report = deriver.derive_workflows(None)?;
        result.warnings.extend(report.warnings);

        self.sync_executions(client, upserter, options, result).await;

        info!("Phase: execution derivation");
        let report = deriver.derive_executions(None)?;
        result.warnings.extend(report.warnings);

        if options.mode.includes_enhanced() {
            info!(mode = %options.mode, "Phase: extensions");
            let runner = ExtensionRunner::new(self.store.clone(), self.classifier.clone());
            match runner.run(options.mode, None) {
                Ok(Some(report)) => {
                    result.warnings.extend(report.warnings);
                    result.extensions = Some(report.counts);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "Extension passes failed");
                    result.error(format!("extensions: {e}"));
                }
            }
        }

        Ok(())
    }

    async fn sync_workflows(
        &self,
        client: &MirrorClient,
        upserter: &Upserter,
        options: &SyncOptions,
        result: &mut SyncResult,
    ) {
        info!("Phase: workflows");
        let listing = match client.workflows().list().await {
            Ok(listing) => listing,
            Err(e) => {
                warn!(error = %e, "Workflow list fetch failed");
                result.error(format!("fetch workflows: {e}"));
                return;
            }
        };

        debug!(count = listing.len(), rejected = listing.rejected.len(), "Fetched workflows");
        for rejected in &listing.rejected {
            result.warn(format!("workflow {rejected}"));
        }
        for payload in &listing.items {
            match upserter.upsert_workflow(payload, options.force_refresh) {
                Ok(outcome) => {
                    result.workflows_synced += u32::from(outcome.synced);
                    result.workflows_updated += u32::from(outcome.updated);
                }
                Err(e) => {
                    warn!(workflow_id = %payload.id, error = %e, "Workflow upsert failed");
                    result.warn(e.to_string());
                }
            }
        }
    }

    async fn sync_executions(
        &self,
        client: &MirrorClient,
        upserter: &Upserter,
        options: &SyncOptions,
        result: &mut SyncResult,
    ) {
        info!("Phase: executions");
        let enricher = Enricher::new(client.clone()).with_batching(options.batch_size, options.batch_delay);
        let query = ListExecutionsQuery {
            limit: Some(options.execution_limit),
            ..Default::default()
        };

        let outcome = match enricher.fetch(&query).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Execution list fetch failed");
                result.error(format!("fetch executions: {e}"));
                return;
            }
        };

        debug!(count = outcome.executions.len(), strategy = ?outcome.strategy, "Fetched executions");
        result.warnings.extend(outcome.warnings);
        for execution in &outcome.executions {
            match upserter.upsert_execution(execution, options.force_refresh) {
                Ok(o) => {
                    result.executions_synced += u32::from(o.synced);
                    result.executions_updated += u32::from(o.updated);
                }
                Err(e) => {
                    warn!(execution_id = %execution.payload.id, error = %e, "Execution upsert failed");
                    result.warn(e.to_string());
                }
            }
        }
    }
}
