//! Post-processing derivation over locally stored data.
//!
//! Never touches the network. Execution-level steps are set-based SQL
//! statements; workflow-level steps re-read the typed raw payloads and write
//! all structures in one transaction. Every value is overwritten, so
//! running the stage twice leaves the store unchanged.

use std::sync::Arc;

use flowmirror_store::MirrorStore;
use flowmirror_types::RawWorkflowPayload;
use tracing::{debug, info, warn};

use crate::classify::NodeClassifier;
use crate::error::{Result, SyncError};
use crate::structure;

/// Rows touched by one derivation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepReport {
    pub step: &'static str,
    pub rows: usize,
}

/// Summary of a derivation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivationReport {
    /// Total rows written across all steps.
    pub processed: usize,
    pub steps: Vec<StepReport>,
    /// Stored payloads that could not be decoded and were skipped.
    pub warnings: Vec<String>,
}

impl DerivationReport {
    fn record(&mut self, step: &'static str, rows: usize) {
        debug!(step, rows, "Derivation step complete");
        self.processed += rows;
        self.steps.push(StepReport { step, rows });
    }

    fn absorb(&mut self, other: DerivationReport) {
        self.processed += other.processed;
        self.steps.extend(other.steps);
        self.warnings.extend(other.warnings);
    }
}

/// Runs the derivation steps against the store.
#[derive(Debug, Clone)]
pub struct Deriver {
    store: Arc<MirrorStore>,
    classifier: NodeClassifier,
}

impl Deriver {
    pub fn new(store: Arc<MirrorStore>) -> Self {
        Self::with_classifier(store, NodeClassifier::default())
    }

    pub fn with_classifier(store: Arc<MirrorStore>, classifier: NodeClassifier) -> Self {
        Self { store, classifier }
    }

    /// Status, duration, error message and per-workflow aggregates.
    pub fn derive_executions(&self, scope: Option<&str>) -> Result<DerivationReport> {
        let mut report = DerivationReport::default();

        let rows = self
            .store
            .derive_execution_status(scope)
            .map_err(|e| SyncError::derivation("status", e))?;
        report.record("status", rows);

        let rows = self
            .store
            .derive_durations(scope)
            .map_err(|e| SyncError::derivation("duration", e))?;
        report.record("duration", rows);

        let rows = self
            .store
            .derive_error_messages(scope)
            .map_err(|e| SyncError::derivation("error_message", e))?;
        report.record("error_message", rows);

        let rows = self
            .store
            .derive_workflow_aggregates(scope)
            .map_err(|e| SyncError::derivation("aggregates", e))?;
        report.record("aggregates", rows);

        Ok(report)
    }

    /// Structural metrics, unique node types and node rows.
    pub fn derive_workflows(&self, scope: Option<&str>) -> Result<DerivationReport> {
        let mut report = DerivationReport::default();
        let payloads = self
            .store
            .workflow_payloads(scope)
            .map_err(|e| SyncError::derivation("structure", e))?;

        let mut structures = Vec::with_capacity(payloads.len());
        for stored in payloads {
            let decoded = serde_json::from_str(&stored.raw_data)
                .and_then(RawWorkflowPayload::from_value);
            match decoded {
                Ok(payload) => structures.push(structure::analyze(&payload, &self.classifier)),
                Err(e) => {
                    warn!(workflow_id = %stored.id, error = %e, "Skipping undecodable workflow payload");
                    report
                        .warnings
                        .push(format!("workflow {}: stored payload unreadable: {e}", stored.id));
                }
            }
        }

        let rows = self
            .store
            .write_structures(&structures)
            .map_err(|e| SyncError::derivation("structure", e))?;
        report.record("structure", rows);
        Ok(report)
    }

    /// Every step in order.
    pub fn derive_all(&self, scope: Option<&str>) -> Result<DerivationReport> {
        let mut report = self.derive_executions(scope)?;
        report.absorb(self.derive_workflows(scope)?);
        info!(processed = report.processed, scope = scope.unwrap_or("all"), "Derivation complete");
        Ok(report)
    }
}
