//! Per-run sync summary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Timestamp, now};

/// How deep a sync run goes after the core pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Core pipeline only.
    #[default]
    Basic,
    /// Adds tag, settings and complexity passes.
    Enhanced,
    /// Enhanced plus versioning, connections, triggers, development data and analysis.
    Ultra,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Enhanced => "enhanced",
            Self::Ultra => "ultra",
        }
    }

    pub fn includes_enhanced(&self) -> bool {
        matches!(self, Self::Enhanced | Self::Ultra)
    }

    pub fn includes_ultra(&self) -> bool {
        matches!(self, Self::Ultra)
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "enhanced" => Ok(Self::Enhanced),
            "ultra" => Ok(Self::Ultra),
            other => Err(format!("unknown sync mode '{other}'")),
        }
    }
}

/// Counters produced by the enhanced (and ultra) extension passes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionCounts {
    pub tags_processed: u32,
    pub settings_processed: u32,
    pub complexity_processed: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ultra: Option<UltraCounts>,
}

/// Counters produced by the ultra-only passes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UltraCounts {
    pub versions_processed: u32,
    pub connections_processed: u32,
    pub triggers_processed: u32,
    pub development_processed: u32,
    pub analysis_processed: u32,
}

/// Summary of one orchestration run.
///
/// Created when the run starts, mutated by each step, then persisted
/// unchanged as an audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    pub id: String,
    pub mode: SyncMode,
    pub started_at: Timestamp,
    pub duration_ms: u64,
    /// Workflows processed successfully (write or no-op).
    pub workflows_synced: u32,
    /// Workflows whose existing row was rewritten.
    pub workflows_updated: u32,
    pub executions_synced: u32,
    pub executions_updated: u32,
    /// Non-fatal, per-entity failures.
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Fatal, per-phase failures.
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<ExtensionCounts>,
}

impl SyncResult {
    /// Start a new run summary.
    pub fn new(mode: SyncMode) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            mode,
            started_at: now(),
            duration_ms: 0,
            workflows_synced: 0,
            workflows_updated: 0,
            executions_synced: 0,
            executions_updated: 0,
            warnings: Vec::new(),
            errors: Vec::new(),
            extensions: None,
        }
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Stamp the elapsed time since `started_at`.
    pub fn finish(&mut self) {
        let elapsed = now() - self.started_at;
        self.duration_ms = elapsed.num_milliseconds().max(0) as u64;
    }

    /// True when no fatal error was recorded.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}
