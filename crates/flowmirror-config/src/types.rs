//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [upstream]
//! base_url = "https://automation.example.com/api/v1"
//! timeout_secs = 10
//!
//! [sync]
//! max_retries = 3
//! retry_delay_ms = 1000
//! batch_size = 3
//! batch_delay_ms = 1000
//! execution_limit = 100
//! mode = "enhanced"
//!
//! [freshness]
//! staleness_window_secs = 1800
//! cache_ttl_secs = 300
//! failure_threshold = 3
//! cooldown_secs = 60
//!
//! [store]
//! path = "/var/lib/flowmirror/mirror.db"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use flowmirror_types::SyncMode;
use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Built-in defaults for every tunable.
pub mod defaults {
    pub const TIMEOUT_SECS: u64 = 10;
    pub const MAX_RETRIES: u32 = 3;
    pub const RETRY_DELAY_MS: u64 = 1000;
    pub const BATCH_SIZE: usize = 3;
    pub const BATCH_DELAY_MS: u64 = 1000;
    pub const EXECUTION_LIMIT: u32 = 100;
    pub const STALENESS_WINDOW_SECS: u64 = 30 * 60;
    pub const CACHE_TTL_SECS: u64 = 5 * 60;
    pub const MAX_ENTRIES: usize = 1000;
    pub const FAILURE_THRESHOLD: u32 = 3;
    pub const COOLDOWN_SECS: u64 = 60;
    pub const DB_FILE: &str = "flowmirror.db";
}

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g. project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub upstream: Option<UpstreamConfig>,
    pub sync: Option<SyncConfig>,
    pub freshness: Option<FreshnessConfig>,
    pub store: Option<StoreConfig>,
}

impl MirrorConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections merge field by field so a project file can override a
    /// single knob without restating the whole section.
    pub fn merge(&mut self, other: MirrorConfig) {
        merge_section(&mut self.upstream, other.upstream, UpstreamConfig::merge);
        merge_section(&mut self.sync, other.sync, SyncConfig::merge);
        merge_section(&mut self.freshness, other.freshness, FreshnessConfig::merge);
        merge_section(&mut self.store, other.store, StoreConfig::merge);
    }

    pub fn upstream(&self) -> UpstreamConfig {
        self.upstream.clone().unwrap_or_default()
    }

    pub fn sync(&self) -> SyncConfig {
        self.sync.clone().unwrap_or_default()
    }

    pub fn freshness(&self) -> FreshnessConfig {
        self.freshness.clone().unwrap_or_default()
    }

    pub fn store(&self) -> StoreConfig {
        self.store.clone().unwrap_or_default()
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let sync = self.sync();
        if sync.batch_size() == 0 {
            return Err(invalid("sync.batch_size", "must be at least 1"));
        }
        if sync.max_retries() == 0 {
            return Err(invalid("sync.max_retries", "must be at least 1"));
        }
        if self.freshness().failure_threshold() == 0 {
            return Err(invalid("freshness.failure_threshold", "must be at least 1"));
        }
        if let Some(url) = &self.upstream().base_url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            return Err(invalid("upstream.base_url", "must be an http(s) URL"));
        }
        Ok(())
    }
}

fn merge_section<T>(base: &mut Option<T>, other: Option<T>, merge: fn(&mut T, T)) {
    match (base.as_mut(), other) {
        (Some(existing), Some(incoming)) => merge(existing, incoming),
        (None, Some(incoming)) => *base = Some(incoming),
        (_, None) => {}
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

macro_rules! overlay {
    ($self:ident, $other:ident, $($field:ident),+) => {
        $( if $other.$field.is_some() { $self.$field = $other.$field; } )+
    };
}

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

/// `[upstream]`: the automation-engine API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// API root, e.g. `https://n8n.example.com/api/v1`.
    pub base_url: Option<String>,
    /// API key (prefer the environment variable).
    pub api_key: Option<String>,
    /// Per-attempt timeout.
    pub timeout_secs: Option<u64>,
}

impl UpstreamConfig {
    fn merge(&mut self, other: Self) {
        overlay!(self, other, base_url, api_key, timeout_secs);
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(defaults::TIMEOUT_SECS))
    }

    pub fn has_plaintext_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

/// `[sync]`: orchestrator tuning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub batch_size: Option<usize>,
    pub batch_delay_ms: Option<u64>,
    pub execution_limit: Option<u32>,
    pub mode: Option<SyncMode>,
}

impl SyncConfig {
    fn merge(&mut self, other: Self) {
        overlay!(
            self,
            other,
            max_retries,
            retry_delay_ms,
            batch_size,
            batch_delay_ms,
            execution_limit,
            mode
        );
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries.unwrap_or(defaults::MAX_RETRIES)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms.unwrap_or(defaults::RETRY_DELAY_MS))
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.unwrap_or(defaults::BATCH_SIZE)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms.unwrap_or(defaults::BATCH_DELAY_MS))
    }

    pub fn execution_limit(&self) -> u32 {
        self.execution_limit.unwrap_or(defaults::EXECUTION_LIMIT)
    }

    pub fn mode(&self) -> SyncMode {
        self.mode.unwrap_or_default()
    }
}

/// `[freshness]`: on-demand read path tuning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FreshnessConfig {
    pub staleness_window_secs: Option<u64>,
    pub cache_ttl_secs: Option<u64>,
    pub max_entries: Option<usize>,
    pub failure_threshold: Option<u32>,
    pub cooldown_secs: Option<u64>,
}

impl FreshnessConfig {
    fn merge(&mut self, other: Self) {
        overlay!(
            self,
            other,
            staleness_window_secs,
            cache_ttl_secs,
            max_entries,
            failure_threshold,
            cooldown_secs
        );
    }

    pub fn staleness_window(&self) -> Duration {
        Duration::from_secs(
            self.staleness_window_secs
                .unwrap_or(defaults::STALENESS_WINDOW_SECS),
        )
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs.unwrap_or(defaults::CACHE_TTL_SECS))
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries.unwrap_or(defaults::MAX_ENTRIES)
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold.unwrap_or(defaults::FAILURE_THRESHOLD)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs.unwrap_or(defaults::COOLDOWN_SECS))
    }
}

/// `[store]`: local database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    fn merge(&mut self, other: Self) {
        overlay!(self, other, path);
    }

    /// Configured path, or the platform data dir.
    pub fn effective_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .map(|d| d.join("flowmirror").join(defaults::DB_FILE))
                .unwrap_or_else(|| PathBuf::from(defaults::DB_FILE))
        })
    }
}
