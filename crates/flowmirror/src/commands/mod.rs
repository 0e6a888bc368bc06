//! CLI command handlers.

pub mod config;
pub mod refresh;
pub mod runs;
pub mod show;
pub mod sync;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use chrono::Local;
use flowmirror_client::{MirrorClient, RetryPolicy};
use flowmirror_config::{LoadedConfig, MirrorConfig, resolve_api_key};
use flowmirror_freshness::{FreshnessPolicy, FreshnessService};
use flowmirror_store::MirrorStore;
use flowmirror_sync::{DetailService, SyncOptions};
use flowmirror_types::Timestamp;
use tracing::{debug, warn};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Merged configuration.
    pub loaded: LoadedConfig,
    /// Database path after CLI overrides.
    pub db_path: PathBuf,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Load configuration, either from an explicit file or by discovery.
    pub fn load(
        config_file: Option<&Path>,
        db_override: Option<PathBuf>,
        json_output: bool,
        verbose: bool,
    ) -> Result<Self> {
        let loaded = match config_file {
            Some(path) => LoadedConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => flowmirror_config::load_config(None)?,
        };
        for w in &loaded.warnings {
            warn!("{w}");
        }

        let db_path = db_override.unwrap_or_else(|| loaded.config.store().effective_path());
        debug!(db = %db_path.display(), "Context ready");
        Ok(Self {
            loaded,
            db_path,
            json_output,
            verbose,
        })
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.loaded.config
    }

    pub fn open_store(&self) -> Result<Arc<MirrorStore>> {
        let store = MirrorStore::open(&self.db_path)
            .with_context(|| format!("opening store at {}", self.db_path.display()))?;
        Ok(Arc::new(store))
    }

    /// Build an upstream client from `[upstream]` and the resolved API key.
    pub fn client(&self) -> Result<MirrorClient> {
        let upstream = self.config().upstream();
        let sync = self.config().sync();
        let Some(base_url) = upstream.base_url.as_deref() else {
            bail!("no upstream configured; set [upstream] base_url in flowmirror.toml");
        };

        let mut builder = MirrorClient::builder()
            .base_url(base_url)
            .timeout(upstream.timeout())
            .retry(RetryPolicy::new(sync.max_retries(), sync.retry_delay()));
        match resolve_api_key(upstream.api_key.as_deref()) {
            Some(secret) => {
                debug!(source = %secret.source, "Resolved API key");
                builder = builder.api_key(secret.value);
            }
            None => warn!("No API key configured; requests will be unauthenticated"),
        }
        Ok(builder.build()?)
    }

    pub fn sync_options(&self) -> SyncOptions {
        let sync = self.config().sync();
        SyncOptions {
            max_retries: sync.max_retries(),
            retry_delay: sync.retry_delay(),
            batch_size: sync.batch_size(),
            batch_delay: sync.batch_delay(),
            execution_limit: sync.execution_limit(),
            force_refresh: false,
            mode: sync.mode(),
        }
    }

    pub fn detail_service(&self) -> Result<DetailService> {
        let f = self.config().freshness();
        let policy = FreshnessPolicy::new()
            .with_staleness_window(f.staleness_window())
            .with_cache_ttl(f.cache_ttl())
            .with_max_entries(f.max_entries())
            .with_failure_threshold(f.failure_threshold())
            .with_cooldown(f.cooldown());
        Ok(DetailService::new(
            self.client()?,
            self.open_store()?,
            Arc::new(FreshnessService::new(policy)),
        )
        .with_execution_limit(self.config().sync().execution_limit()))
    }
}

/// Format an optional value for display.
pub(crate) fn or_dash<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

/// Format an optional timestamp in local time.
pub(crate) fn fmt_time(at: Option<Timestamp>) -> String {
    at.map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}
