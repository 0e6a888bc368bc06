//! Configuration system for flowmirror.
//!
//! Provides TOML-based configuration with:
//! - `[upstream]` connection settings for the automation-engine API
//! - `[sync]` retry, batching and mode settings for the pipeline
//! - `[freshness]` staleness window, cache TTL and circuit-breaker tuning
//! - `[store]` local database location
//! - Config file layering (user config dir + project-local override)
//! - API key resolution (env var → config file)

pub mod discovery;
pub mod error;
pub mod secrets;
pub mod types;

pub use discovery::{
    ConfigLayer, ConfigSource, DiscoveryOptions, LoadedConfig, config_template, load_config,
    load_config_file, load_config_with_options, write_template, xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use secrets::{API_KEY_ENV, ResolvedSecret, SecretSource, resolve_api_key};
pub use types::*;
