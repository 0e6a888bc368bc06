//! Config file discovery and layered merging.
//!
//! Resolution order (later overrides earlier):
//! 1. `$FLOWMIRROR_CONFIG_DIR/config.toml`, else `<platform config dir>/flowmirror/config.toml`
//! 2. `./flowmirror.toml`
//!
//! An explicit `--config` file replaces discovery entirely.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{API_KEY_ENV, ConfigError, MirrorConfig, Result};

const PROJECT_CONFIG_FILE: &str = "flowmirror.toml";
const USER_CONFIG_FILE: &str = "config.toml";
const APP_NAME: &str = "flowmirror";

/// Overrides the user config directory.
pub const CONFIG_DIR_ENV: &str = "FLOWMIRROR_CONFIG_DIR";

/// Which layer a config file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayer {
    User,
    Project,
    /// Passed on the command line; no other layer is read.
    Explicit,
}

impl fmt::Display for ConfigLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConfigLayer::User => "user",
            ConfigLayer::Project => "project",
            ConfigLayer::Explicit => "explicit",
        })
    }
}

/// One file that discovery looked at.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub layer: ConfigLayer,
    pub path: PathBuf,
    pub loaded: bool,
}

/// Where to look for the user and project layers.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    /// Directory holding `flowmirror.toml`; the working directory when unset.
    pub project_dir: Option<PathBuf>,
    /// Directory holding the user `config.toml`; see [`xdg_config_dir`] when unset.
    pub config_dir: Option<PathBuf>,
}

/// Merged configuration plus how it was assembled.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: MirrorConfig,
    /// Files checked, lowest precedence first.
    pub sources: Vec<ConfigSource>,
    /// Skipped layers and plaintext key notices.
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Load a single file with no discovery.
    ///
    /// Unlike discovered layers, a missing or malformed file is an error.
    pub fn from_file(path: &Path) -> Result<Self> {
        let config = load_config_file(path)?;
        config.validate()?;
        let warnings = plaintext_key_notice(&config, path).into_iter().collect();
        Ok(Self {
            config,
            sources: vec![ConfigSource {
                layer: ConfigLayer::Explicit,
                path: path.to_path_buf(),
                loaded: true,
            }],
            warnings,
        })
    }

    /// Paths of sources that were actually loaded.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }
}

/// Discover and merge the user and project layers.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(&DiscoveryOptions {
        project_dir: project_dir.map(Path::to_path_buf),
        config_dir: None,
    })
}

/// Discover and merge layers from the given locations.
///
/// The merged result is validated; individual layers are not.
pub fn load_config_with_options(options: &DiscoveryOptions) -> Result<LoadedConfig> {
    let mut loaded = LoadedConfig {
        config: MirrorConfig::new(),
        sources: Vec::with_capacity(2),
        warnings: Vec::new(),
    };

    let user_path = match &options.config_dir {
        Some(dir) => Some(dir.join(USER_CONFIG_FILE)),
        None => xdg_config_path(),
    };
    if let Some(path) = user_path {
        merge_layer(&mut loaded, ConfigLayer::User, path);
    }

    let project_path = match &options.project_dir {
        Some(dir) => dir.join(PROJECT_CONFIG_FILE),
        None => PathBuf::from(PROJECT_CONFIG_FILE),
    };
    merge_layer(&mut loaded, ConfigLayer::Project, project_path);

    loaded.config.validate()?;
    Ok(loaded)
}

/// Parse one config file without validating it.
pub fn load_config_file(path: &Path) -> Result<MirrorConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    MirrorConfig::from_toml(&contents)
}

/// Write the commented starter config to `path` unless a file is already there.
///
/// Returns whether a file was created.
pub fn write_template(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    let write_err = |target: &Path, source| ConfigError::WriteFile {
        path: target.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| write_err(parent, e))?;
    }
    std::fs::write(path, config_template()).map_err(|e| write_err(path, e))?;
    debug!(path = %path.display(), "Wrote config template");
    Ok(true)
}

/// Starter config listing every setting at its default.
pub fn config_template() -> String {
    format!(
        r#"# flowmirror Configuration

[upstream]
# API root of the automation engine
base_url = "http://localhost:5678/api/v1"
# Prefer the {API_KEY_ENV} environment variable over a plaintext key
# api_key = ""
timeout_secs = 10

[sync]
# basic | enhanced | ultra
mode = "basic"
max_retries = 3
retry_delay_ms = 1000
batch_size = 3
batch_delay_ms = 1000
execution_limit = 100

[freshness]
staleness_window_secs = 1800
cache_ttl_secs = 300
failure_threshold = 3
cooldown_secs = 60

# [store]
# path = "/var/lib/flowmirror/flowmirror.db"
"#
    )
}

/// Path of the user config file.
pub fn xdg_config_path() -> Option<PathBuf> {
    xdg_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// User config directory: `FLOWMIRROR_CONFIG_DIR`, then the platform default.
pub fn xdg_config_dir() -> Option<PathBuf> {
    match std::env::var_os(CONFIG_DIR_ENV) {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::config_dir().map(|d| d.join(APP_NAME)),
    }
}

/// Merge the file at `path` if it exists. A malformed layer is skipped with a warning.
fn merge_layer(loaded: &mut LoadedConfig, layer: ConfigLayer, path: PathBuf) {
    let mut read = false;
    if path.is_file() {
        match load_config_file(&path) {
            Ok(config) => {
                debug!(%layer, path = %path.display(), "Loaded config layer");
                loaded.warnings.extend(plaintext_key_notice(&config, &path));
                loaded.config.merge(config);
                read = true;
            }
            Err(e) => {
                debug!(%layer, path = %path.display(), error = %e, "Skipping config layer");
                loaded
                    .warnings
                    .push(format!("Ignoring {layer} config {}: {e}", path.display()));
            }
        }
    }
    loaded.sources.push(ConfigSource {
        layer,
        path,
        loaded: read,
    });
}

fn plaintext_key_notice(config: &MirrorConfig, path: &Path) -> Option<String> {
    config.upstream().has_plaintext_api_key().then(|| {
        format!(
            "{} stores [upstream].api_key in plaintext; consider {API_KEY_ENV} instead",
            path.display()
        )
    })
}
