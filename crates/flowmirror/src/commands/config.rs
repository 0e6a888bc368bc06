//! Config command - configuration management.

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::{Args, Subcommand};
use flowmirror_config::{API_KEY_ENV, resolve_api_key};

use super::{Context, or_dash};

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the resolved configuration
    Show,

    /// Show which config files are loaded and their precedence
    Which,

    /// Initialize a config file with defaults
    Init {
        /// Create project-local config (./flowmirror.toml) instead of user config
        #[arg(long)]
        local: bool,
    },

    /// Show configuration file path
    Path,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx).await,
        ConfigCommand::Which => cmd_which(ctx).await,
        ConfigCommand::Init { local } => cmd_init(local).await,
        ConfigCommand::Path => cmd_path().await,
    }
}

async fn cmd_show(ctx: &Context) -> Result<()> {
    let config = ctx.config();

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    println!("# flowmirror Configuration\n");

    let sources = ctx.loaded.loaded_from();
    if sources.is_empty() {
        println!("No config files loaded (using defaults)\n");
    } else {
        println!("Config files:");
        for source in &sources {
            println!("  {}", source.display());
        }
        println!();
    }

    let upstream = config.upstream();
    let key_status = match resolve_api_key(upstream.api_key.as_deref()) {
        Some(secret) => format!("✓ ({})", secret.source),
        None => format!("✗ (set {})", API_KEY_ENV),
    };
    println!("Upstream:");
    println!("  base_url: {}", or_dash(upstream.base_url.as_deref()));
    println!("  timeout:  {}s", upstream.timeout().as_secs());
    println!("  api key:  {}", key_status);
    println!();

    let sync = config.sync();
    println!("Sync:");
    println!("  mode:            {}", sync.mode());
    println!(
        "  retries:         {} attempts, {} ms step",
        sync.max_retries(),
        sync.retry_delay().as_millis()
    );
    println!(
        "  batching:        {} per batch, {} ms pause",
        sync.batch_size(),
        sync.batch_delay().as_millis()
    );
    println!("  execution_limit: {}", sync.execution_limit());
    println!();

    let freshness = config.freshness();
    println!("Freshness:");
    println!("  staleness window:  {}s", freshness.staleness_window().as_secs());
    println!("  cache ttl:         {}s", freshness.cache_ttl().as_secs());
    println!(
        "  breaker:           {} failures, {}s cooldown",
        freshness.failure_threshold(),
        freshness.cooldown().as_secs()
    );
    println!();

    println!("Store:");
    println!("  path: {}", ctx.db_path.display());
    println!();

    if !ctx.loaded.warnings.is_empty() {
        println!("Warnings:");
        for w in &ctx.loaded.warnings {
            println!("  ⚠ {}", w);
        }
        println!();
    }

    if ctx.verbose {
        println!("---\nRaw config:\n");
        if let Ok(toml_str) = config.to_toml() {
            println!("{}", toml_str);
        }
    }

    Ok(())
}

async fn cmd_which(ctx: &Context) -> Result<()> {
    println!("Config file search order (later overrides earlier):\n");

    for source in &ctx.loaded.sources {
        let status = if source.loaded {
            "✓ loaded"
        } else {
            "· not found"
        };
        println!("  {} {:<8} {}", status, source.layer, source.path.display());
    }

    println!();
    let loaded_count = ctx.loaded.loaded_from().len();
    if loaded_count == 0 {
        println!("No config files found. Run 'flowmirror config init' to create one.");
    } else {
        println!("{} config file(s) loaded.", loaded_count);
    }

    Ok(())
}

async fn cmd_init(local: bool) -> Result<()> {
    let path = if local {
        PathBuf::from("flowmirror.toml")
    } else {
        flowmirror_config::xdg_config_path()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?
    };

    if flowmirror_config::write_template(&path)? {
        println!("✓ Created config file: {}", path.display());
    } else {
        println!("Config file already exists: {}", path.display());
    }
    Ok(())
}

async fn cmd_path() -> Result<()> {
    match flowmirror_config::xdg_config_path() {
        Some(path) => {
            println!("{}", path.display());
            if !path.exists() {
                println!("  (file does not exist yet)");
            }
        }
        None => println!("Could not determine config directory"),
    }
    Ok(())
}
