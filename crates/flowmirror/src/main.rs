//! flowmirror - mirror workflow-automation state locally
//!
//! Main entry point for the flowmirror CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{config, refresh, runs, show, sync};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// flowmirror - mirror workflow-automation state into a local SQLite store
#[derive(Parser)]
#[command(name = "flowmirror")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Use this config file instead of discovering one
    #[arg(long, global = true, env = "FLOWMIRROR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the local database path
    #[arg(long, global = true, env = "FLOWMIRROR_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a full sync against the upstream API
    Sync(sync::SyncArgs),

    /// Show a workflow with its statistics and recent executions
    Show(show::ShowArgs),

    /// Force a resync of one workflow
    Refresh(refresh::RefreshArgs),

    /// List recent sync runs
    Runs(runs::RunsArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console (human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "flowmirror=debug,flowmirror_sync=debug,flowmirror_client=debug,flowmirror_store=debug,flowmirror_freshness=debug,info"
    } else {
        "flowmirror=info,flowmirror_sync=info,flowmirror_client=warn,flowmirror_store=warn,warn"
    };

    let log_dir = flowmirror_config::xdg_config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "flowmirror.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "flowmirror=trace,flowmirror_sync=trace,flowmirror_client=trace,flowmirror_store=debug,flowmirror_freshness=debug,info",
                )),
        )
        .init();

    let ctx = commands::Context::load(cli.config.as_deref(), cli.db, cli.json, cli.verbose)?;

    match cli.command {
        Commands::Sync(args) => sync::run(args, &ctx).await,
        Commands::Show(args) => show::run(args, &ctx).await,
        Commands::Refresh(args) => refresh::run(args, &ctx).await,
        Commands::Runs(args) => runs::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
