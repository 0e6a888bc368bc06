//! Sync command - runs the full pipeline once.

use anyhow::{Result, bail};
use clap::Args;
use console::{Style, style};
use flowmirror_sync::SyncOrchestrator;
use flowmirror_types::{SyncMode, SyncResult};

use super::Context;

/// Arguments for the sync command.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Extension depth: basic, enhanced or ultra (default from config)
    #[arg(short, long)]
    pub mode: Option<SyncMode>,

    /// Rewrite every entity even when unchanged
    #[arg(short, long)]
    pub force: bool,

    /// Number of executions to pull
    #[arg(short, long)]
    pub limit: Option<u32>,
}

/// Run the sync command.
pub async fn run(args: SyncArgs, ctx: &Context) -> Result<()> {
    let mut options = ctx.sync_options().with_force_refresh(args.force);
    if let Some(mode) = args.mode {
        options = options.with_mode(mode);
    }
    if let Some(limit) = args.limit {
        options.execution_limit = limit.max(1);
    }

    let orchestrator = SyncOrchestrator::new(ctx.client()?, ctx.open_store()?);
    let result = orchestrator.run(&options).await?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result, ctx.verbose);
    }

    if !result.is_success() {
        bail!("sync finished with {} error(s)", result.errors.len());
    }
    Ok(())
}

fn print_result(result: &SyncResult, verbose: bool) {
    let dim = Style::new().dim();
    let status = if result.is_success() {
        Style::new().green().apply_to("● ok")
    } else {
        Style::new().red().apply_to("● failed")
    };

    println!();
    println!("{} {}", style("Sync run").bold(), dim.apply_to(&result.id));
    println!("{}", dim.apply_to("─".repeat(40)));
    println!("  {} {}", dim.apply_to("Status:    "), status);
    println!("  {} {}", dim.apply_to("Mode:      "), result.mode);
    println!("  {} {} ms", dim.apply_to("Duration:  "), result.duration_ms);
    println!(
        "  {} {} synced, {} updated",
        dim.apply_to("Workflows: "),
        result.workflows_synced,
        result.workflows_updated
    );
    println!(
        "  {} {} synced, {} updated",
        dim.apply_to("Executions:"),
        result.executions_synced,
        result.executions_updated
    );

    if let Some(ext) = &result.extensions {
        println!(
            "  {} tags {}, settings {}, complexity {}",
            dim.apply_to("Extensions:"),
            ext.tags_processed,
            ext.settings_processed,
            ext.complexity_processed
        );
        if let Some(ultra) = &ext.ultra {
            println!(
                "  {} versions {}, connections {}, triggers {}, development {}, analysis {}",
                dim.apply_to("Ultra:     "),
                ultra.versions_processed,
                ultra.connections_processed,
                ultra.triggers_processed,
                ultra.development_processed,
                ultra.analysis_processed
            );
        }
    }

    for e in &result.errors {
        println!("  {} {}", Style::new().red().apply_to("✗"), e);
    }
    if verbose {
        for w in &result.warnings {
            println!("  {} {}", Style::new().yellow().apply_to("⚠"), w);
        }
    } else if !result.warnings.is_empty() {
        println!(
            "  {} {} warning(s), rerun with --verbose to list them",
            Style::new().yellow().apply_to("⚠"),
            result.warnings.len()
        );
    }
    println!();
}
