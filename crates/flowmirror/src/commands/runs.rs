//! Runs command - the sync audit log.

use anyhow::Result;
use clap::Args;
use console::{Style, style};

use super::{Context, fmt_time};

/// Arguments for the runs command.
#[derive(Args, Debug)]
pub struct RunsArgs {
    /// Maximum number of runs to list
    #[arg(short, long, default_value_t = 10)]
    pub limit: u32,
}

/// Run the runs command.
pub async fn run(args: RunsArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let runs = store.list_sync_runs(args.limit)?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!("No sync runs recorded yet");
        return Ok(());
    }

    let dim = Style::new().dim();
    println!();
    println!("{}", style("Recent sync runs").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    for run in &runs {
        let marker = if run.is_success() {
            Style::new().green().apply_to("●")
        } else {
            Style::new().red().apply_to("●")
        };
        println!(
            "  {} {}  {:<8} wf {}/{}  ex {}/{}  {} ms  {}",
            marker,
            fmt_time(Some(run.started_at)),
            run.mode,
            run.workflows_synced,
            run.workflows_updated,
            run.executions_synced,
            run.executions_updated,
            run.duration_ms,
            dim.apply_to(&run.id)
        );
        if ctx.verbose {
            for e in &run.errors {
                println!("      {} {}", Style::new().red().apply_to("✗"), e);
            }
        }
    }
    println!();
    Ok(())
}
