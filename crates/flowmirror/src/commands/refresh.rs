//! Refresh command - forced resync of one workflow.

use anyhow::{Result, bail};
use clap::Args;
use console::Style;
use serde::Serialize;

use super::Context;
use super::show::print_detail;

/// Arguments for the refresh command.
#[derive(Args, Debug)]
pub struct RefreshArgs {
    /// Workflow ID
    pub id: String,
}

#[derive(Debug, Serialize)]
struct RefreshOutput<'a> {
    fresh: bool,
    warnings: &'a [String],
    detail: Option<&'a flowmirror_sync::WorkflowDetail>,
}

/// Run the refresh command.
pub async fn run(args: RefreshArgs, ctx: &Context) -> Result<()> {
    let service = ctx.detail_service()?;
    let outcome = service.force_refresh(&args.id).await?;

    if ctx.json_output {
        let output = RefreshOutput {
            fresh: outcome.fresh,
            warnings: &outcome.warnings,
            detail: outcome.detail.as_ref(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if !outcome.fresh {
        let yellow = Style::new().yellow();
        for w in &outcome.warnings {
            eprintln!("{} {}", yellow.apply_to("⚠"), w);
        }
        eprintln!("{}", yellow.apply_to("Upstream unavailable, showing stored data"));
    }

    match &outcome.detail {
        Some(detail) => print_detail(detail, false),
        None => bail!("workflow '{}' not found locally or upstream", args.id),
    }
    Ok(())
}
