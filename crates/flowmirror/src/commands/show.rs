//! Show command - one workflow with its statistics.

use anyhow::{Result, bail};
use clap::Args;
use console::{Style, style};
use flowmirror_sync::WorkflowDetail;

use super::{Context, fmt_time, or_dash};

/// Arguments for the show command.
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Workflow ID
    pub id: String,

    /// Also list node rows
    #[arg(short, long)]
    pub nodes: bool,
}

/// Run the show command.
pub async fn run(args: ShowArgs, ctx: &Context) -> Result<()> {
    let service = ctx.detail_service()?;
    let Some(detail) = service.workflow_detail(&args.id).await? else {
        bail!("workflow '{}' not found locally or upstream", args.id);
    };

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&detail)?);
    } else {
        print_detail(&detail, args.nodes);
    }
    Ok(())
}

pub(crate) fn print_detail(detail: &WorkflowDetail, with_nodes: bool) {
    let wf = &detail.workflow;
    let dim = Style::new().dim();

    println!();
    println!("{} {}", style(&wf.name).bold(), dim.apply_to(&wf.id));
    println!("{}", dim.apply_to("─".repeat(40)));
    println!(
        "  {} {}",
        dim.apply_to("Active:     "),
        if wf.active { "yes" } else { "no" }
    );
    println!(
        "  {} {} nodes, {} connections, {} types",
        dim.apply_to("Structure:  "),
        wf.node_count,
        wf.connection_count,
        wf.unique_node_types
    );
    println!(
        "  {} {} ({})",
        dim.apply_to("Complexity: "),
        wf.complexity_score,
        or_dash(wf.complexity_level.as_deref())
    );
    println!(
        "  {} {} total, {} ok, {} failed, rate {}%",
        dim.apply_to("Executions: "),
        wf.execution_count,
        wf.success_count,
        wf.failure_count,
        or_dash(wf.success_rate)
    );
    println!(
        "  {} avg {} / min {} / max {} ms",
        dim.apply_to("Duration:   "),
        or_dash(wf.avg_duration_ms),
        or_dash(wf.min_duration_ms),
        or_dash(wf.max_duration_ms)
    );
    println!(
        "  {} {}",
        dim.apply_to("Last run:   "),
        fmt_time(wf.last_execution_at)
    );
    if let Some(tags) = &wf.tag_names {
        println!("  {} {}", dim.apply_to("Tags:       "), tags);
    }

    if with_nodes && !detail.nodes.is_empty() {
        println!();
        println!("{}", style("Nodes").bold());
        for node in &detail.nodes {
            println!(
                "  {:<24} {:<40} {}",
                node.name,
                dim.apply_to(&node.node_type),
                or_dash(node.category.as_deref())
            );
        }
    }

    if !detail.recent_executions.is_empty() {
        println!();
        println!("{}", style("Recent executions").bold());
        for exec in &detail.recent_executions {
            let status = exec.status.as_deref().unwrap_or("unknown");
            let styled = match status {
                "success" => Style::new().green().apply_to(status),
                "error" => Style::new().red().apply_to(status),
                _ => Style::new().yellow().apply_to(status),
            };
            println!(
                "  {:<12} {:<8} {:>8} ms  {}",
                exec.id,
                styled,
                or_dash(exec.duration_ms),
                fmt_time(exec.started_at)
            );
        }
    }
    println!();
}
