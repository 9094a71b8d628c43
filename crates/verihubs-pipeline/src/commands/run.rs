//! `verihubs run` and `verihubs materialize` command implementations

use crate::assets::AssetContext;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::graph::default_graph;
use crate::runner::{AssetStatus, RunReport, Runner};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};
use tracing::info;

/// Run the default graph, or the selected part of it
pub async fn run(
    config: PipelineConfig,
    select: Vec<String>,
    with_upstream: bool,
    json: bool,
) -> Result<()> {
    let runner = Runner::new(default_graph()?, config.failure_policy);
    let ctx = AssetContext::new(config);
    info!(run_id = %ctx.run_id, db = %ctx.executor.db_path().display(), "Running pipeline");

    let report = runner.run_selected(&ctx, &select, with_upstream).await?;
    finish(&report, json)
}

/// Run one asset on its own; its upstream tables must already exist
pub async fn materialize(config: PipelineConfig, asset: String, json: bool) -> Result<()> {
    run(config, vec![asset], false, json).await
}

fn finish(report: &RunReport, json: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(report)?;
        println!("{}", out);
    } else {
        print_report(report);
    }

    if report.is_success() {
        Ok(())
    } else {
        Err(PipelineError::RunFailed(report.summary()))
    }
}

fn print_report(report: &RunReport) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Asset", "Status", "Rows", "Time", "Detail"]);

    for (name, status) in &report.outcomes {
        let row = match status {
            AssetStatus::Succeeded { materialization, elapsed_ms } => vec![
                name.clone(),
                status.label().green().to_string(),
                materialization.row_count.to_string(),
                format!("{} ms", elapsed_ms),
                String::new(),
            ],
            AssetStatus::Failed { error, elapsed_ms } => vec![
                name.clone(),
                status.label().red().to_string(),
                String::new(),
                format!("{} ms", elapsed_ms),
                error.clone(),
            ],
            AssetStatus::Skipped { reason } => vec![
                name.clone(),
                status.label().yellow().to_string(),
                String::new(),
                String::new(),
                reason.clone(),
            ],
        };
        table.add_row(row);
    }

    println!("{}", table);
    println!();

    let summary = format!(
        "Run {} finished in {:.1}s: {}",
        report.run_id,
        report.elapsed().as_secs_f64(),
        report.summary()
    );
    if report.is_success() {
        println!("{}", summary.green().bold());
    } else {
        println!("{}", summary.red().bold());
    }
}
