//! Verihubs CLI - Main entry point

use anyhow::Context;
use clap::Parser;
use std::process;
use tracing::error;
use verihubs_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use verihubs_pipeline::{commands, Cli, Commands};

#[tokio::main]
async fn main() {
    // Load .env before clap reads env-backed flags
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Info })
        .output(LogOutput::Console)
        .log_file_prefix("verihubs")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    // The CLI still works without logging
    let _guard = init_logging(&log_config).ok();

    if let Err(e) = execute_command(&cli).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn execute_command(cli: &Cli) -> anyhow::Result<()> {
    if let Commands::List = cli.command {
        return Ok(commands::list::run().await?);
    }

    let config = cli.pipeline_config().context("Invalid configuration")?;

    match &cli.command {
        Commands::Run {
            select,
            with_upstream,
            json,
            ..
        } => commands::run::run(config, select.clone(), *with_upstream, *json).await?,

        Commands::Materialize { asset, json } => {
            commands::run::materialize(config, asset.clone(), *json).await?
        },

        Commands::Show { table, limit } => commands::show::run(config, table.clone(), *limit).await?,

        Commands::Sql { statement, json } => {
            commands::sql::run(config, statement.clone(), *json).await?
        },

        Commands::List => commands::list::run().await?,
    }

    Ok(())
}
