//! Verihubs Sales Pipeline
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Loads the Amazon sale report into a shared DuckDB file and derives two
//! reporting tables from it.
//!
//! # Overview
//!
//! - **Assets**: `raw_amazon_data`, `monthly_category_sales`,
//!   `daily_order_status` ([`assets`])
//! - **Graph**: dependency validation and ordering ([`graph`])
//! - **Runner**: concurrent execution with a failure policy ([`runner`])
//! - **Database**: lock-guarded statement execution ([`db`])
//! - **Sources**: Kaggle download or a local directory ([`source`])

pub mod assets;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod graph;
pub mod runner;
pub mod source;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use graph::{default_graph, AssetGraph};
pub use runner::{AssetStatus, FailurePolicy, RunReport, Runner};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Verihubs - Amazon sales pipeline on DuckDB
#[derive(Parser, Debug)]
#[command(name = "verihubs")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path of the shared DuckDB file
    #[arg(long, env = "VERIHUBS_DATABASE", global = true)]
    pub database: Option<PathBuf>,

    /// Seconds to wait for the database lock before giving up
    #[arg(long, env = "VERIHUBS_LOCK_TIMEOUT_SECS", global = true)]
    pub lock_timeout_secs: Option<u64>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the asset graph, or a selection of it
    Run {
        /// Comma-separated asset names (defaults to every asset)
        #[arg(short, long, value_delimiter = ',')]
        select: Vec<String>,

        /// Also run everything the selected assets depend on
        #[arg(long)]
        with_upstream: bool,

        /// Start no new asset after the first failure
        #[arg(long)]
        fail_fast: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Materialize a single asset without its upstreams
    Materialize {
        /// Asset name
        asset: String,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List assets in execution order
    List,

    /// Print the contents of a table (read-only, no lock)
    Show {
        /// Table name
        table: String,

        /// Maximum number of rows
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Run a statement through the lock-guarded executor
    Sql {
        /// SQL statement
        statement: String,

        /// Print rows as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Environment configuration with command-line overrides applied
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = PipelineConfig::from_env()?;
        if let Some(path) = &self.database {
            config.database_path = path.clone();
        }
        if let Some(secs) = self.lock_timeout_secs {
            config.lock_timeout = std::time::Duration::from_secs(secs);
        }
        if let Commands::Run { fail_fast: true, .. } = self.command {
            config.failure_policy = FailurePolicy::FailFast;
        }
        config.validate()?;
        Ok(config)
    }
}
