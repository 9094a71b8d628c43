//! `verihubs show` command implementation
//!
//! Reads through a read-only connection without the database lock, so it
//! never waits behind a running pipeline. A table being replaced at the same
//! moment shows its previous contents.

use crate::config::PipelineConfig;
use crate::db::{quote_identifier, read_only_query};
use crate::error::Result;
use colored::Colorize;

pub fn show_sql(table: &str, limit: usize) -> String {
    format!("select * from {} limit {}", quote_identifier(table), limit)
}

/// Print up to `limit` rows of `table`
pub async fn run(config: PipelineConfig, table: String, limit: usize) -> Result<()> {
    let db_path = config.database_path.clone();
    let sql = show_sql(&table, limit);
    let result = tokio::task::spawn_blocking(move || read_only_query(&db_path, &sql)).await??;

    if result.columns.is_empty() {
        println!("{}", format!("Table '{}' has no columns.", table).yellow());
        return Ok(());
    }

    println!("{}", result.render_table());
    println!("{} row(s) shown (limit {})", result.row_count(), limit);
    Ok(())
}
