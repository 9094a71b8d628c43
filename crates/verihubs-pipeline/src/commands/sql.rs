//! `verihubs sql` command implementation

use crate::config::PipelineConfig;
use crate::db::result::QueryResultJson;
use crate::db::GuardedExecutor;
use crate::error::Result;
use tracing::debug;

/// Run one statement under the database lock and print what it returns
pub async fn run(config: PipelineConfig, statement: String, json: bool) -> Result<()> {
    let executor = GuardedExecutor::new(config.database_path, config.lock_timeout);
    debug!(sql = %statement, "Running ad-hoc statement");
    let result = executor.execute_async(statement).await?;

    if json {
        let out = serde_json::to_string_pretty(&QueryResultJson::from(&result))?;
        println!("{}", out);
    } else if result.columns.is_empty() {
        println!("OK");
    } else {
        println!("{}", result.render_table());
        println!("{} row(s)", result.row_count());
    }

    Ok(())
}
