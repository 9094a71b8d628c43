//! Lock-guarded statement execution against the shared DuckDB file
//!
//! Every write to the database goes through [`GuardedExecutor::execute`]:
//!
//! 1. acquire `<db-path>.lock` (bounded wait)
//! 2. open a fresh connection
//! 3. run the statement and collect its rows
//! 4. close the connection
//! 5. release the lock
//!
//! Steps 4 and 5 happen on every exit path. DuckDB does not arbitrate writers
//! across processes, so no connection to the file outlives the lock.

use crate::db::lock::DbLock;
use crate::db::result::QueryResult;
use crate::db::{quote_identifier, quote_literal};
use crate::error::{PipelineError, Result};
use duckdb::types::Value;
use duckdb::{AccessMode, Config, Connection};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Executes statements against one database file under its lock
#[derive(Debug, Clone)]
pub struct GuardedExecutor {
    db_path: PathBuf,
    lock_timeout: Duration,
}

impl GuardedExecutor {
    /// `lock_timeout` bounds how long a call waits for another writer
    pub fn new(db_path: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        Self {
            db_path: db_path.into(),
            lock_timeout,
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Run one statement while holding the database lock.
    ///
    /// Blocks the calling thread; use [`execute_async`](Self::execute_async)
    /// from async code.
    #[instrument(skip(self, sql), fields(db = %self.db_path.display()))]
    pub fn execute(&self, sql: &str) -> Result<QueryResult> {
        if let Some(parent) = self.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let _lock = DbLock::acquire(&self.db_path, self.lock_timeout)?;
        let conn = Connection::open(&self.db_path)?;

        debug!(sql = %sql.trim(), "Executing statement");
        let result = run_statement(&conn, sql);

        if let Err((_, e)) = conn.close() {
            warn!(error = %e, "Failed to close database connection cleanly");
            if result.is_ok() {
                return Err(e.into());
            }
        }

        result
    }

    /// [`execute`](Self::execute) on the blocking thread pool
    pub async fn execute_async(&self, sql: impl Into<String>) -> Result<QueryResult> {
        let executor = self.clone();
        let sql = sql.into();
        tokio::task::spawn_blocking(move || executor.execute(&sql)).await?
    }

    /// Whether a table exists in the main schema
    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let sql = format!(
            "select count(*) from information_schema.tables where table_schema = 'main' and table_name = {}",
            quote_literal(table)
        );
        let result = self.execute_async(sql).await?;
        Ok(result.scalar_i64().unwrap_or(0) > 0)
    }

    /// Number of rows in a table
    pub async fn row_count(&self, table: &str) -> Result<u64> {
        let sql = format!("select count(*) from {}", quote_identifier(table));
        let result = self.execute_async(sql.clone()).await?;
        count_from(&result, &sql)
    }
}

/// Non-negative integer scalar of a `count(*)` result
fn count_from(result: &QueryResult, sql: &str) -> Result<u64> {
    result
        .scalar_i64()
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| PipelineError::UnexpectedResult {
            statement: sql.to_string(),
            detail: format!("expected a row count, got {:?}", result.scalar()),
        })
}

/// Run a query on a read-only connection, without taking the lock.
///
/// For inspection only: a concurrent writer may be mid-statement, so the
/// snapshot can be stale. Fails if the database file does not exist yet.
pub fn read_only_query(db_path: &Path, sql: &str) -> Result<QueryResult> {
    if !db_path.exists() {
        return Err(PipelineError::config(format!(
            "database '{}' does not exist. Run 'verihubs run' first.",
            db_path.display()
        )));
    }

    let config = Config::default().access_mode(AccessMode::ReadOnly)?;
    let conn = Connection::open_with_flags(db_path, config)?;
    run_statement(&conn, sql)
}

fn run_statement(conn: &Connection, sql: &str) -> Result<QueryResult> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;
    let columns = rows.as_ref().map(|s| s.column_names()).unwrap_or_default();

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            values.push(row.get::<_, Value>(idx)?);
        }
        out.push(values);
    }

    Ok(QueryResult { columns, rows: out })
}
