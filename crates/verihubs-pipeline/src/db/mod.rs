//! Shared database access
//!
//! - [`lock`]: cross-process lock file next to the database
//! - [`executor`]: lock-guarded statement execution
//! - [`result`]: materialized statement results

pub mod executor;
pub mod lock;
pub mod result;

pub use executor::{read_only_query, GuardedExecutor};
pub use lock::{lock_path_for, DbLock};
pub use result::QueryResult;

/// Quote an identifier for DuckDB, doubling embedded quotes
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal for DuckDB, doubling embedded single quotes
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
