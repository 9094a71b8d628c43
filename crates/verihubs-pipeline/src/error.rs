//! Error types for the pipeline
//!
//! Messages are written for the person running the pipeline: each one names
//! the file, table or asset involved.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    /// The database lock stayed held for longer than the configured timeout
    #[error("Timed out after {waited:?} waiting for database lock '{}'. Another pipeline run may be writing, or a crashed process left the lock held.", .lock_path.display())]
    LockTimeout { lock_path: PathBuf, waited: Duration },

    /// The dataset was fetched but did not contain the expected file
    #[error("File '{file}' not found in '{}'. Available files: [{}]", .dir.display(), .available.join(", "))]
    SourceFileMissing {
        file: String,
        dir: PathBuf,
        available: Vec<String>,
    },

    /// A statement succeeded but returned something other than expected
    #[error("Unexpected result from '{statement}': {detail}")]
    UnexpectedResult { statement: String, detail: String },

    #[error("Dataset source unavailable: {0}")]
    SourceUnavailable(String),

    /// A derived asset ran before its source table was ever loaded
    #[error("Asset '{asset}' requires table '{table}', which does not exist. Materialize '{table}' first.")]
    MissingSourceTable { asset: String, table: String },

    #[error("Download failed: {0}")]
    Download(#[from] reqwest::Error),

    #[error("Archive extraction failed: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid asset graph: {0}")]
    Graph(String),

    #[error("Unknown asset '{0}'. Run 'verihubs list' to see available assets.")]
    UnknownAsset(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// At least one asset of a run failed or was skipped
    #[error("Pipeline run failed: {0}")]
    RunFailed(String),

    #[error("Asset '{asset}' panicked: {message}")]
    AssetPanicked { asset: String, message: String },

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Common(#[from] verihubs_common::VerihubsError),
}

impl PipelineError {
    pub fn graph(msg: impl Into<String>) -> Self {
        Self::Graph(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn source_unavailable(msg: impl Into<String>) -> Self {
        Self::SourceUnavailable(msg.into())
    }

    /// Whether this error is a lock acquisition timeout
    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }
}
