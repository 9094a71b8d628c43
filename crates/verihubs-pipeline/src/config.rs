//! Pipeline configuration
//!
//! Defaults, overridden by `VERIHUBS_*` environment variables, overridden in
//! turn by command-line flags in `main.rs`.

use crate::error::{PipelineError, Result};
use crate::runner::FailurePolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Defaults
// ============================================================================

/// Shared database file, relative to the working directory
pub const DEFAULT_DATABASE_PATH: &str = "database/verihubs.duckdb";

/// Local directory the source CSV is copied into
pub const DEFAULT_DATA_DIR: &str = "data";

/// Kaggle dataset holding the sales report
pub const DEFAULT_DATASET: &str = "thedevastator/unlock-profits-with-e-commerce-sales-data";

/// File picked out of the downloaded dataset
pub const SOURCE_FILE_NAME: &str = "Amazon Sale Report.csv";

pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 300;

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Path of the shared DuckDB file
    pub database_path: PathBuf,

    /// Where the source CSV is copied before import
    pub data_dir: PathBuf,

    /// Download cache for remote datasets
    pub cache_dir: PathBuf,

    /// Remote dataset handle, `<owner>/<slug>`
    pub dataset: String,

    /// Name of the CSV inside the dataset
    pub source_file: String,

    /// Use an already-extracted dataset directory instead of downloading
    pub source_dir: Option<PathBuf>,

    /// Bound on waiting for the database lock
    pub lock_timeout: Duration,

    pub failure_policy: FailurePolicy,

    /// Re-download even when the dataset is cached
    #[serde(default)]
    pub force_download: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir()
            .map(|dir| dir.join("verihubs").join("datasets"))
            .unwrap_or_else(|| PathBuf::from(".verihubs-cache"));

        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            cache_dir,
            dataset: DEFAULT_DATASET.to_string(),
            source_file: SOURCE_FILE_NAME.to_string(),
            source_dir: None,
            lock_timeout: Duration::from_secs(DEFAULT_LOCK_TIMEOUT_SECS),
            failure_policy: FailurePolicy::default(),
            force_download: false,
        }
    }
}

impl PipelineConfig {
    /// Load config from environment variables
    ///
    /// - `VERIHUBS_DATABASE`, `VERIHUBS_DATA_DIR`, `VERIHUBS_CACHE_DIR`
    /// - `VERIHUBS_DATASET`, `VERIHUBS_SOURCE_DIR`
    /// - `VERIHUBS_LOCK_TIMEOUT_SECS`
    /// - `VERIHUBS_FAILURE_POLICY` (`best-effort` or `fail-fast`)
    /// - `VERIHUBS_FORCE_DOWNLOAD` (true/false)
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("VERIHUBS_DATABASE") {
            config.database_path = PathBuf::from(path);
        }

        if let Ok(dir) = std::env::var("VERIHUBS_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        if let Ok(dir) = std::env::var("VERIHUBS_CACHE_DIR") {
            config.cache_dir = PathBuf::from(dir);
        }

        if let Ok(dataset) = std::env::var("VERIHUBS_DATASET") {
            config.dataset = dataset;
        }

        if let Ok(dir) = std::env::var("VERIHUBS_SOURCE_DIR") {
            config.source_dir = Some(PathBuf::from(dir));
        }

        if let Ok(secs) = std::env::var("VERIHUBS_LOCK_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                PipelineError::config(format!("VERIHUBS_LOCK_TIMEOUT_SECS must be a whole number of seconds, got '{}'", secs))
            })?;
            config.lock_timeout = Duration::from_secs(secs);
        }

        if let Ok(policy) = std::env::var("VERIHUBS_FAILURE_POLICY") {
            config.failure_policy = policy.parse()?;
        }

        if let Ok(val) = std::env::var("VERIHUBS_FORCE_DOWNLOAD") {
            config.force_download = parse_flag("VERIHUBS_FORCE_DOWNLOAD", &val)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check values that cannot be expressed in the types
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(PipelineError::config("database path must not be empty"));
        }
        if self.source_file.trim().is_empty() {
            return Err(PipelineError::config("source file name must not be empty"));
        }
        if self.source_dir.is_none() && self.dataset.split('/').filter(|p| !p.is_empty()).count() != 2 {
            return Err(PipelineError::config(format!(
                "dataset must look like '<owner>/<slug>', got '{}'",
                self.dataset
            )));
        }
        Ok(())
    }
}

/// Boolean environment value: true/false, 1/0, yes/no, on/off
fn parse_flag(var: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(PipelineError::config(format!(
            "{} must be true or false, got '{}'",
            var, value
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "VERIHUBS_DATABASE",
        "VERIHUBS_DATA_DIR",
        "VERIHUBS_CACHE_DIR",
        "VERIHUBS_DATASET",
        "VERIHUBS_SOURCE_DIR",
        "VERIHUBS_LOCK_TIMEOUT_SECS",
        "VERIHUBS_FAILURE_POLICY",
        "VERIHUBS_FORCE_DOWNLOAD",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.database_path, PathBuf::from("database/verihubs.duckdb"));
        assert_eq!(config.source_file, "Amazon Sale Report.csv");
        assert_eq!(config.lock_timeout, Duration::from_secs(300));
        assert_eq!(config.failure_policy, FailurePolicy::BestEffort);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_from_env() {
        clear_env();
        std::env::set_var("VERIHUBS_DATABASE", "/tmp/sales.duckdb");
        std::env::set_var("VERIHUBS_SOURCE_DIR", "/tmp/dataset");
        std::env::set_var("VERIHUBS_LOCK_TIMEOUT_SECS", "5");
        std::env::set_var("VERIHUBS_FAILURE_POLICY", "fail-fast");

        let config = PipelineConfig::from_env().unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/sales.duckdb"));
        assert_eq!(config.source_dir, Some(PathBuf::from("/tmp/dataset")));
        assert_eq!(config.lock_timeout, Duration::from_secs(5));
        assert_eq!(config.failure_policy, FailurePolicy::FailFast);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_bad_timeout() {
        clear_env();
        std::env::set_var("VERIHUBS_LOCK_TIMEOUT_SECS", "soon");

        let err = PipelineConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("VERIHUBS_LOCK_TIMEOUT_SECS"));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_force_download() {
        clear_env();
        std::env::set_var("VERIHUBS_FORCE_DOWNLOAD", "yes");
        assert!(PipelineConfig::from_env().unwrap().force_download);

        std::env::set_var("VERIHUBS_FORCE_DOWNLOAD", "0");
        assert!(!PipelineConfig::from_env().unwrap().force_download);

        std::env::set_var("VERIHUBS_FORCE_DOWNLOAD", "maybe");
        let err = PipelineConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("VERIHUBS_FORCE_DOWNLOAD"), "{err}");

        clear_env();
    }

    #[test]
    fn test_validate_dataset_handle() {
        let config = PipelineConfig {
            dataset: "not-a-handle".to_string(),
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());

        // A local source directory makes the handle irrelevant
        let config = PipelineConfig {
            source_dir: Some(PathBuf::from("/data")),
            ..config
        };
        assert!(config.validate().is_ok());
    }
}
