//! Dataset sources
//!
//! A source yields a local directory holding the extracted dataset files.
//! The loader picks the sales report out of it by name.

pub mod kaggle;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use kaggle::KaggleSource;

/// Provider of an extracted dataset directory
#[async_trait]
pub trait DatasetSource: Send + Sync {
    /// Short description for log lines
    fn describe(&self) -> String;

    /// Make the dataset available locally and return its directory
    async fn fetch(&self) -> Result<PathBuf>;
}

/// A dataset that is already on disk
#[derive(Debug, Clone)]
pub struct LocalDirSource {
    dir: PathBuf,
}

impl LocalDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl DatasetSource for LocalDirSource {
    fn describe(&self) -> String {
        format!("local directory {}", self.dir.display())
    }

    async fn fetch(&self) -> Result<PathBuf> {
        match tokio::fs::metadata(&self.dir).await {
            Ok(meta) if meta.is_dir() => Ok(self.dir.clone()),
            Ok(_) => Err(PipelineError::source_unavailable(format!(
                "'{}' is not a directory",
                self.dir.display()
            ))),
            Err(e) => Err(PipelineError::source_unavailable(format!(
                "cannot read '{}': {}",
                self.dir.display(),
                e
            ))),
        }
    }
}

/// Source selected by configuration: a local directory when
/// `source_dir` is set, otherwise the Kaggle download.
pub fn from_config(config: &PipelineConfig) -> Arc<dyn DatasetSource> {
    match &config.source_dir {
        Some(dir) => Arc::new(LocalDirSource::new(dir.clone())),
        None => Arc::new(KaggleSource::new(
            config.dataset.clone(),
            config.cache_dir.clone(),
            config.force_download,
        )),
    }
}

/// Sorted file names in a directory, for diagnostics
pub async fn list_files(dir: &Path) -> Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}
