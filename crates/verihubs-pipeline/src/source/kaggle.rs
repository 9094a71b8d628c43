//! Kaggle dataset download
//!
//! Downloads the dataset archive from the public Kaggle API, extracts it into
//! `<cache>/<owner>/<slug>/` and reuses that directory on later runs.

use crate::error::{PipelineError, Result};
use crate::source::DatasetSource;
use async_trait::async_trait;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

pub const KAGGLE_API_URL: &str = "https://www.kaggle.com/api/v1";

const DOWNLOAD_TIMEOUT_SECS: u64 = 600;

/// Dataset downloaded from Kaggle, cached on disk
#[derive(Debug, Clone)]
pub struct KaggleSource {
    dataset: String,
    cache_dir: PathBuf,
    force: bool,
    base_url: String,
    credentials: Option<(String, String)>,
}

impl KaggleSource {
    /// `dataset` is the `<owner>/<slug>` handle. Credentials are read from
    /// `KAGGLE_USERNAME` and `KAGGLE_KEY` when both are set.
    pub fn new(dataset: impl Into<String>, cache_dir: impl Into<PathBuf>, force: bool) -> Self {
        let credentials = match (std::env::var("KAGGLE_USERNAME"), std::env::var("KAGGLE_KEY")) {
            (Ok(user), Ok(key)) => Some((user, key)),
            _ => None,
        };

        Self {
            dataset: dataset.into(),
            cache_dir: cache_dir.into(),
            force,
            base_url: KAGGLE_API_URL.to_string(),
            credentials,
        }
    }

    /// Point at a different API host (mirrors, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn handle(&self) -> Result<(&str, &str)> {
        match self.dataset.split_once('/') {
            Some((owner, slug)) if !owner.is_empty() && !slug.is_empty() && !slug.contains('/') => {
                Ok((owner, slug))
            },
            _ => Err(PipelineError::config(format!(
                "dataset must look like '<owner>/<slug>', got '{}'",
                self.dataset
            ))),
        }
    }

    pub fn download_url(&self) -> Result<String> {
        let (owner, slug) = self.handle()?;
        Ok(format!("{}/datasets/download/{}/{}", self.base_url, owner, slug))
    }

    /// Directory the archive is extracted into
    pub fn dataset_dir(&self) -> Result<PathBuf> {
        let (owner, slug) = self.handle()?;
        Ok(self.cache_dir.join(owner).join(slug))
    }

    /// Download target and extraction staging directory, next to the dataset dir
    fn work_paths(&self) -> Result<(PathBuf, PathBuf)> {
        let (owner, slug) = self.handle()?;
        let parent = self.cache_dir.join(owner);
        Ok((parent.join(format!("{}.zip", slug)), parent.join(format!("{}.partial", slug))))
    }

    async fn download(&self, url: &str, output_path: &Path) -> Result<()> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .user_agent(concat!("verihubs/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let mut request = client.get(url);
        if let Some((user, key)) = &self.credentials {
            request = request.basic_auth(user, Some(key));
        }

        let response = request.send().await?.error_for_status()?;
        let total_size = response.content_length().unwrap_or(0);

        let pb = ProgressBar::new(total_size);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.set_message(format!("Downloading {}", self.dataset));

        let mut file = tokio::fs::File::create(output_path).await?;
        let mut downloaded = 0u64;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            pb.set_position(downloaded);
        }
        file.flush().await?;

        pb.finish_with_message(format!("Downloaded {}", self.dataset));
        debug!(bytes = downloaded, path = %output_path.display(), "Archive written");
        Ok(())
    }
}

async fn has_files(dir: &Path) -> bool {
    match tokio::fs::read_dir(dir).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
        Err(_) => false,
    }
}

async fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Best-effort removal of a failed download
async fn discard(archive: &Path, staging: &Path) {
    if let Err(e) = tokio::fs::remove_file(archive).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %archive.display(), error = %e, "Failed to remove archive");
        }
    }
    if let Err(e) = remove_dir_if_exists(staging).await {
        warn!(path = %staging.display(), error = %e, "Failed to remove staging directory");
    }
}

fn extract_archive(archive: &Path, target: &Path) -> Result<()> {
    let file = std::fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;
    zip.extract(target)?;
    Ok(())
}

#[async_trait]
impl DatasetSource for KaggleSource {
    fn describe(&self) -> String {
        format!("kaggle dataset {}", self.dataset)
    }

    async fn fetch(&self) -> Result<PathBuf> {
        let target = self.dataset_dir()?;

        if !self.force && has_files(&target).await {
            info!(dataset = %self.dataset, path = %target.display(), "Using cached dataset");
            return Ok(target);
        }

        let (archive, staging) = self.work_paths()?;
        remove_dir_if_exists(&staging).await?;
        tokio::fs::create_dir_all(&staging).await?;

        let fetched = async {
            let url = self.download_url()?;
            info!(dataset = %self.dataset, url = %url, "Downloading dataset");
            self.download(&url, &archive).await?;

            let (archive_path, staging_path) = (archive.clone(), staging.clone());
            tokio::task::spawn_blocking(move || extract_archive(&archive_path, &staging_path)).await??;
            Ok::<(), PipelineError>(())
        }
        .await;

        if let Err(e) = fetched {
            warn!(dataset = %self.dataset, error = %e, "Dataset fetch failed, discarding partial files");
            discard(&archive, &staging).await;
            return Err(e);
        }

        remove_dir_if_exists(&target).await?;
        tokio::fs::rename(&staging, &target).await?;
        tokio::fs::remove_file(&archive).await?;

        info!(dataset = %self.dataset, path = %target.display(), "Dataset extracted");
        Ok(target)
    }
}
