//! Loader: sales report CSV into `raw_amazon_data`

use crate::assets::{Asset, AssetContext, Materialization, RAW_AMAZON_DATA};
use crate::db::{quote_identifier, quote_literal};
use crate::error::{PipelineError, Result};
use crate::source::list_files;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use verihubs_common::checksum::{compute_file_checksum, verify_file_checksum};

/// Copies the source CSV locally and rebuilds `raw_amazon_data` from it
#[derive(Debug, Clone)]
pub struct RawAmazonData {
    deps: Vec<String>,
}

impl RawAmazonData {
    pub fn new() -> Self {
        Self { deps: Vec::new() }
    }

    /// Statement replacing the raw table with the contents of `csv_path`
    pub fn import_sql(csv_path: &Path) -> String {
        format!(
            "create or replace table {} as (\n    select * from read_csv_auto({})\n)",
            quote_identifier(RAW_AMAZON_DATA),
            quote_literal(&csv_path.to_string_lossy())
        )
    }
}

impl Default for RawAmazonData {
    fn default() -> Self {
        Self::new()
    }
}

async fn checksum(path: PathBuf) -> Result<String> {
    Ok(tokio::task::spawn_blocking(move || compute_file_checksum(&path)).await??)
}

/// Copy `src` to a uniquely named file in `dir` and verify it against
/// `expected`. The staged file is removed if either step fails.
async fn stage_copy(src: &Path, dir: &Path, name: &str, expected: &str) -> Result<PathBuf> {
    let staged = dir.join(format!(".{}.{}.partial", name, Uuid::new_v4().simple()));

    let copied = async {
        tokio::fs::copy(src, &staged).await?;
        let (path, expected) = (staged.clone(), expected.to_string());
        tokio::task::spawn_blocking(move || verify_file_checksum(&path, &expected)).await??;
        Ok::<(), PipelineError>(())
    }
    .await;

    if let Err(e) = copied {
        if let Err(cleanup) = tokio::fs::remove_file(&staged).await {
            warn!(path = %staged.display(), error = %cleanup, "Failed to remove staged copy");
        }
        return Err(e);
    }
    Ok(staged)
}

#[async_trait]
impl Asset for RawAmazonData {
    fn name(&self) -> &str {
        RAW_AMAZON_DATA
    }

    fn deps(&self) -> &[String] {
        &self.deps
    }

    fn description(&self) -> &str {
        "Amazon sale report imported as-is from the source dataset"
    }

    #[instrument(skip_all, fields(asset = RAW_AMAZON_DATA, run_id = %ctx.run_id))]
    async fn materialize(&self, ctx: &AssetContext) -> Result<Materialization> {
        let config = &ctx.config;

        info!(source = %ctx.source.describe(), "Fetching source dataset");
        let dataset_dir = ctx.source.fetch().await?;
        let src_file = dataset_dir.join(&config.source_file);

        if !tokio::fs::try_exists(&src_file).await.unwrap_or(false) {
            let available = list_files(&dataset_dir).await.unwrap_or_default();
            error!(
                file = %config.source_file,
                dir = %dataset_dir.display(),
                available = ?available,
                "Source file not found in dataset"
            );
            return Err(PipelineError::SourceFileMissing {
                file: config.source_file.clone(),
                dir: dataset_dir,
                available,
            });
        }

        tokio::fs::create_dir_all(&config.data_dir).await?;
        let dst_file = config.data_dir.join(&config.source_file);

        let previous = if tokio::fs::try_exists(&dst_file).await.unwrap_or(false) {
            Some(checksum(dst_file.clone()).await?)
        } else {
            None
        };
        let source_checksum = checksum(src_file.clone()).await?;

        // Readers of dst_file always see a complete copy: stage, verify, rename
        let staged = stage_copy(&src_file, &config.data_dir, &config.source_file, &source_checksum).await?;
        tokio::fs::rename(&staged, &dst_file).await?;

        let unchanged = previous.as_deref() == Some(source_checksum.as_str());
        info!(
            path = %dst_file.display(),
            sha256 = %source_checksum,
            unchanged,
            "Source file saved"
        );

        let csv_path = tokio::fs::canonicalize(&dst_file).await?;
        ctx.executor.execute_async(Self::import_sql(&csv_path)).await?;
        let row_count = ctx.executor.row_count(RAW_AMAZON_DATA).await?;

        info!(
            table = RAW_AMAZON_DATA,
            rows = row_count,
            db = %ctx.executor.db_path().display(),
            "Imported source data"
        );

        Ok(Materialization::new(RAW_AMAZON_DATA, RAW_AMAZON_DATA, row_count)
            .with_metadata("source_path", csv_path.display().to_string())
            .with_metadata("source_sha256", source_checksum)
            .with_metadata("source_unchanged", unchanged.to_string()))
    }
}
