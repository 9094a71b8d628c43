//! Pipeline assets
//!
//! An asset is a named unit of work that produces one table in the shared
//! database and declares the assets it depends on. The runner decides when
//! an asset may start; the asset itself only knows how to build its table.

pub mod derived;
pub mod raw;

use crate::config::PipelineConfig;
use crate::db::GuardedExecutor;
use crate::error::Result;
use crate::source::{self, DatasetSource};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

pub use derived::{daily_order_status, monthly_category_sales, DerivedTable};
pub use raw::RawAmazonData;

/// Source table created by the loader
pub const RAW_AMAZON_DATA: &str = "raw_amazon_data";
pub const MONTHLY_CATEGORY_SALES: &str = "monthly_category_sales";
pub const DAILY_ORDER_STATUS: &str = "daily_order_status";

/// Everything an asset needs while it runs
#[derive(Clone)]
pub struct AssetContext {
    pub config: Arc<PipelineConfig>,
    pub executor: GuardedExecutor,
    pub source: Arc<dyn DatasetSource>,
    pub run_id: Uuid,
}

impl AssetContext {
    /// Context with the executor and dataset source derived from `config`
    pub fn new(config: PipelineConfig) -> Self {
        let executor = GuardedExecutor::new(config.database_path.clone(), config.lock_timeout);
        let source = source::from_config(&config);
        Self {
            config: Arc::new(config),
            executor,
            source,
            run_id: Uuid::new_v4(),
        }
    }

    /// Replace the dataset source
    pub fn with_source(mut self, source: Arc<dyn DatasetSource>) -> Self {
        self.source = source;
        self
    }
}

/// Result of a successful asset run
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Materialization {
    pub asset: String,
    pub table: String,
    pub row_count: u64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Materialization {
    pub fn new(asset: impl Into<String>, table: impl Into<String>, row_count: u64) -> Self {
        Self {
            asset: asset.into(),
            table: table.into(),
            row_count,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A named unit of computation producing one table
#[async_trait]
pub trait Asset: Send + Sync {
    /// Unique asset name, also the name of the table it produces
    fn name(&self) -> &str;

    /// Names of the assets that must have succeeded before this one runs
    fn deps(&self) -> &[String];

    fn description(&self) -> &str;

    async fn materialize(&self, ctx: &AssetContext) -> Result<Materialization>;
}

/// The loader plus both derived tables
pub fn default_assets() -> Vec<Arc<dyn Asset>> {
    vec![
        Arc::new(RawAmazonData::new()),
        Arc::new(monthly_category_sales()),
        Arc::new(daily_order_status()),
    ]
}
