//! Aggregations derived from `raw_amazon_data`

use crate::assets::{
    Asset, AssetContext, Materialization, DAILY_ORDER_STATUS, MONTHLY_CATEGORY_SALES,
    RAW_AMAZON_DATA,
};
use crate::db::quote_identifier;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use tracing::{info, instrument};

/// Sales summed per month and category
pub const MONTHLY_CATEGORY_SALES_SQL: &str = r#"
    select
        date_trunc('month', Date) as month,
        Category,
        sum(Amount) as total_amount
    from raw_amazon_data
    group by month, Category
    order by month, Category
"#;

/// Distinct orders per day and status; an order spans several line items
pub const DAILY_ORDER_STATUS_SQL: &str = r#"
    select
        date_trunc('day', Date) as day,
        Status,
        count(distinct "Order ID") as order_count
    from raw_amazon_data
    group by day, Status
    order by day, Status
"#;

/// A table rebuilt in full from one upstream table by a single query
#[derive(Debug, Clone)]
pub struct DerivedTable {
    name: String,
    source_table: String,
    deps: Vec<String>,
    description: String,
    query: String,
}

impl DerivedTable {
    pub fn new(
        name: impl Into<String>,
        source_table: impl Into<String>,
        description: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        let source_table = source_table.into();
        Self {
            name: name.into(),
            deps: vec![source_table.clone()],
            source_table,
            description: description.into(),
            query: query.into(),
        }
    }

    /// Statement replacing the table with the query result
    pub fn create_sql(&self) -> String {
        format!(
            "create or replace table {} as {}",
            quote_identifier(&self.name),
            self.query.trim()
        )
    }
}

pub fn monthly_category_sales() -> DerivedTable {
    DerivedTable::new(
        MONTHLY_CATEGORY_SALES,
        RAW_AMAZON_DATA,
        "Total sale amount per month and product category",
        MONTHLY_CATEGORY_SALES_SQL,
    )
}

pub fn daily_order_status() -> DerivedTable {
    DerivedTable::new(
        DAILY_ORDER_STATUS,
        RAW_AMAZON_DATA,
        "Distinct order count per day and order status",
        DAILY_ORDER_STATUS_SQL,
    )
}

#[async_trait]
impl Asset for DerivedTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn deps(&self) -> &[String] {
        &self.deps
    }

    fn description(&self) -> &str {
        &self.description
    }

    #[instrument(skip_all, fields(asset = %self.name, run_id = %ctx.run_id))]
    async fn materialize(&self, ctx: &AssetContext) -> Result<Materialization> {
        if !ctx.executor.table_exists(&self.source_table).await? {
            return Err(PipelineError::MissingSourceTable {
                asset: self.name.clone(),
                table: self.source_table.clone(),
            });
        }

        ctx.executor.execute_async(self.create_sql()).await?;
        let row_count = ctx.executor.row_count(&self.name).await?;

        info!(
            table = %self.name,
            rows = row_count,
            db = %ctx.executor.db_path().display(),
            "Created derived table"
        );

        Ok(Materialization::new(self.name.clone(), self.name.clone(), row_count)
            .with_metadata("source_table", self.source_table.clone()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::db::QueryResult;
    use duckdb::types::Value;

    fn context(dir: &tempfile::TempDir) -> AssetContext {
        AssetContext::new(PipelineConfig {
            database_path: dir.path().join("verihubs.duckdb"),
            source_dir: Some(dir.path().to_path_buf()),
            ..PipelineConfig::default()
        })
    }

    async fn seed(ctx: &AssetContext, rows: &str) {
        ctx.executor
            .execute_async(format!(
                r#"create or replace table raw_amazon_data as
                   select * from (values {rows}) t("Order ID", Date, Status, Category, Amount)"#
            ))
            .await
            .unwrap();
    }

    async fn query(ctx: &AssetContext, sql: &str) -> QueryResult {
        ctx.executor.execute_async(sql).await.unwrap()
    }

    #[test]
    fn test_create_sql_shape() {
        let sql = daily_order_status().create_sql();
        assert!(sql.starts_with("create or replace table \"daily_order_status\" as select"));
        assert!(sql.contains("count(distinct \"Order ID\")"));
        assert_eq!(monthly_category_sales().deps(), ["raw_amazon_data".to_string()]);
    }

    #[tokio::test]
    async fn test_monthly_sales_sums_per_month_and_category() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        seed(
            &ctx,
            "('A-1', DATE '2024-01-03', 'Shipped', 'X', 10.0),
             ('A-2', DATE '2024-01-20', 'Shipped', 'X', 15.0)",
        )
        .await;

        let out = monthly_category_sales().materialize(&ctx).await.unwrap();
        assert_eq!(out.row_count, 1);

        let result = query(
            &ctx,
            "select strftime(month, '%Y-%m') as month, Category, cast(total_amount as double) from monthly_category_sales",
        )
        .await;
        assert_eq!(
            result.rows,
            vec![vec![
                Value::Text("2024-01".to_string()),
                Value::Text("X".to_string()),
                Value::Double(25.0),
            ]]
        );
    }

    #[tokio::test]
    async fn test_daily_status_counts_distinct_orders() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        seed(
            &ctx,
            "('1', DATE '2024-01-05', 'A', 'X', 1.0),
             ('1', DATE '2024-01-05', 'A', 'Y', 2.0),
             ('2', DATE '2024-01-05', 'A', 'X', 3.0)",
        )
        .await;

        daily_order_status().materialize(&ctx).await.unwrap();

        let result = query(
            &ctx,
            "select strftime(day, '%Y-%m-%d'), Status, cast(order_count as bigint) from daily_order_status",
        )
        .await;
        assert_eq!(
            result.rows,
            vec![vec![
                Value::Text("2024-01-05".to_string()),
                Value::Text("A".to_string()),
                Value::BigInt(2),
            ]]
        );
    }

    #[tokio::test]
    async fn test_rows_are_ordered_and_rebuild_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        seed(
            &ctx,
            "('3', DATE '2024-02-01', 'Shipped', 'B', 5.0),
             ('1', DATE '2024-01-01', 'Shipped', 'B', 1.0),
             ('2', DATE '2024-01-01', 'Cancelled', 'A', 2.0)",
        )
        .await;

        let asset = daily_order_status();
        asset.materialize(&ctx).await.unwrap();
        let first = query(&ctx, "select * from daily_order_status").await;
        asset.materialize(&ctx).await.unwrap();
        let second = query(&ctx, "select * from daily_order_status").await;

        assert_eq!(first, second);
        let statuses: Vec<String> = first.to_strings().into_iter().map(|r| r[1].clone()).collect();
        assert_eq!(statuses, vec!["Cancelled", "Shipped", "Shipped"]);
    }

    #[tokio::test]
    async fn test_fails_when_source_table_missing() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);

        let err = monthly_category_sales().materialize(&ctx).await.unwrap_err();
        match err {
            PipelineError::MissingSourceTable { asset, table } => {
                assert_eq!(asset, "monthly_category_sales");
                assert_eq!(table, "raw_amazon_data");
            },
            other => panic!("unexpected error: {other}"),
        }
        assert!(!ctx.executor.table_exists("monthly_category_sales").await.unwrap());
    }
}
