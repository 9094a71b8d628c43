//! Tabular statement results

use chrono::{DateTime, NaiveDate};
use comfy_table::{presets::UTF8_FULL, Table};
use duckdb::types::{TimeUnit, Value};
use serde::Serialize;

/// Rows returned by a statement, fully materialized
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Position of a column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// First cell of the first row, for scalar queries like `count(*)`
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.first())
    }

    /// Scalar as an integer, if it is one
    pub fn scalar_i64(&self) -> Option<i64> {
        self.scalar().and_then(value_as_i64)
    }

    /// Every cell rendered as text, row by row
    pub fn to_strings(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(format_value).collect())
            .collect()
    }

    /// Render as a terminal table
    pub fn render_table(&self) -> String {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(self.columns.clone());
        for row in self.to_strings() {
            table.add_row(row);
        }
        table.to_string()
    }

    /// JSON-friendly view: one object per row keyed by column name
    pub fn to_records(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row.iter())
                    .map(|(column, value)| (column.clone(), value_to_json(value)))
                    .collect()
            })
            .collect()
    }
}

/// Serializable snapshot used by `--json` output
#[derive(Debug, Serialize)]
pub struct QueryResultJson<'a> {
    pub columns: &'a [String],
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
}

impl<'a> From<&'a QueryResult> for QueryResultJson<'a> {
    fn from(result: &'a QueryResult) -> Self {
        Self {
            columns: &result.columns,
            rows: result.to_records(),
        }
    }
}

pub fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::TinyInt(v) => Some(i64::from(*v)),
        Value::SmallInt(v) => Some(i64::from(*v)),
        Value::Int(v) => Some(i64::from(*v)),
        Value::BigInt(v) => Some(*v),
        Value::HugeInt(v) => i64::try_from(*v).ok(),
        Value::UTinyInt(v) => Some(i64::from(*v)),
        Value::USmallInt(v) => Some(i64::from(*v)),
        Value::UInt(v) => Some(i64::from(*v)),
        Value::UBigInt(v) => i64::try_from(*v).ok(),
        _ => None,
    }
}

fn micros(unit: &TimeUnit, value: i64) -> i64 {
    match unit {
        TimeUnit::Second => value.saturating_mul(1_000_000),
        TimeUnit::Millisecond => value.saturating_mul(1_000),
        TimeUnit::Microsecond => value,
        TimeUnit::Nanosecond => value / 1_000,
    }
}

/// Human-readable rendering of a single cell
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Boolean(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Decimal(v) => v.to_string(),
        Value::Text(v) => v.clone(),
        Value::Date32(days) => NaiveDate::from_num_days_from_ce_opt(days.saturating_add(719_163))
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| days.to_string()),
        Value::Timestamp(unit, v) => DateTime::from_timestamp_micros(micros(unit, *v))
            .map(|ts| ts.naive_utc().format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| v.to_string()),
        other => match value_as_i64(other) {
            Some(v) => v.to_string(),
            None => format!("{:?}", other),
        },
    }
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Boolean(v) => serde_json::Value::Bool(*v),
        Value::Float(v) => serde_json::json!(v),
        Value::Double(v) => serde_json::json!(v),
        other => match value_as_i64(other) {
            Some(v) => serde_json::json!(v),
            None => serde_json::Value::String(format_value(other)),
        },
    }
}
