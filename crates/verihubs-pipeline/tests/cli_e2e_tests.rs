//! End-to-end tests for the verihubs binary
//!
//! Each test gets its own scratch directory holding the dataset, the
//! database and the CSV copy.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SALES_CSV: &str = "\
index,Order ID,Date,Status,Category,Amount
0,171-1,2022-04-30,Shipped,Set,100.0
1,171-1,2022-04-30,Shipped,Kurta,50.0
2,171-2,2022-05-01,Cancelled,Kurta,0.0
";

struct Scratch {
    dir: tempfile::TempDir,
}

impl Scratch {
    fn with_dataset(files: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let dataset = dir.path().join("dataset");
        std::fs::create_dir_all(&dataset).unwrap();
        for (name, content) in files {
            std::fs::write(dataset.join(name), content).unwrap();
        }
        Self { dir }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn database(&self) -> PathBuf {
        self.root().join("database").join("verihubs.duckdb")
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("verihubs").unwrap();
        cmd.current_dir(self.root())
            .env("VERIHUBS_SOURCE_DIR", self.root().join("dataset"))
            .env("VERIHUBS_DATABASE", self.database())
            .env("VERIHUBS_DATA_DIR", self.root().join("data"))
            .env("VERIHUBS_LOCK_TIMEOUT_SECS", "10")
            .env_remove("VERIHUBS_FAILURE_POLICY")
            .env("NO_COLOR", "1");
        cmd
    }
}

// ============================================================================
// Listing
// ============================================================================

#[test]
fn test_list_shows_assets_in_order() {
    let scratch = Scratch::with_dataset(&[]);

    let output = scratch.cmd().arg("list").assert().success().get_output().stdout.clone();
    let stdout = String::from_utf8(output).unwrap();

    let raw = stdout.find("raw_amazon_data").unwrap();
    let monthly = stdout.find("monthly_category_sales").unwrap();
    let daily = stdout.find("daily_order_status").unwrap();
    assert!(raw < monthly && raw < daily, "{stdout}");
}

// ============================================================================
// Running
// ============================================================================

#[test]
fn test_run_then_show() {
    let scratch = Scratch::with_dataset(&[("Amazon Sale Report.csv", SALES_CSV)]);

    scratch
        .cmd()
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("3 succeeded, 0 failed, 0 skipped"));

    assert!(scratch.database().is_file());
    assert!(scratch.root().join("data").join("Amazon Sale Report.csv").is_file());

    scratch
        .cmd()
        .args(["show", "monthly_category_sales"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Kurta"))
        .stdout(predicate::str::contains("3 row(s) shown"));
}

#[test]
fn test_run_json_report() {
    let scratch = Scratch::with_dataset(&[("Amazon Sale Report.csv", SALES_CSV)]);

    let output = scratch
        .cmd()
        .args(["run", "--select", "raw_amazon_data", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(report["outcomes"]["raw_amazon_data"]["status"], "succeeded");
    assert_eq!(report["outcomes"]["raw_amazon_data"]["materialization"]["row_count"], 3);
    assert!(report["outcomes"].get("daily_order_status").is_none());
}

#[test]
fn test_missing_source_file_exits_with_failure() {
    let scratch = Scratch::with_dataset(&[("Sale Report.csv", "SKU\n")]);

    scratch
        .cmd()
        .arg("run")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Available files: [Sale Report.csv]"))
        .stderr(predicate::str::contains("Pipeline run failed: 0 succeeded, 1 failed, 2 skipped"));
}

#[test]
fn test_materialize_derived_before_loader_fails() {
    let scratch = Scratch::with_dataset(&[("Amazon Sale Report.csv", SALES_CSV)]);

    scratch
        .cmd()
        .args(["materialize", "daily_order_status"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("requires table 'raw_amazon_data'"));
}

#[test]
fn test_materialize_unknown_asset() {
    let scratch = Scratch::with_dataset(&[]);

    scratch
        .cmd()
        .args(["materialize", "weekly_returns"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unknown asset 'weekly_returns'"));
}

// ============================================================================
// Ad-hoc access
// ============================================================================

#[test]
fn test_sql_json_output() {
    let scratch = Scratch::with_dataset(&[]);

    scratch
        .cmd()
        .args(["sql", "select 42 as answer", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"answer\": 42"));
}

#[test]
fn test_show_without_database_fails() {
    let scratch = Scratch::with_dataset(&[]);

    scratch
        .cmd()
        .args(["show", "raw_amazon_data"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_sql_times_out_while_another_process_holds_the_lock() {
    let scratch = Scratch::with_dataset(&[]);
    let held = verihubs_pipeline::db::DbLock::acquire(&scratch.database(), Duration::from_secs(1)).unwrap();

    scratch
        .cmd()
        .args(["sql", "select 1", "--lock-timeout-secs", "1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Timed out"))
        .stderr(predicate::str::contains("verihubs.duckdb.lock"));

    drop(held);
    scratch.cmd().args(["sql", "select 1"]).assert().success();
}

#[test]
fn test_concurrent_sql_processes_serialize_on_the_lock() {
    let scratch = Scratch::with_dataset(&[]);
    scratch
        .cmd()
        .args(["sql", "create table hits (writer integer)"])
        .assert()
        .success();

    let children: Vec<_> = (0..2)
        .map(|writer| {
            let mut child = std::process::Command::new(assert_cmd::cargo::cargo_bin("verihubs"));
            child
                .current_dir(scratch.root())
                .env("VERIHUBS_SOURCE_DIR", scratch.root().join("dataset"))
                .env("VERIHUBS_DATABASE", scratch.database())
                .env("VERIHUBS_DATA_DIR", scratch.root().join("data"))
                .env("VERIHUBS_LOCK_TIMEOUT_SECS", "30")
                .env("NO_COLOR", "1")
                .args(["sql", &format!("insert into hits values ({writer})")])
                .spawn()
                .unwrap()
        })
        .collect();

    for mut child in children {
        assert!(child.wait().unwrap().success());
    }

    scratch
        .cmd()
        .args(["sql", "select count(*) as n from hits", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"n\": 2"));
}
