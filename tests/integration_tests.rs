//! Integration tests for the gwm CLI
//!
//! These tests exercise the CLI commands end-to-end using assert_cmd, on the
//! sales order schema shipped in `schemas/order.yaml`.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const ORDER_SCHEMA: &str = include_str!("../schemas/order.yaml");

/// A temp directory holding the order schema and a database path
struct TestWindow {
    tmp: TempDir,
    schema: PathBuf,
    database: PathBuf,
}

/// Helper to get a gwm command isolated from the caller's environment
fn gwm_in(dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("gwm").unwrap();
    cmd.current_dir(dir)
        .env_remove("GWM_SCHEMA")
        .env_remove("GWM_DATABASE")
        .env_remove("GWM_LOG")
        .env_remove("RUST_LOG");
    cmd
}

impl TestWindow {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let schema = tmp.path().join("order.yaml");
        fs::write(&schema, ORDER_SCHEMA).unwrap();
        let database = tmp.path().join("orders.db");
        Self {
            tmp,
            schema,
            database,
        }
    }

    /// Helper to create an initialized window
    fn initialized() -> Self {
        let window = Self::new();
        window.gwm().arg("init").assert().success();
        window
    }

    fn gwm(&self) -> Command {
        let mut cmd = gwm_in(self.tmp.path());
        cmd.arg("--schema")
            .arg(&self.schema)
            .arg("--database")
            .arg(&self.database);
        cmd
    }

    fn show_json(&self, index: usize) -> serde_json::Value {
        let output = self
            .gwm()
            .args(["show", "--index", &index.to_string(), "-f", "json"])
            .output()
            .unwrap();
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        serde_json::from_slice(&output.stdout).unwrap()
    }
}

// ============================================================================
// CLI Basic Tests
// ============================================================================

#[test]
fn test_help_displays() {
    gwm_in(std::env::temp_dir().as_path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Generic Window Model"));
}

#[test]
fn test_missing_schema_is_reported() {
    let tmp = TempDir::new().unwrap();
    gwm_in(tmp.path())
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No window schema given"));
}

#[test]
fn test_invalid_schema_is_reported() {
    let window = TestWindow::new();
    fs::write(&window.schema, ORDER_SCHEMA.replace("[Qty, Price]", "[Qty, Cost]")).unwrap();
    window
        .gwm()
        .arg("sql")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cost"));
}

// ============================================================================
// SQL and init
// ============================================================================

#[test]
fn test_sql_prints_selects_for_every_table() {
    let window = TestWindow::new();
    window
        .gwm()
        .arg("sql")
        .assert()
        .success()
        .stdout(predicate::str::contains("FROM c_order t"))
        .stdout(predicate::str::contains("FROM c_orderline t"))
        .stdout(predicate::str::contains("AS c_bpartner_id__display"));
}

#[test]
fn test_sql_ddl() {
    let window = TestWindow::new();
    window
        .gwm()
        .args(["sql", "--ddl"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "CREATE TABLE IF NOT EXISTS c_order (",
        ))
        .stdout(predicate::str::contains("c_order_id INTEGER PRIMARY KEY AUTOINCREMENT"))
        .stdout(predicate::str::contains("CREATE TABLE IF NOT EXISTS c_bpartner ("));
}

#[test]
fn test_init_creates_database() {
    let window = TestWindow::new();
    window
        .gwm()
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created tables for window Order"));
    assert!(window.database.exists());
}

#[test]
fn test_commands_require_initialized_database() {
    let window = TestWindow::new();
    window
        .gwm()
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("gwm init"));
}

#[test]
fn test_init_save_config_lets_commands_run_without_flags() {
    let window = TestWindow::new();
    window
        .gwm()
        .args(["init", "--save-config"])
        .assert()
        .success();
    assert!(window.tmp.path().join(".gwm/config.yaml").exists());

    let nested = window.tmp.path().join("sub");
    fs::create_dir_all(&nested).unwrap();
    gwm_in(&nested)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No records found."));

    // A second save without --force is refused
    window
        .gwm()
        .args(["init", "--save-config"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
}

// ============================================================================
// Records
// ============================================================================

#[test]
fn test_list_empty() {
    let window = TestWindow::initialized();
    window
        .gwm()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No records found."));
    window
        .gwm()
        .args(["list", "--count"])
        .assert()
        .success()
        .stdout("0\n");
}

#[test]
fn test_new_record_calculates_total() {
    let window = TestWindow::initialized();
    window
        .gwm()
        .args([
            "new",
            "--set",
            "DocumentNo=SO-1",
            "--set",
            "Qty=2",
            "--set",
            "Price=5",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved record 1 at index 0"))
        .stdout(predicate::str::contains("Total: 10 (calculated)"));

    let record = window.show_json(0);
    assert_eq!(record["OrderId"], 1);
    assert_eq!(record["DocumentNo"], "SO-1");
    assert_eq!(record["Total"], "10");
    assert_eq!(record["Paid"], false);
}

#[test]
fn test_list_formats() {
    let window = TestWindow::initialized();
    for doc in ["SO-1", "SO-2"] {
        window
            .gwm()
            .args(["-q", "new", "--set", &format!("DocumentNo={}", doc)])
            .assert()
            .success();
    }

    window
        .gwm()
        .args(["list", "-f", "csv"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("index,id,title,summary"))
        .stdout(predicate::str::contains("1,2,Order SO-2"));

    window
        .gwm()
        .args(["list", "-f", "id"])
        .assert()
        .success()
        .stdout("1\n2\n");

    let output = window.gwm().args(["list", "-f", "json"]).output().unwrap();
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 2);
    assert_eq!(rows[0]["title"], "Order SO-1");

    window
        .gwm()
        .args(["list", "--limit", "1", "-f", "id"])
        .assert()
        .success()
        .stdout("1\n");
}

#[test]
fn test_edit_prints_events_and_saves() {
    let window = TestWindow::initialized();
    window
        .gwm()
        .args(["-q", "new", "--set", "Qty=2", "--set", "Price=5"])
        .assert()
        .success();

    window
        .gwm()
        .args(["edit", "--index", "0", "--set", "Price=7"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Price: 5 → 7"))
        .stdout(predicate::str::contains("Total: 10 → 14"))
        .stdout(predicate::str::contains("Saved record 1 at index 0"));

    assert_eq!(window.show_json(0)["Total"], "14");
}

#[test]
fn test_edit_dry_run_does_not_save() {
    let window = TestWindow::initialized();
    window
        .gwm()
        .args(["-q", "new", "--set", "Price=5"])
        .assert()
        .success();

    window
        .gwm()
        .args(["edit", "--set", "Price=9", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry run"));

    assert_eq!(window.show_json(0)["Price"], "5");
}

#[test]
fn test_edit_read_only_property_is_ignored() {
    let window = TestWindow::initialized();
    window
        .gwm()
        .args(["-q", "new", "--set", "Qty=2", "--set", "Price=5"])
        .assert()
        .success();

    window
        .gwm()
        .args(["edit", "--set", "Total=99"])
        .assert()
        .success()
        .stderr(predicate::str::contains("read-only"));

    assert_eq!(window.show_json(0)["Total"], "10");
}

#[test]
fn test_edit_unknown_property_fails() {
    let window = TestWindow::initialized();
    window.gwm().args(["-q", "new"]).assert().success();
    window
        .gwm()
        .args(["edit", "--set", "Colour=red"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Colour"));
}

#[test]
fn test_edit_requires_an_edit() {
    let window = TestWindow::initialized();
    window
        .gwm()
        .arg("edit")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Nothing to edit"));
}

#[test]
fn test_grid_rows_are_saved_and_removed() {
    let window = TestWindow::initialized();
    window
        .gwm()
        .args([
            "new",
            "--set",
            "DocumentNo=SO-1",
            "--add-row",
            "Lines",
            "--add-row",
            "Lines",
            "--grid-set",
            "Lines:0:Product=Bolt",
            "--grid-set",
            "Lines:0:LinePrice=3",
            "--grid-set",
            "Lines:1:Product=Nut",
            "--grid-set",
            "Lines:1:LineQty=4",
            "--grid-set",
            "Lines:1:LinePrice=2",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Lines row"));

    let record = window.show_json(0);
    let lines = record["Lines"].as_array().unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["Product"], "Bolt");
    assert_eq!(lines[0]["LineNet"], "3");
    assert_eq!(lines[1]["LineNet"], "8");
    assert_eq!(lines[1]["OrderRef"], 1);

    window
        .gwm()
        .args(["-q", "edit", "--remove-row", "Lines:0"])
        .assert()
        .success();

    let record = window.show_json(0);
    let lines = record["Lines"].as_array().unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["Product"], "Nut");
}

#[test]
fn test_grid_row_out_of_range() {
    let window = TestWindow::initialized();
    window.gwm().args(["-q", "new"]).assert().success();
    window
        .gwm()
        .args(["edit", "--grid-set", "Lines:3:Product=Bolt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("there is no row 3"));
}

#[test]
fn test_new_as_copy_skips_key() {
    let window = TestWindow::initialized();
    window
        .gwm()
        .args(["-q", "new", "--set", "DocumentNo=SO-1", "--set", "Price=5"])
        .assert()
        .success();

    window
        .gwm()
        .args(["new", "--copy-from", "1", "--set", "DocumentNo=SO-1-copy"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved record 2 at index 1"));

    let copy = window.show_json(1);
    assert_eq!(copy["OrderId"], 2);
    assert_eq!(copy["DocumentNo"], "SO-1-copy");
    assert_eq!(copy["Price"], "5");
}

#[test]
fn test_new_copy_from_missing_record_fails() {
    let window = TestWindow::initialized();
    window
        .gwm()
        .args(["new", "--copy-from", "42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Record not found"));
}

#[test]
fn test_show_out_of_range_index() {
    let window = TestWindow::initialized();
    window
        .gwm()
        .args(["show", "--index", "5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid record index: 5"));
}

#[test]
fn test_show_pretty() {
    let window = TestWindow::initialized();
    window
        .gwm()
        .args(["-q", "new", "--set", "DocumentNo=SO-9", "--set", "Qty=3", "--set", "Price=2"])
        .assert()
        .success();

    window
        .gwm()
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("Order SO-9 [0]"))
        .stdout(predicate::str::contains("3 x 2 = 6"))
        .stdout(predicate::str::contains("Lines (0):"));
}
