//! CLI tests for the `opsflow` binary.
//!
//! Spawns the binary and verifies output and exit codes for the deterministic
//! subcommands and for runs that cannot start.

use std::fs;
use std::process::Command;

use opsflow::exit_codes;
use opsflow::test_support::{RunDir, catalog, record};
use serde_json::Value;

fn opsflow() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_opsflow"));
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn price_prints_reference_price_as_json() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = opsflow()
        .current_dir(temp.path())
        .args(["price", "--cost", "10", "--shipping", "5"])
        .output()
        .expect("opsflow price");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let value: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(value["recommended_price"], 25.0);
    assert_eq!(value["margin_percentage"], 25.9);
}

#[test]
fn price_rejects_negative_cost() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = opsflow()
        .current_dir(temp.path())
        .args(["price", "--cost=-1", "--shipping", "5"])
        .output()
        .expect("opsflow price");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid price input"));
}

#[test]
fn price_rejects_overflowing_costs() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = opsflow()
        .current_dir(temp.path())
        .args(["price", "--cost", "1e308", "--shipping", "1e308"])
        .output()
        .expect("opsflow price");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid price input"));
}

#[test]
fn price_honors_config_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("opsflow.toml"), "min_margin = 0.9\n").expect("write config");
    let output = opsflow()
        .current_dir(temp.path())
        .args(["price", "--cost", "10", "--shipping", "5"])
        .output()
        .expect("opsflow price");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid configuration"));
}

#[test]
fn eligible_prints_filtered_catalog() {
    let mut rows = catalog(3, 20);
    rows.insert(1, record("LOW001", 4));
    let dir = RunDir::new(&rows, &[]).expect("run dir");

    let output = opsflow()
        .current_dir(dir.path())
        .args(["eligible", "--catalog"])
        .arg(dir.catalog_path())
        .output()
        .expect("opsflow eligible");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let skus: Vec<&str> = stdout
        .lines()
        .skip(1)
        .filter_map(|line| line.split(',').next())
        .collect();
    assert_eq!(skus, vec!["SKU001", "SKU002", "SKU003"]);
}

#[test]
fn run_with_missing_catalog_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let status = opsflow()
        .current_dir(temp.path())
        .args(["run", "--catalog", "nope.csv", "--orders", "nope.csv"])
        .status()
        .expect("opsflow run");

    assert_eq!(status.code(), Some(exit_codes::INVALID));
    assert!(!temp.path().join("out").exists());
}

/// With an oracle command that always fails, the run ends `failed` and still
/// records why in `run.json`.
#[cfg(unix)]
#[test]
fn run_with_failing_oracle_exits_failed_and_writes_summary() {
    let dir = RunDir::new(&catalog(12, 20), &[]).expect("run dir");
    fs::write(
        dir.path().join("opsflow.toml"),
        "consult_manager = false\noracle_max_attempts = 1\n\n[oracle]\nreasoning_command = [\"false\"]\ncreative_command = [\"false\"]\n",
    )
    .expect("write config");

    let status = opsflow()
        .current_dir(dir.path())
        .args(["run", "--catalog", "catalog.csv", "--orders", "orders.csv"])
        .status()
        .expect("opsflow run");

    assert_eq!(status.code(), Some(exit_codes::FAILED));
    let summary: Value =
        serde_json::from_str(&dir.read_artifact("run.json").expect("run.json")).expect("json");
    assert_eq!(summary["failure"]["kind"], "oracle_unavailable");
    assert_eq!(summary["failure"]["stage"], "sourcing");
}

#[test]
fn init_writes_default_config_once() {
    let temp = tempfile::tempdir().expect("tempdir");
    let status = opsflow()
        .current_dir(temp.path())
        .arg("init")
        .status()
        .expect("opsflow init");
    assert_eq!(status.code(), Some(exit_codes::OK));

    let path = temp.path().join("opsflow.toml");
    let written = fs::read_to_string(&path).expect("config");
    assert!(written.contains("selection_size = 10"));
    assert!(written.contains("[oracle]"));

    fs::write(&path, "min_stock = 3\n").expect("edit config");
    opsflow()
        .current_dir(temp.path())
        .arg("init")
        .status()
        .expect("opsflow init");
    assert_eq!(fs::read_to_string(&path).expect("config"), "min_stock = 3\n");
}
