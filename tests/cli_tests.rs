//! CLI smoke tests.
//!
//! Anything touching the store or the remote host is covered by the mock
//! pipeline tests; these only verify argument handling and fail-fast
//! behavior before connections are opened.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

fn txpipe() -> Command {
    cargo_bin_cmd!("txpipe")
}

#[test]
fn help_lists_polling_overrides() {
    txpipe()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--max-attempts"))
        .stdout(predicate::str::contains("--grace-secs"));
}

#[test]
fn version_prints() {
    txpipe().arg("--version").assert().success();
}

#[test]
fn missing_host_fails_before_any_connection() {
    let dir = TempDir::new().unwrap();
    txpipe()
        .current_dir(dir.path())
        .env("TXPIPE_DB_PASSWORD", "pw")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Remote host not set"));
}

#[test]
fn malformed_scripts_file_fails_before_launch() {
    let dir = TempDir::new().unwrap();
    // Three statements instead of five.
    std::fs::write(
        dir.path().join("scripts.sql"),
        "SELECT 1;\nSELECT 2;\nSELECT 3",
    )
    .unwrap();

    txpipe()
        .current_dir(dir.path())
        .env("TXPIPE_DB_PASSWORD", "pw")
        .args(["--host", "test-env", "--database", "p2p"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected 5 statements"));
}
