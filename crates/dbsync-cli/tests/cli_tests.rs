//! CLI integration tests for dbsync.
//!
//! These tests verify command-line argument parsing, help output,
//! and exit codes for error conditions that occur before any connection.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the dbsync binary.
fn cmd() -> Command {
    Command::cargo_bin("dbsync").unwrap()
}

fn config_file(body: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", body).unwrap();
    file
}

const VALID_CONNECTIONS: &str = r#"
source:
  type: mysql
  host: src.invalid
  database: shop
  user: sync
destination:
  type: postgres
  host: dst.invalid
  database: shop
  user: sync
"#;

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("sync"))
        .stdout(predicate::str::contains("tables"))
        .stdout(predicate::str::contains("describe"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_sync_subcommand_help() {
    cmd()
        .args(["sync", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--table"))
        .stdout(predicate::str::contains("--output"));
}

#[test]
fn test_describe_requires_table() {
    cmd()
        .arg("describe")
        .assert()
        .failure()
        .stderr(predicate::str::contains("<TABLE>"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("dbsync"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_global_flag_defaults() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("[default: info]"))
        .stdout(predicate::str::contains("[default: config.yaml]"));
}

#[test]
fn test_short_config_flag() {
    cmd()
        .args(["-c", "some_config.yaml", "--help"])
        .assert()
        .success();
}

// =============================================================================
// Exit Code Tests
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_7() {
    // Missing file is an IO error, not a config error
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "health-check"])
        .assert()
        .code(7);
}

#[test]
fn test_invalid_yaml_exits_with_code_1() {
    let file = config_file("invalid: yaml: content: [\n");
    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1);
}

#[test]
fn test_empty_config_exits_with_code_1() {
    let file = tempfile::NamedTempFile::new().unwrap();
    cmd()
        .args(["--config", file.path().to_str().unwrap(), "tables"])
        .assert()
        .code(1);
}

#[test]
fn test_missing_required_fields_exits_with_code_1() {
    let file = config_file("source:\n  type: mysql\n");
    cmd()
        .args(["--config", file.path().to_str().unwrap(), "sync"])
        .assert()
        .code(1);
}

#[test]
fn test_unknown_engine_type_exits_with_code_1() {
    let body = VALID_CONNECTIONS.replace("type: postgres", "type: oracle");
    let file = config_file(&body);
    cmd()
        .args(["--config", file.path().to_str().unwrap(), "sync"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("destination.type"));
}

#[test]
fn test_zero_window_size_exits_with_code_1() {
    let body = format!("{}sync:\n  window_size: 0\n", VALID_CONNECTIONS);
    let file = config_file(&body);
    cmd()
        .args(["--config", file.path().to_str().unwrap(), "sync", "--dry-run"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("window_size"));
}

#[test]
fn test_unknown_verbosity_exits_with_code_1() {
    let file = config_file(VALID_CONNECTIONS);
    cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "--verbosity",
            "chatty",
            "tables",
        ])
        .assert()
        .code(1);
}

// =============================================================================
// No Subcommand Tests
// =============================================================================

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}
