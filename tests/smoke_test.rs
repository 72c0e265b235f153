//! Smoke tests for the sbr CLI.
//!
//! These tests verify basic CLI functionality:
//! - `sbr --version` outputs version info
//! - `sbr --help` outputs help text
//! - a missing subcommand is a usage error

use assert_cmd::Command;
use predicates::prelude::*;

/// Get a Command for the sbr binary.
fn sbr() -> Command {
    Command::new(env!("CARGO_BIN_EXE_sbr"))
}

#[test]
fn test_version_flag() {
    sbr()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sbr"))
        .stdout(predicate::str::contains("0.1.0"));
}

#[test]
fn test_help_flag() {
    sbr()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("Commands:"))
        .stdout(predicate::str::contains("loopback"));
}

#[test]
fn test_no_args_is_usage_error() {
    sbr()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_config_help() {
    sbr()
        .args(["config", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("show"));
}
