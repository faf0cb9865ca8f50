//! Smoke tests for the conformo CLI
//!
//! These tests drive the binary against its built-in `unittests` suite.

#![allow(deprecated)] // Allow deprecated Command::cargo_bin until assert_cmd is updated
#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Get a command for the conformo binary
fn conformo() -> Command {
    let mut cmd = Command::cargo_bin("conformo").expect("conformo binary should exist");
    cmd.arg("--color").arg("never");
    cmd
}

// ============================================================================
// Basic CLI Tests
// ============================================================================

#[test]
fn test_version_flag() {
    Command::cargo_bin("conformo")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.4.0"));
}

#[test]
fn test_help_flag() {
    Command::cargo_bin("conformo")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("list"));
}

#[test]
fn test_no_args_shows_help() {
    Command::cargo_bin("conformo").unwrap().assert().failure();
}

#[test]
fn test_run_subcommand_help() {
    conformo()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--expectations"))
        .stdout(predicate::str::contains("--jobs"));
}

// ============================================================================
// Run Tests
// ============================================================================

#[test]
fn test_run_builtin_suite() {
    conformo()
        .args(["run", "unittests:*"])
        .assert()
        .success()
        .stdout(predicate::str::contains("** Summary **"))
        .stdout(predicate::str::contains("PASSED"));
}

#[test]
fn test_run_with_workers() {
    conformo()
        .args(["run", "unittests:*", "-j", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Failed               =     0"));
}

#[test]
fn test_run_verbose_lists_cases() {
    conformo()
        .args(["run", "unittests:fixture:*", "-v"])
        .assert()
        .success()
        .stdout(predicate::str::contains("SKIP unittests:fixture:skip:{}"))
        .stdout(predicate::str::contains("UNIMPLEMENTED"));
}

#[test]
fn test_run_tap() {
    conformo()
        .args(["run", "unittests:fixture:*", "--format", "tap"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("TAP version 13\n1..4"))
        .stdout(predicate::str::contains("# SKIP"))
        .stdout(predicate::str::contains("# TODO unimplemented"));
}

#[test]
fn test_run_json() {
    let output = conformo()
        .args(["run", "unittests:logging:*", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let doc: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(doc["summary"]["total"], 1);
    assert_eq!(doc["results"]["unittests:logging:status:{}"]["status"], "pass");
}

#[test]
fn test_print_json_lines() {
    conformo()
        .args(["run", "unittests:logging:*", "--print-json", "-q"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""query":"unittests:logging:status:{}""#));
}

#[test]
fn test_expectations_invert_outcome() {
    let temp = TempDir::new().expect("create temp dir");
    let path = temp.path().join("expectations.json");
    fs::write(
        &path,
        r#"[{"query": "unittests:logging:*", "expectation": "fail"},
            {"query": "unittests:query:*", "expectation": "skip"}]"#,
    )
    .expect("write expectations");

    conformo()
        .args(["run", "unittests:logging:*", "unittests:query:*", "--expectations"])
        .arg(&path)
        .assert()
        .failure()
        .stdout(predicate::str::contains("UNEXPECTED PASS"))
        .stdout(predicate::str::contains("FAILED"));
}

#[test]
fn test_invalid_expectations_file() {
    let temp = TempDir::new().expect("create temp dir");
    let path = temp.path().join("bad.json");
    fs::write(&path, "not json").expect("write");

    conformo()
        .args(["run", "unittests:*", "--expectations"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_bad_query_fails() {
    conformo()
        .args(["run", "unittests:query"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_unknown_file_fails() {
    conformo()
        .args(["run", "unittests:nothing:*"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

// ============================================================================
// List Tests
// ============================================================================

#[test]
fn test_list_cases() {
    conformo()
        .args(["list", "unittests:query:roundtrip:*"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"unittests:query:roundtrip:{"text":"s:*"}"#));
}

#[test]
fn test_list_collapsed() {
    conformo()
        .args(["list", "unittests:*", "--collapse", "--expand-through", "multi-file"])
        .assert()
        .success()
        .stdout(predicate::eq("unittests:*\n"));
}
