//! Command-line behavior and exit codes

use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("config.json");
    fs::write(&path, body).unwrap();
    path
}

fn tap() -> Command {
    let mut cmd = Command::cargo_bin("tap-applovin").unwrap();
    cmd.env_remove("RUST_LOG").env_remove("TAP_APPLOVIN_METRICS_ADDR");
    cmd
}

#[test]
fn test_validate_prints_plan() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        dir.path(),
        r#"{"api_key":"secret-key","start_date":"2024-01-07","end_date":"2024-01-10"}"#,
    );

    let output = tap()
        .args(["validate", "--config"])
        .arg(&config)
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("Config OK"));
    assert!(stdout.contains("Plan: 3 window(s) covering [2024-01-07, 2024-01-10)"));
    assert!(stdout.contains("[2024-01-08, 2024-01-09)"));
    assert!(!stdout.contains("secret-key"));
}

#[test]
fn test_validate_reads_state_bookmark() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        dir.path(),
        r#"{"api_key":"k","start_date":"2024-01-01","end_date":"2024-01-10"}"#,
    );
    let state = dir.path().join("state.json");
    fs::write(
        &state,
        r#"{"schema_version":"1.0.0","bookmarks":{"reports":{"replication_key":"2024-01-09"}}}"#,
    )
    .unwrap();

    let output = tap()
        .args(["validate", "--config"])
        .arg(&config)
        .arg("--state")
        .arg(&state)
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("bookmark 2024-01-09"));
    assert!(stdout.contains("Plan: 1 window(s)"));
}

#[test]
fn test_validate_rejects_invalid_config() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), r#"{"api_key":"k","report_range_days":0}"#);

    tap()
        .args(["validate", "--config"])
        .arg(&config)
        .assert()
        .code(1);
}

#[test]
fn test_missing_config_file_exits_with_config_error() {
    tap()
        .args(["discover", "--config", "/nonexistent/tap-applovin/config.json"])
        .assert()
        .code(1);
}

#[test]
fn test_max_attempts_out_of_range_is_a_usage_error() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), r#"{"api_key":"k"}"#);

    tap()
        .args(["--max-attempts", "0", "validate", "--config"])
        .arg(&config)
        .assert()
        .code(1);
}

#[test]
fn test_discover_prints_catalog() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), r#"{"api_key":"k","columns":"day,hour,cost"}"#);

    let output = tap()
        .args(["discover", "--config"])
        .arg(&config)
        .output()
        .unwrap();

    assert!(output.status.success());
    let catalog: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let stream = &catalog["streams"][0];
    assert_eq!(stream["stream"], "reports");
    assert_eq!(stream["replication_method"], "INCREMENTAL");
    assert_eq!(stream["key_properties"][0], "hour");
}

#[test]
fn test_sync_unreachable_api_exits_after_retries() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        dir.path(),
        r#"{
            "api_key": "k",
            "base_url": "http://127.0.0.1:1",
            "report_range_days": 2,
            "retry": {"max_attempts": 2, "base_delay_ms": 1, "max_delay_ms": 5, "connect_timeout_secs": 2},
            "rate_limit": {"max_requests": 10, "per_secs": 1}
        }"#,
    );
    let state = dir.path().join("state.json");

    let output = tap()
        .args(["sync", "--config"])
        .arg(&config)
        .arg("--state")
        .arg(&state)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(4));
    let stdout = String::from_utf8(output.stdout).unwrap();
    let first: serde_json::Value = serde_json::from_str(stdout.lines().next().unwrap()).unwrap();
    assert_eq!(first["type"], "SCHEMA");
    assert!(!stdout.contains("\"RECORD\""));
    assert!(!state.exists());
}
