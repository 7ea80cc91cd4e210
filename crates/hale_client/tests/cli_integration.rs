//! Integration tests for the hale-chat binary.
//! Uses assert_cmd to run the binary, a real temp config, and an in-process
//! answer service on its own thread.

mod common;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use common::{MockService, Reply};
use predicates::prelude::*;
use serde_json::json;
use std::io::Write as _;

/// Write a minimal YAML config to a temp file pointing at `base_url`.
fn write_config(dir: &tempfile::TempDir, base_url: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.yaml");
    let mut f = std::fs::File::create(&path).unwrap();
    writeln!(
        f,
        "server:\n  base_url: {}\n  health_interval_secs: 60\n  request_timeout_secs: 5",
        base_url
    )
    .unwrap();
    path
}

fn aspirin_service() -> String {
    let mock = MockService::new();
    mock.push(Reply::answer(json!({
        "answer": "Aspirin is used as a pain reliever.",
        "sources": [
            { "content": "Aspirin monograph", "metadata": { "source": "pharmacology.pdf" } }
        ]
    })));
    common::spawn_in_thread(mock)
}

#[test]
fn prints_answer_and_sources() {
    let base = aspirin_service();
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, &base);

    let mut cmd = Command::from(cargo_bin_cmd!("hale-chat"));
    cmd.arg("--config")
        .arg(&config_path)
        .arg("--yes")
        .write_stdin("What is aspirin used for?\n");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Medical Disclaimer"))
        .stdout(predicate::str::contains("Connected to"))
        .stdout(predicate::str::contains("Aspirin is used as a pain reliever."))
        .stdout(predicate::str::contains("Sources: 1 references"))
        .stdout(predicate::str::contains("pharmacology.pdf"))
        .stdout(predicate::str::contains("Aspirin monograph"));
}

#[test]
fn metrics_command_shows_request_statistics() {
    let base = aspirin_service();
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, &base);

    // Without --yes the first line acknowledges the disclaimer.
    let mut cmd = Command::from(cargo_bin_cmd!("hale-chat"));
    cmd.arg("--config")
        .arg(&config_path)
        .write_stdin("\nWhat is aspirin used for?\n/metrics\n/status\n/quit\n");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Performance Metrics"))
        .stdout(predicate::str::contains("Total Requests:    1"))
        .stdout(predicate::str::contains("Success Rate:      100%"))
        .stdout(predicate::str::contains("Server CPU:        12.5%"))
        .stdout(predicate::str::contains("Online (last checked"));
}

#[test]
fn config_from_env_var_and_url_override() {
    let base = aspirin_service();
    let dir = tempfile::tempdir().unwrap();
    // The file points nowhere; --url wins.
    let config_path = write_config(&dir, &common::dead_url());

    let mut cmd = Command::from(cargo_bin_cmd!("hale-chat"));
    cmd.env("HALE_CONFIG", &config_path)
        .arg("--url")
        .arg(&base)
        .arg("--yes")
        .write_stdin("What is aspirin used for?\n");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Aspirin is used as a pain reliever."));
}

#[test]
fn offline_service_does_not_send_questions() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, &common::dead_url());

    let mut cmd = Command::from(cargo_bin_cmd!("hale-chat"));
    cmd.arg("--config")
        .arg(&config_path)
        .arg("--yes")
        .write_stdin("hello\n");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("is offline"))
        .stdout(predicate::str::contains("question not sent"));
}

#[test]
fn missing_explicit_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.yaml");

    let mut cmd = Command::from(cargo_bin_cmd!("hale-chat"));
    cmd.arg("--config").arg(&missing).write_stdin("");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));
}
