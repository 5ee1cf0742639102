#![allow(deprecated)]

/// End-to-end tests for the `metadraft` binary
///
/// These run the maintenance commands against temporary stores and check
/// configuration validation. `serve` is covered in-process by
/// `server_api_test.rs`.
use assert_cmd::Command;
use metadraft::clock::SystemClock;
use metadraft::store::{DraftStore, FsRecordStore, OwnerKey, RetentionPolicy};
use predicates::prelude::*;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
mod common;

fn metadraft(config: &std::path::Path, root: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("metadraft").unwrap();
    cmd.env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(config)
        .arg("--storage-root")
        .arg(root);
    cmd
}

/// Sweep on an empty store reports nothing to do
#[test]
fn test_sweep_empty_store() {
    let (_cfg_dir, config_path) = common::temp_config_file("store:\n  backend: fs\n");
    let root = TempDir::new().unwrap();

    metadraft(&config_path, root.path())
        .arg("sweep")
        .assert()
        .success()
        .stdout(predicate::str::contains("No expired drafts."));
}

/// Inspect shows the latest draft and its payload
#[test]
fn test_inspect_shows_latest_draft() {
    let (_cfg_dir, config_path) = common::temp_config_file("store:\n  backend: fs\n");
    let root = TempDir::new().unwrap();
    let store = DraftStore::new(
        Arc::new(FsRecordStore::open(root.path()).unwrap()),
        Arc::new(SystemClock),
        RetentionPolicy::default(),
    );
    let owner = OwnerKey::from_credential("operator-token");
    let created = store
        .create(&owner, common::doc(json!({"title": "Glacier mass balance"})))
        .unwrap();

    metadraft(&config_path, root.path())
        .args(["inspect", "--session", "operator-token", "--payload"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("{} (latest)", created.id)))
        .stdout(predicate::str::contains("Glacier mass balance"));
}

/// Inspect for an unknown session
#[test]
fn test_inspect_unknown_session() {
    let (_cfg_dir, config_path) = common::temp_config_file("{}\n");
    let root = TempDir::new().unwrap();

    metadraft(&config_path, root.path())
        .args(["inspect", "--session", "nobody"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No drafts for this session."));
}

/// Zero retention is rejected before any command runs
#[test]
fn test_invalid_retention_rejected() {
    let (_cfg_dir, config_path) = common::temp_config_file("store:\n  retention_hours: 0\n");
    let root = TempDir::new().unwrap();

    metadraft(&config_path, root.path())
        .arg("sweep")
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be greater than 0"));
}

/// Malformed YAML fails with a configuration error
#[test]
fn test_malformed_config_rejected() {
    let (_cfg_dir, config_path) = common::temp_config_file("store: [unclosed\n");
    let root = TempDir::new().unwrap();

    metadraft(&config_path, root.path())
        .arg("sweep")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config"));
}

/// Load-time warnings reach stderr before the configured subscriber exists
#[test]
fn test_config_load_warnings_are_logged() {
    let cfg_dir = TempDir::new().unwrap();
    let missing = cfg_dir.path().join("absent.yaml");
    let root = TempDir::new().unwrap();

    metadraft(&missing, root.path())
        .env("METADRAFT_THROTTLE_MS", "not-a-number")
        .arg("sweep")
        .assert()
        .success()
        .stderr(predicate::str::contains("Config file not found"))
        .stderr(predicate::str::contains(
            "Ignoring invalid environment override",
        ));
}

/// Inspect requires a session credential
#[test]
fn test_inspect_requires_session() {
    let mut cmd = Command::cargo_bin("metadraft").unwrap();
    cmd.arg("inspect")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--session"));
}
