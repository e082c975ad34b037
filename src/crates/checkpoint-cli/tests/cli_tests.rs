//! Integration tests for the checkpoint CLI
//!
//! Each test seeds a SQLite database in a temporary directory through the
//! library, then runs the `checkpoint` binary against it.

use checkpoint_store::{
    Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSource, CheckpointStore,
    SqliteDocumentStore, StoreConfig,
};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn database_url(dir: &Path) -> String {
    format!("sqlite://{}", dir.join("checkpoints.db").display())
}

/// Seed thread `t1` with three root checkpoints and one in namespace `sub`
async fn seed(url: &str, config: StoreConfig) {
    let backend = SqliteDocumentStore::connect(url).await.unwrap();
    let store: CheckpointStore = CheckpointStore::with_config(backend, config).unwrap();

    let root = CheckpointConfig::new("t1");
    let mut parent: Option<String> = None;
    for step in 1..=3 {
        let id = format!("cp-{step}");
        let mut metadata = CheckpointMetadata::new()
            .with_source(CheckpointSource::Loop)
            .with_step(step);
        if let Some(parent_id) = parent.take() {
            metadata = metadata.with_parent("", parent_id);
        }
        let saved = store
            .put(
                &root,
                Checkpoint::empty(id.clone()).with_ts_millis(i64::from(step) * 1000),
                metadata,
                HashMap::new(),
            )
            .await
            .unwrap();
        if step == 3 {
            store
                .put_writes(&saved, vec![("messages".to_string(), serde_json::json!("hi"))], "task-a")
                .await
                .unwrap();
        }
        parent = Some(id);
    }

    store
        .put(
            &CheckpointConfig::new("t1").with_checkpoint_ns("sub"),
            Checkpoint::empty("cp-sub").with_ts_millis(500),
            CheckpointMetadata::new(),
            HashMap::new(),
        )
        .await
        .unwrap();
}

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_checkpoint"))
        .args(args)
        .env_remove("CHECKPOINT_CONFIG")
        .env_remove("CHECKPOINT_DATABASE_URL")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run checkpoint binary")
}

fn stdout_lines(output: &Output) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("list prints JSON lines"))
        .collect()
}

#[tokio::test]
async fn test_list_prints_newest_first() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let url = database_url(dir.path());
    seed(&url, StoreConfig::default()).await;

    let output = run(&["--database", &url, "list", "t1"]);
    assert!(output.status.success());

    let lines = stdout_lines(&output);
    let ids: Vec<_> = lines.iter().map(|l| l["checkpoint_id"].clone()).collect();
    assert_eq!(ids, vec!["cp-3", "cp-2", "cp-1", "cp-sub"]);
    assert_eq!(lines[0]["pending_writes"], 1);
    assert_eq!(lines[0]["parent"], "cp-2");
    assert_eq!(lines[0]["source"], "loop");
}

#[tokio::test]
async fn test_list_options() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let url = database_url(dir.path());
    seed(&url, StoreConfig::default()).await;

    let output = run(&["--database", &url, "list", "t1", "--namespace", "", "--before", "cp-3", "--limit", "1"]);
    assert!(output.status.success());

    let lines = stdout_lines(&output);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["checkpoint_id"], "cp-2");
}

#[tokio::test]
async fn test_show_latest_and_missing() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let url = database_url(dir.path());
    seed(&url, StoreConfig::default()).await;

    let output = run(&["--database", &url, "show", "t1"]);
    assert!(output.status.success());
    let tuple: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(tuple["checkpoint"]["id"], "cp-3");
    assert_eq!(tuple["pending_writes"][0]["channel"], "messages");
    assert_eq!(tuple["pending_writes"][0]["value"], "hi");

    let output = run(&["--database", &url, "show", "t1", "--checkpoint", "cp-404"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("No checkpoint found"));
}

#[tokio::test]
async fn test_delete_thread() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let url = database_url(dir.path());
    seed(&url, StoreConfig::default()).await;

    let output = run(&["--database", &url, "delete", "t1"]);
    assert!(output.status.success());

    let output = run(&["--database", &url, "list", "t1"]);
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
}

#[tokio::test]
async fn test_config_file_supplies_prefix_and_database() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let url = database_url(dir.path());
    seed(&url, StoreConfig::new().with_key_prefix("agent")).await;

    let config_path = dir.path().join("store.yaml");
    fs::write(&config_path, format!("key_prefix: agent\ndatabase_url: {url}\n"))
        .expect("Failed to write config");

    let output = run(&["--config", config_path.to_str().unwrap(), "list", "t1", "--limit", "2"]);
    assert!(output.status.success());
    assert_eq!(stdout_lines(&output).len(), 2);

    // default prefix sees nothing in the same database
    let output = run(&["--database", &url, "list", "t1"]);
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn test_invalid_config_is_reported() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = dir.path().join("store.yaml");
    fs::write(&config_path, "scan_page_size: 0\n").expect("Failed to write config");

    let output = run(&["--config", config_path.to_str().unwrap(), "list", "t1"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to load configuration"));
}
