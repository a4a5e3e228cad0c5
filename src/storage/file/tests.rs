use super::*;
use crate::storage::{LogBackend, SnapshotBackend};
use tempfile::TempDir;

async fn temp_log_backend() -> (FileLogBackend, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let backend = FileLogBackend::open(temp_dir.path().join("events.ndjson"))
        .await
        .unwrap();
    (backend, temp_dir)
}

async fn temp_snapshot_backend() -> (FileSnapshotBackend, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let backend = FileSnapshotBackend::open(temp_dir.path().join("cart.json"))
        .await
        .unwrap();
    (backend, temp_dir)
}

#[tokio::test]
async fn test_append_and_read_lines_in_order() {
    let (backend, _temp) = temp_log_backend().await;

    backend.append_line("one").await.unwrap();
    backend.append_line("two").await.unwrap();
    backend.append_line("three").await.unwrap();

    let lines = backend.read_lines().await.unwrap();
    assert_eq!(lines, vec!["one", "two", "three"]);
}

#[tokio::test]
async fn test_read_lines_empty_file() {
    let (backend, _temp) = temp_log_backend().await;
    assert!(backend.read_lines().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_read_lines_missing_file() {
    let (backend, temp) = temp_log_backend().await;
    tokio::fs::remove_file(temp.path().join("events.ndjson"))
        .await
        .unwrap();

    // A vanished file reads as empty, not as an error.
    assert!(backend.read_lines().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_lines_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("events.ndjson");

    let backend = FileLogBackend::open(&path).await.unwrap();
    backend.append_line("persisted").await.unwrap();
    drop(backend);

    let reopened = FileLogBackend::open(&path).await.unwrap();
    assert_eq!(reopened.read_lines().await.unwrap(), vec!["persisted"]);

    reopened.append_line("appended later").await.unwrap();
    assert_eq!(
        reopened.read_lines().await.unwrap(),
        vec!["persisted", "appended later"]
    );
}

#[tokio::test]
async fn test_open_creates_parent_directories() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("deep").join("log.ndjson");

    let backend = FileLogBackend::open(&path).await.unwrap();
    backend.append_line("entry").await.unwrap();

    assert!(path.exists());
}

#[tokio::test]
async fn test_snapshot_load_missing_returns_none() {
    let (backend, _temp) = temp_snapshot_backend().await;
    assert!(backend.load().await.unwrap().is_none());
}

#[tokio::test]
async fn test_snapshot_store_and_load() {
    let (backend, _temp) = temp_snapshot_backend().await;

    backend.store("{\"version\": 0}").await.unwrap();
    assert_eq!(
        backend.load().await.unwrap().as_deref(),
        Some("{\"version\": 0}")
    );
}

#[tokio::test]
async fn test_snapshot_store_replaces_document() {
    let (backend, _temp) = temp_snapshot_backend().await;

    backend.store("first").await.unwrap();
    backend.store("second").await.unwrap();

    assert_eq!(backend.load().await.unwrap().as_deref(), Some("second"));
}

#[tokio::test]
async fn test_snapshot_store_leaves_no_temp_file() {
    let (backend, temp) = temp_snapshot_backend().await;

    backend.store("{}").await.unwrap();

    assert!(temp.path().join("cart.json").exists());
    assert!(!temp.path().join("cart.tmp").exists());
}
