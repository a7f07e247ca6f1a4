use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use kaiwa::session::SessionEvent;
use kaiwa::storage::SqliteStorage;
use tokio::sync::broadcast;

#[allow(dead_code)]
pub fn create_temp_storage() -> (Arc<SqliteStorage>, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let db_path = tmp.path().join("chats.db");
    let storage =
        SqliteStorage::new_with_path(db_path).expect("failed to create sqlite storage with path");
    (Arc::new(storage), tmp)
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Receive the next session event, failing the test after two seconds.
#[allow(dead_code)]
pub async fn next_event(events: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for session event")
        .expect("event channel closed")
}

/// Assert that no session event arrives within the given window.
#[allow(dead_code)]
pub async fn assert_no_event(events: &mut broadcast::Receiver<SessionEvent>, window: Duration) {
    match tokio::time::timeout(window, events.recv()).await {
        Err(_) => {}
        Ok(event) => panic!("unexpected session event: {:?}", event),
    }
}

/// Poll a predicate until it holds, failing the test after two seconds.
#[allow(dead_code)]
pub async fn wait_until<F: FnMut() -> bool>(mut predicate: F, what: &str) {
    for _ in 0..200 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}
