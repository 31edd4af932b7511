//! Directory-backed storage shared by two independently opened handles, as
//! two processes would share it.

use std::time::Duration;

use serde_json::json;
use tabsync_core::config::SyncOptions;
use tabsync_sync::{DirStorage, HostStore, MemoryStore, SyncConfig, SyncCoordinator, Tab, Transport};

#[test]
fn saved_state_visible_to_second_handle() {
    let dir = tempfile::tempdir().unwrap();
    let writer = Tab::new(DirStorage::open(dir.path()).unwrap());
    let reader = Tab::new(DirStorage::open(dir.path()).unwrap());

    writer.save_state("app", &json!({"todos": ["a"]})).unwrap();
    assert_eq!(reader.fetch_state("app").unwrap(), Some(json!({"todos": ["a"]})));
}

#[test]
fn unusable_directory_fails_setup() {
    let dir = tempfile::tempdir().unwrap();
    let storage = DirStorage::open(dir.path()).unwrap();
    // Remove the directory behind the storage's back
    std::fs::remove_dir_all(dir.path()).unwrap();

    let result = SyncCoordinator::new(SyncConfig::default(), Tab::new(storage));
    assert!(matches!(
        result,
        Err(tabsync_core::TabsyncError::StorageUnavailable)
    ));
}

#[test]
fn late_joiner_reads_file_state() {
    let dir = tempfile::tempdir().unwrap();
    let first = SyncCoordinator::new(
        SyncConfig::default(),
        Tab::new(DirStorage::open(dir.path()).unwrap()),
    )
    .unwrap();
    first.save_state(&json!({"theme": "dark"})).unwrap();

    let second = SyncCoordinator::new(
        SyncConfig::default(),
        Tab::new(DirStorage::open(dir.path()).unwrap()),
    )
    .unwrap();
    let store = MemoryStore::default();
    assert!(second.load_initial(&store).unwrap());
    assert_eq!(store.state(), json!({"theme": "dark"}));
}

#[tokio::test]
async fn watcher_delivers_other_handle_updates() {
    let dir = tempfile::tempdir().unwrap();
    let options = SyncOptions::default().with_key("shared");
    let writer = Tab::new(DirStorage::open(dir.path()).unwrap());
    let reader = Tab::new(DirStorage::open(dir.path()).unwrap());

    let mut rx = reader.subscribe(&options.key).unwrap();
    let mut own = writer.subscribe(&options.key).unwrap();
    writer.save_state(&options.key, &json!({"n": 1})).unwrap();

    let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("update delivered in time");
    assert_eq!(received, Some(json!({"n": 1})));

    // The writer's own watcher sees the file change but drops its own echo
    let echo = tokio::time::timeout(Duration::from_millis(300), own.recv()).await;
    assert!(echo.is_err());
}
