//! Concurrent writer behaviour of the two backup layouts.
//!
//! The blob layout rewrites one shared map per operation, so interleaved
//! read-modify-write cycles lose updates. The keyed layout does not.

use std::sync::Arc;

use memo_storage::{BlobBackupStore, KeyedBackupStore, LocalBackupStore, MemoMap, MemoRecord};

// ============================================================================
// Blob layout
// ============================================================================

/// Two saves for distinct studies that both read the blob before either
/// writes back: the second write clobbers the first.
#[tokio::test]
async fn test_blob_interleaved_writes_lose_an_update() {
    let dir = tempfile::tempdir().unwrap();
    let store = BlobBackupStore::new(dir.path());

    // Both writers read the (empty) blob first
    let mut seen_by_a = store.load_map().await.unwrap();
    let mut seen_by_b = store.load_map().await.unwrap();

    seen_by_a.insert("A".to_string(), MemoRecord::new("A", "memo for A"));
    store.store_map(&seen_by_a).await.unwrap();

    seen_by_b.insert("B".to_string(), MemoRecord::new("B", "memo for B"));
    store.store_map(&seen_by_b).await.unwrap();

    let result = store.load_map().await.unwrap();
    assert!(result.contains_key("B"));
    assert!(
        !result.contains_key("A"),
        "the blob layout is expected to lose A's update"
    );
    assert!(store.read("A").await.unwrap().is_none());
}

/// Sequential writes through the store API are safe.
#[tokio::test]
async fn test_blob_sequential_writes_keep_both() {
    let dir = tempfile::tempdir().unwrap();
    let store = BlobBackupStore::new(dir.path());

    store.write("A", "memo for A").await.unwrap();
    store.write("B", "memo for B").await.unwrap();

    assert!(store.read("A").await.unwrap().is_some());
    assert!(store.read("B").await.unwrap().is_some());
}

/// Concurrent saves through the store API may lose updates to each other,
/// but every save succeeds and the blob always stays a readable map.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_blob_concurrent_writes_never_fail_or_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(BlobBackupStore::new(dir.path()));

    for round in 0..50 {
        let mut handles = Vec::new();
        for writer in 0..4 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let uid = format!("{}.{}", round, writer);
                store.write(&uid, "memo").await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let content = std::fs::read_to_string(store.path()).unwrap();
        let map: MemoMap = serde_json::from_str(&content).unwrap();
        assert!(
            (0..4).any(|writer| map.contains_key(&format!("{}.{}", round, writer))),
            "round {} left none of its records",
            round
        );
    }

    // No staging files are left behind
    let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(entries.len(), 1);
}

// ============================================================================
// Keyed layout
// ============================================================================

#[tokio::test]
async fn test_keyed_concurrent_writes_to_distinct_studies() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(KeyedBackupStore::new(dir.path()));

    let mut handles = Vec::new();
    for i in 0..32 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let uid = format!("1.2.{}", i);
            store.write(&uid, &format!("memo {}", i)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for i in 0..32 {
        let record = store.read(&format!("1.2.{}", i)).await.unwrap().unwrap();
        assert_eq!(record.memo, format!("memo {}", i));
    }
}

#[tokio::test]
async fn test_keyed_concurrent_writes_to_same_study() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(KeyedBackupStore::new(dir.path()));

    let mut handles = Vec::new();
    for i in 0..16 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.write("1.2.3", &format!("draft {}", i)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // Last writer wins, but the file is always a complete record
    let record = store.read("1.2.3").await.unwrap().unwrap();
    assert!(record.memo.starts_with("draft "));
}
