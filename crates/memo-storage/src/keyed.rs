//! Per-study backup store.
//!
//! Each study gets its own JSON file and its own write lock, so updates to
//! different studies never touch the same bytes.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::key::{memo_path, MEMO_DIR};
use crate::persist::write_atomic;
use crate::{LocalBackupStore, MemoRecord};

/// Backup store with one file per study.
pub struct KeyedBackupStore {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedBackupStore {
    /// Create a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Path of the backup file for a study.
    pub fn path_for(&self, study_uid: &str) -> PathBuf {
        memo_path(&self.root, study_uid)
    }

    /// Get (or create) the write lock for one study.
    async fn lock_for(&self, study_uid: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(study_uid.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn read_file(&self, path: &Path) -> Result<Option<MemoRecord>> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
        };

        let record = serde_json::from_str(&content).map_err(|e| {
            Error::InvalidInput(format!(
                "Failed to parse backup file {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Some(record))
    }

    async fn write_file(&self, path: &Path, record: &MemoRecord) -> Result<()> {
        let content = serde_json::to_string_pretty(record)?;
        write_atomic(path, content).await
    }

    /// Drop the lock entry for a study once nobody else holds it.
    async fn release(&self, study_uid: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        drop(lock);
        if locks
            .get(study_uid)
            .is_some_and(|held| Arc::strong_count(held) == 1)
        {
            locks.remove(study_uid);
        }
    }

    async fn write_locked(&self, study_uid: &str, memo: &str) -> Result<MemoRecord> {
        let path = self.path_for(study_uid);

        // A corrupt previous file is replaced rather than blocking the write
        let record = match self.read_file(&path).await {
            Ok(Some(existing)) => existing.revise(memo),
            _ => MemoRecord::new(study_uid, memo),
        };

        self.write_file(&path, &record).await?;

        info!(
            study_uid = %study_uid,
            file_path = %path.display(),
            "BACKUP_WRITE: Memo written to local backup"
        );
        Ok(record)
    }

    async fn delete_locked(&self, study_uid: &str) -> Result<()> {
        let path = self.path_for(study_uid);
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!(study_uid = %study_uid, "BACKUP_DELETE: Memo removed from local backup");
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(study_uid = %study_uid, "BACKUP_DELETE: No backup to remove");
            }
            Err(e) => {
                return Err(Error::Internal(format!(
                    "Failed to delete backup file {}: {}",
                    path.display(),
                    e
                )))
            }
        }

        Ok(())
    }
}

#[async_trait]
impl LocalBackupStore for KeyedBackupStore {
    async fn write(&self, study_uid: &str, memo: &str) -> Result<MemoRecord> {
        let lock = self.lock_for(study_uid).await;
        let result = {
            let _guard = lock.lock().await;
            self.write_locked(study_uid, memo).await
        };
        self.release(study_uid, lock).await;
        result
    }

    async fn read(&self, study_uid: &str) -> Result<Option<MemoRecord>> {
        let path = self.path_for(study_uid);
        let record = self.read_file(&path).await?;

        debug!(study_uid = %study_uid, found = record.is_some(), "BACKUP_READ");
        Ok(record)
    }

    async fn delete(&self, study_uid: &str) -> Result<()> {
        let lock = self.lock_for(study_uid).await;
        let result = {
            let _guard = lock.lock().await;
            self.delete_locked(study_uid).await
        };
        self.release(study_uid, lock).await;
        result
    }

    async fn clear_all(&self) -> Result<()> {
        let dir = self.root.join(MEMO_DIR);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(Error::Io(e)),
        }

        info!(path = %dir.display(), "All memos cleared from local backup");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyedBackupStore::new(dir.path());

        let written = store.write("1.2.3", "follow-up needed").await.unwrap();
        let read = store.read("1.2.3").await.unwrap().unwrap();

        assert_eq!(read, written);
        assert!(store.path_for("1.2.3").exists());
    }

    #[tokio::test]
    async fn test_update_preserves_created_at() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyedBackupStore::new(dir.path());

        let first = store.write("1.2.3", "first").await.unwrap();
        let second = store.write("1.2.3", "second").await.unwrap();

        assert_eq!(second.memo, "second");
        assert_eq!(second.created_at, first.created_at);
    }

    #[tokio::test]
    async fn test_empty_memo_is_stored() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyedBackupStore::new(dir.path());

        store.write("1.2.3", "").await.unwrap();
        let read = store.read("1.2.3").await.unwrap().unwrap();
        assert_eq!(read.memo, "");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyedBackupStore::new(dir.path());

        store.write("1.2.3", "memo").await.unwrap();
        store.delete("1.2.3").await.unwrap();
        store.delete("1.2.3").await.unwrap();

        assert!(store.read("1.2.3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyedBackupStore::new(dir.path());

        let path = store.path_for("1.2.3");
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        fs::write(&path, "garbage").await.unwrap();

        assert!(matches!(
            store.read("1.2.3").await,
            Err(Error::InvalidInput(_))
        ));

        // ...but a write still goes through
        store.write("1.2.3", "recovered").await.unwrap();
        assert_eq!(store.read("1.2.3").await.unwrap().unwrap().memo, "recovered");
    }

    #[tokio::test]
    async fn test_lock_entries_are_released() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(KeyedBackupStore::new(dir.path()));

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let uid = format!("1.2.{}", i % 4);
                store.write(&uid, "memo").await.unwrap();
                store.delete(&uid).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(store.locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_clear_all_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyedBackupStore::new(dir.path());

        store.write("1.2.3", "a").await.unwrap();
        store.write("4.5.6", "b").await.unwrap();
        store.clear_all().await.unwrap();

        assert!(store.read("1.2.3").await.unwrap().is_none());
        assert!(store.read("4.5.6").await.unwrap().is_none());
        store.clear_all().await.unwrap();
    }
}
