//! Single-blob backup store.
//!
//! All memos live in one JSON object stored under [`STORAGE_KEY`]. Each
//! operation reads the entire map, mutates it in memory, and (for writes and
//! deletes) rewrites the entire map. There is no per-key atomicity: two
//! writers that both read before either writes back will lose one update.
//! [`KeyedBackupStore`](crate::KeyedBackupStore) does not have this problem.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::persist::write_atomic;
use crate::{LocalBackupStore, MemoRecord};

/// Well-known key the memo map is stored under.
pub const STORAGE_KEY: &str = "ohif_study_memos";

/// The serialized map, keyed by Study Instance UID.
pub type MemoMap = BTreeMap<String, MemoRecord>;

/// Backup store keeping every memo in one shared JSON blob.
pub struct BlobBackupStore {
    path: PathBuf,
}

impl BlobBackupStore {
    /// Create a store whose blob lives in `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            path: root.as_ref().join(format!("{}.json", STORAGE_KEY)),
        }
    }

    /// Path of the blob file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole memo map.
    ///
    /// A missing blob is an empty map. So is an unparsable one, matching how
    /// the blob has always been treated.
    pub async fn load_map(&self) -> Result<MemoMap> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(MemoMap::new()),
            Err(e) => return Err(Error::Io(e)),
        };

        if content.trim().is_empty() {
            return Ok(MemoMap::new());
        }

        match serde_json::from_str(&content) {
            Ok(map) => Ok(map),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Backup blob is not valid JSON, treating as empty"
                );
                Ok(MemoMap::new())
            }
        }
    }

    /// Replace the whole memo map.
    pub async fn store_map(&self, map: &MemoMap) -> Result<()> {
        let content = serde_json::to_string_pretty(map)?;
        write_atomic(&self.path, content).await
    }
}

#[async_trait]
impl LocalBackupStore for BlobBackupStore {
    async fn write(&self, study_uid: &str, memo: &str) -> Result<MemoRecord> {
        let mut memos = self.load_map().await?;

        let record = match memos.remove(study_uid) {
            Some(existing) => existing.revise(memo),
            None => MemoRecord::new(study_uid, memo),
        };
        memos.insert(study_uid.to_string(), record.clone());

        self.store_map(&memos).await?;

        info!(
            study_uid = %study_uid,
            total = memos.len(),
            "BLOB_WRITE: Memo written to backup blob"
        );
        Ok(record)
    }

    async fn read(&self, study_uid: &str) -> Result<Option<MemoRecord>> {
        let mut memos = self.load_map().await?;
        let record = memos.remove(study_uid);

        debug!(study_uid = %study_uid, found = record.is_some(), "BLOB_READ");
        Ok(record)
    }

    async fn delete(&self, study_uid: &str) -> Result<()> {
        let mut memos = self.load_map().await?;
        let removed = memos.remove(study_uid).is_some();

        self.store_map(&memos).await?;

        info!(study_uid = %study_uid, removed, "BLOB_DELETE: Memo removed from backup blob");
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(Error::Io(e)),
        }

        info!(path = %self.path.display(), "All memos cleared from backup blob");
        Ok(())
    }
}
