//! Local backup tier for study memos.
//!
//! Memos that could not be written to the remote catalog land here, keyed by
//! Study Instance UID. Two layouts are available:
//!
//! - [`KeyedBackupStore`]: one JSON file per study under
//!   `memos/a/b/ab12cd34ef56ab78.json`, each guarded by its own write lock.
//! - [`BlobBackupStore`]: a single JSON object holding every memo, stored under
//!   one well-known key. Every write rewrites the whole map, so concurrent
//!   writers can lose each other's updates.
//!
//! Memo records are serialized as:
//! ```json
//! {
//!   "studyInstanceUID": "1.2.3",
//!   "memo": "follow-up needed",
//!   "createdAt": "2026-02-02T10:30:00Z",
//!   "updatedAt": "2026-02-02T10:30:00Z"
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod blob;
mod error;
pub mod key;
mod keyed;
mod persist;

pub use blob::{BlobBackupStore, MemoMap, STORAGE_KEY};
pub use error::{Error, Result};
pub use keyed::KeyedBackupStore;

/// A memo attached to one study.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoRecord {
    #[serde(rename = "studyInstanceUID")]
    pub study_instance_uid: String,
    pub memo: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemoRecord {
    /// Create a fresh record stamped with the current time.
    pub fn new(study_instance_uid: impl Into<String>, memo: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            study_instance_uid: study_instance_uid.into(),
            memo: memo.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the text of an existing record, keeping its creation time.
    pub fn revise(mut self, memo: impl Into<String>) -> Self {
        self.memo = memo.into();
        self.updated_at = Utc::now();
        self
    }
}

/// Durable client-local store for memos, keyed by Study Instance UID.
#[async_trait]
pub trait LocalBackupStore: Send + Sync {
    /// Create or replace the memo for a study.
    async fn write(&self, study_uid: &str, memo: &str) -> Result<MemoRecord>;

    /// Read the memo for a study, if one is backed up.
    async fn read(&self, study_uid: &str) -> Result<Option<MemoRecord>>;

    /// Remove the memo for a study. Removing a missing memo is not an error.
    async fn delete(&self, study_uid: &str) -> Result<()>;

    /// Remove every backed-up memo.
    async fn clear_all(&self) -> Result<()>;
}
