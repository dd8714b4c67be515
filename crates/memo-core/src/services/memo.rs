//! Memo service: tiered persistence with provenance.
//!
//! Composes the remote tiers (study metadata, legacy embedded tags) with the
//! local backup tier:
//!
//! - `save` prefers study metadata and falls back to the local backup when
//!   the server is unreachable, the study cannot be resolved, or the write
//!   fails. A successful remote save skips the local backup.
//! - `load` tries metadata, then embedded tags, then the local backup, and
//!   reports which tier answered.
//! - `delete` clears every tier on a best-effort basis; only a local failure
//!   is reported.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::{
    CatalogResolver, ConnectivityProbe, EmbeddedTagStore, MetadataStore, OrthancClient,
};
use crate::config::{BackupLayout, Config};
use crate::error::{Error, Result};
use crate::models::{ConnectionStatus, LoadOutcome, MemoRecord, SaveOutcome};
use memo_storage::{BlobBackupStore, KeyedBackupStore, LocalBackupStore};

/// Tiered memo persistence.
///
/// Cheap to clone; share one instance across callers.
#[derive(Clone)]
pub struct MemoService {
    inner: Arc<MemoServiceInner>,
}

struct MemoServiceInner {
    probe: ConnectivityProbe,
    resolver: CatalogResolver,
    metadata: MetadataStore,
    embedded: EmbeddedTagStore,
    backup: Arc<dyn LocalBackupStore>,
    status: RwLock<ConnectionStatus>,
    mirror_local: bool,
}

/// Which remote channel produced a memo.
enum RemoteHit {
    Metadata(String),
    Embedded(String),
}

impl MemoService {
    /// Create the service, choosing the backup layout from configuration.
    pub fn new(config: &Config) -> Result<Self> {
        let backup: Arc<dyn LocalBackupStore> = match config.backup.layout {
            BackupLayout::Keyed => Arc::new(KeyedBackupStore::new(&config.backup.dir)),
            BackupLayout::Blob => Arc::new(BlobBackupStore::new(&config.backup.dir)),
        };
        Self::with_backup(config, backup)
    }

    /// Create the service with an explicit local backup store.
    pub fn with_backup(config: &Config, backup: Arc<dyn LocalBackupStore>) -> Result<Self> {
        let client = OrthancClient::new(&config.orthanc)?;

        info!(
            orthanc_url = %client.base_url(),
            backup_dir = %config.backup.dir.display(),
            backup_layout = ?config.backup.layout,
            resolver = ?config.resolver.strategy,
            "Memo service initialized"
        );

        Ok(Self {
            inner: Arc::new(MemoServiceInner {
                probe: ConnectivityProbe::new(client.clone(), config.orthanc.probe_path.clone()),
                resolver: CatalogResolver::new(client.clone(), &config.resolver),
                metadata: MetadataStore::new(client.clone()),
                embedded: EmbeddedTagStore::new(client, config.policy.prune_superseded),
                backup,
                status: RwLock::new(ConnectionStatus::Checking),
                mirror_local: config.policy.mirror_local_on_remote_success,
            }),
        })
    }

    // =========================================================================
    // Reachability
    // =========================================================================

    /// Probe the server and record the result.
    pub async fn check_connection(&self) -> bool {
        let reachable = self.inner.probe.is_reachable().await;
        *self.inner.status.write().await = ConnectionStatus::from(reachable);
        reachable
    }

    /// Last observed reachability; `Checking` until the first probe completes.
    pub async fn connection_status(&self) -> ConnectionStatus {
        *self.inner.status.read().await
    }

    // =========================================================================
    // Save
    // =========================================================================

    /// Save a memo, preferring the remote tier.
    pub async fn save(&self, study_uid: &str, memo: &str) -> SaveOutcome {
        let reason = if self.check_connection().await {
            match self.save_remote(study_uid, memo).await {
                Ok(()) => return self.after_remote_save(study_uid, memo).await,
                Err(e) => {
                    warn!(study_uid = %study_uid, error = %e, "Remote save failed, using local backup");
                    format!("Saving to Orthanc failed ({}); memo saved to local backup", e)
                }
            }
        } else {
            "Orthanc is unreachable; memo saved to local backup".to_string()
        };

        match self.inner.backup.write(study_uid, memo).await {
            Ok(_) => {
                info!(study_uid = %study_uid, "Memo saved to local backup");
                SaveOutcome::local(reason)
            }
            Err(e) => {
                error!(study_uid = %study_uid, error = %e, "Local backup save failed");
                SaveOutcome::failed(format!("Failed to save memo: {}", e))
            }
        }
    }

    async fn save_remote(&self, study_uid: &str, memo: &str) -> Result<()> {
        let orthanc_id = self
            .inner
            .resolver
            .resolve(study_uid)
            .await?
            .ok_or_else(|| Error::StudyNotFound(study_uid.to_string()))?;

        let record = MemoRecord::new(study_uid, memo);
        if let Err(e) = self.inner.metadata.write(&orthanc_id, &record).await {
            // The study may have been deleted since it was indexed
            if matches!(e, Error::Remote { status: 404, .. }) {
                self.inner.resolver.invalidate().await;
            }
            return Err(e);
        }
        Ok(())
    }

    async fn after_remote_save(&self, study_uid: &str, memo: &str) -> SaveOutcome {
        info!(study_uid = %study_uid, "Memo saved to Orthanc");
        let mut outcome = SaveOutcome::remote("Memo saved to Orthanc");

        if self.inner.mirror_local {
            match self.inner.backup.write(study_uid, memo).await {
                Ok(_) => outcome.local_saved = true,
                Err(e) => warn!(study_uid = %study_uid, error = %e, "Local mirror write failed"),
            }
        }
        outcome
    }

    // =========================================================================
    // Load
    // =========================================================================

    /// Load a memo, reporting which tier answered.
    pub async fn load(&self, study_uid: &str) -> LoadOutcome {
        if !self.check_connection().await {
            debug!(study_uid = %study_uid, "Orthanc unreachable, reading local backup");
            return self.load_local(study_uid).await;
        }

        match self.load_remote(study_uid).await {
            Ok(Some(RemoteHit::Metadata(memo))) => {
                LoadOutcome::remote(memo, "Memo loaded from Orthanc metadata")
            }
            Ok(Some(RemoteHit::Embedded(memo))) => {
                LoadOutcome::remote(memo, "Memo loaded from DICOM attributes")
            }
            Ok(None) => self.load_local(study_uid).await,
            Err(e) => {
                warn!(study_uid = %study_uid, error = %e, "Remote load failed, reading local backup");
                self.load_local(study_uid).await
            }
        }
    }

    async fn load_remote(&self, study_uid: &str) -> Result<Option<RemoteHit>> {
        let Some(orthanc_id) = self.inner.resolver.resolve(study_uid).await? else {
            return Ok(None);
        };

        match self.inner.metadata.read(&orthanc_id).await {
            Ok(Some(record)) => return Ok(Some(RemoteHit::Metadata(record.memo))),
            Ok(None) => {}
            Err(e) => {
                warn!(orthanc_id = %orthanc_id, error = %e, "Metadata read failed, scanning attributes");
            }
        }

        Ok(self
            .inner
            .embedded
            .scan(&orthanc_id)
            .await
            .map(RemoteHit::Embedded))
    }

    async fn load_local(&self, study_uid: &str) -> LoadOutcome {
        match self.inner.backup.read(study_uid).await {
            Ok(record) => LoadOutcome::from_local(record.map(|r| r.memo)),
            Err(e) => {
                error!(study_uid = %study_uid, error = %e, "Local backup read failed");
                LoadOutcome::not_found("Memo not found")
            }
        }
    }

    /// Read only the local backup tier.
    pub async fn load_local_only(&self, study_uid: &str) -> Option<String> {
        self.load_local(study_uid).await.memo
    }

    /// Whether a non-blank memo exists in any tier.
    pub async fn has_memo(&self, study_uid: &str) -> bool {
        self.load(study_uid).await.has_memo()
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Delete a memo from every tier.
    ///
    /// Remote deletes are best-effort. Only a failure of the local delete is
    /// returned; it is retried once first.
    pub async fn delete(&self, study_uid: &str) -> Result<()> {
        if self.check_connection().await {
            self.delete_remote(study_uid).await;
        }

        if let Err(e) = self.inner.backup.delete(study_uid).await {
            error!(study_uid = %study_uid, error = %e, "Local backup delete failed");

            if let Err(retry) = self.inner.backup.delete(study_uid).await {
                error!(study_uid = %study_uid, error = %retry, "Local backup delete retry failed");
            }
            return Err(e.into());
        }

        info!(study_uid = %study_uid, "Memo deleted");
        Ok(())
    }

    async fn delete_remote(&self, study_uid: &str) {
        let orthanc_id = match self.inner.resolver.resolve(study_uid).await {
            Ok(Some(id)) => id,
            Ok(None) => return,
            Err(e) => {
                warn!(study_uid = %study_uid, error = %e, "Could not resolve study for delete");
                return;
            }
        };

        match self.inner.metadata.delete(&orthanc_id).await {
            Ok(true) => info!(orthanc_id = %orthanc_id, "Memo deleted from Orthanc metadata"),
            Ok(false) => debug!(orthanc_id = %orthanc_id, "No memo metadata to delete"),
            Err(e) => warn!(orthanc_id = %orthanc_id, error = %e, "Failed to delete memo metadata"),
        }

        if self.inner.embedded.remove(&orthanc_id).await {
            info!(orthanc_id = %orthanc_id, "Memo removed from DICOM attributes");
        }
    }

    // =========================================================================
    // Tooling
    // =========================================================================

    /// Remove every memo from the local backup tier.
    pub async fn clear_all(&self) -> Result<()> {
        self.inner.backup.clear_all().await?;
        Ok(())
    }

    /// Embed a memo through the legacy attribute channel.
    ///
    /// Returns the id of the derived instance when the server stored one.
    pub async fn embed_legacy(&self, study_uid: &str, memo: &str) -> Result<Option<String>> {
        let orthanc_id = self
            .inner
            .resolver
            .resolve(study_uid)
            .await?
            .ok_or_else(|| Error::StudyNotFound(study_uid.to_string()))?;

        self.inner.embedded.embed(&orthanc_id, memo).await
    }
}
