//! Study Instance UID → Orthanc study id resolution.
//!
//! Orthanc identifies studies by its own hashed ids, while callers only know
//! the DICOM Study Instance UID. Two strategies are supported:
//!
//! - [`ResolverStrategy::Scan`]: list every study and fetch details one by
//!   one until the UID matches. No caching, O(n) round trips per call.
//! - [`ResolverStrategy::Index`]: build a UID → id map with one full scan and
//!   answer hits from it while it is younger than the configured TTL. A miss
//!   always rebuilds before answering, so a study added after the index was
//!   built is still found.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::OrthancClient;
use crate::config::{ResolverConfig, ResolverStrategy};
use crate::error::Result;

struct StudyIndex {
    built_at: Instant,
    ids: HashMap<String, String>,
}

impl StudyIndex {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.built_at.elapsed() < ttl
    }
}

/// Resolves external study identifiers to Orthanc study ids.
pub struct CatalogResolver {
    client: OrthancClient,
    strategy: ResolverStrategy,
    ttl: Duration,
    index: RwLock<Option<StudyIndex>>,
    /// Serializes index rebuilds
    rebuild: Mutex<()>,
}

impl CatalogResolver {
    pub fn new(client: OrthancClient, config: &ResolverConfig) -> Self {
        Self {
            client,
            strategy: config.strategy,
            ttl: config.index_ttl,
            index: RwLock::new(None),
            rebuild: Mutex::new(()),
        }
    }

    /// Resolve a Study Instance UID.
    ///
    /// Returns `Ok(None)` when no study carries the UID, and an error when the
    /// study listing itself could not be fetched.
    pub async fn resolve(&self, study_uid: &str) -> Result<Option<String>> {
        let found = match self.strategy {
            ResolverStrategy::Scan => self.scan_for(study_uid).await?,
            ResolverStrategy::Index => self.lookup(study_uid).await?,
        };

        match &found {
            Some(id) => debug!(study_uid = %study_uid, orthanc_id = %id, "Study resolved"),
            None => info!(study_uid = %study_uid, "Study not found in catalog"),
        }
        Ok(found)
    }

    /// Drop the index so the next lookup rebuilds it.
    pub async fn invalidate(&self) {
        if self.strategy == ResolverStrategy::Index {
            *self.index.write().await = None;
            debug!("Study index invalidated");
        }
    }

    /// Linear scan, stopping at the first match.
    async fn scan_for(&self, study_uid: &str) -> Result<Option<String>> {
        let ids = self.client.list_studies().await?;

        for id in ids {
            let study = match self.client.get_study(&id).await {
                Ok(study) => study,
                Err(e) => {
                    debug!(orthanc_id = %id, error = %e, "Skipping unreadable study");
                    continue;
                }
            };

            if study.main_dicom_tags.study_instance_uid.as_deref() == Some(study_uid) {
                return Ok(Some(id));
            }
        }

        Ok(None)
    }

    async fn lookup(&self, study_uid: &str) -> Result<Option<String>> {
        {
            let index = self.index.read().await;
            if let Some(id) = index
                .as_ref()
                .filter(|i| i.is_fresh(self.ttl))
                .and_then(|i| i.ids.get(study_uid))
            {
                return Ok(Some(id.clone()));
            }
        }

        let waiting_since = Instant::now();
        let _rebuilding = self.rebuild.lock().await;

        // Another caller may have rebuilt while we waited
        {
            let index = self.index.read().await;
            if let Some(index) = index.as_ref().filter(|i| i.built_at >= waiting_since) {
                return Ok(index.ids.get(study_uid).cloned());
            }
        }

        debug!(study_uid = %study_uid, "Index miss, rebuilding");
        let ids = self.build_index().await?;
        let found = ids.get(study_uid).cloned();

        *self.index.write().await = Some(StudyIndex {
            built_at: Instant::now(),
            ids,
        });
        Ok(found)
    }

    /// Scan the whole catalog once, keeping the first id seen per UID.
    async fn build_index(&self) -> Result<HashMap<String, String>> {
        let started = Instant::now();
        let ids = self.client.list_studies().await?;
        let mut index = HashMap::with_capacity(ids.len());

        for id in ids {
            match self.client.get_study(&id).await {
                Ok(study) => {
                    if let Some(uid) = study.main_dicom_tags.study_instance_uid {
                        index.entry(uid).or_insert(id);
                    }
                }
                Err(e) => {
                    warn!(orthanc_id = %id, error = %e, "Skipping unreadable study while indexing");
                }
            }
        }

        info!(
            studies = index.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Study index built"
        );
        Ok(index)
    }
}
