//! Study metadata channel.
//!
//! Stores the memo as a JSON document in one user-defined metadata slot of
//! the Orthanc study. One round trip per operation once the study is
//! resolved.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::OrthancClient;
use crate::error::{Error, Result};
use crate::models::MemoRecord;

/// Metadata key the memo is stored under (first user-defined Orthanc slot).
pub const MEMO_METADATA_KEY: &str = "1025";

/// Marker written into every payload.
const PAYLOAD_TYPE: &str = "StudyMemo";

/// Payload stored in the metadata slot.
///
/// Older payloads only carry `memo`, `createdAt` and `type`, so everything
/// except the text is optional on read. Payloads not typed `StudyMemo` are
/// rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataPayload {
    memo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
    #[serde(
        rename = "studyInstanceUID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    study_instance_uid: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

impl MetadataPayload {
    fn from_record(record: &MemoRecord) -> Self {
        Self {
            memo: record.memo.clone(),
            created_at: Some(record.created_at),
            updated_at: Some(record.updated_at),
            study_instance_uid: Some(record.study_instance_uid.clone()),
            kind: Some(PAYLOAD_TYPE.to_string()),
        }
    }

    fn into_record(self) -> MemoRecord {
        let created_at = self
            .created_at
            .or(self.updated_at)
            .unwrap_or_else(Utc::now);

        MemoRecord {
            study_instance_uid: self.study_instance_uid.unwrap_or_default(),
            memo: self.memo,
            created_at,
            updated_at: self.updated_at.unwrap_or(created_at),
        }
    }
}

/// Memo persistence through study metadata.
#[derive(Clone)]
pub struct MetadataStore {
    client: OrthancClient,
}

impl MetadataStore {
    pub fn new(client: OrthancClient) -> Self {
        Self { client }
    }

    /// Write the memo for a resolved study. Fails unless acknowledged.
    pub async fn write(&self, orthanc_id: &str, record: &MemoRecord) -> Result<()> {
        let body = serde_json::to_string(&MetadataPayload::from_record(record))?;

        self.client
            .put_text(
                &OrthancClient::metadata_path(orthanc_id, MEMO_METADATA_KEY),
                body,
            )
            .await?;

        info!(
            orthanc_id = %orthanc_id,
            study_uid = %record.study_instance_uid,
            "Memo written to study metadata"
        );
        Ok(())
    }

    /// Read the memo for a resolved study. A missing key is `None`.
    pub async fn read(&self, orthanc_id: &str) -> Result<Option<MemoRecord>> {
        let text = self
            .client
            .get_text_optional(&OrthancClient::metadata_path(orthanc_id, MEMO_METADATA_KEY))
            .await?;

        let Some(text) = text else {
            debug!(orthanc_id = %orthanc_id, "No memo metadata");
            return Ok(None);
        };

        let payload: MetadataPayload = serde_json::from_str(&text).map_err(|e| {
            Error::InvalidPayload(format!(
                "Memo metadata for study {} is not valid: {}",
                orthanc_id, e
            ))
        })?;

        if payload.kind.as_deref() != Some(PAYLOAD_TYPE) {
            return Err(Error::InvalidPayload(format!(
                "Metadata for study {} is not a study memo (type {:?})",
                orthanc_id, payload.kind
            )));
        }

        Ok(Some(payload.into_record()))
    }

    /// Delete the memo for a resolved study. Returns `false` if none existed.
    pub async fn delete(&self, orthanc_id: &str) -> Result<bool> {
        let deleted = self
            .client
            .delete(&OrthancClient::metadata_path(orthanc_id, MEMO_METADATA_KEY))
            .await?;

        debug!(orthanc_id = %orthanc_id, deleted, "Memo metadata delete");
        Ok(deleted)
    }
}
