//! Legacy embedded-tag channel.
//!
//! Older clients stored the memo inside the attributes of a study's first
//! instance by deriving a modified copy through `POST /instances/{id}/modify`.
//! The memo lands in a private tag block plus two standard comment tags, and
//! the study description gets a `[Memo: ...]` preview suffix.
//!
//! This channel is read and cleaned up during normal operation but never
//! written by `save`. A derive that stores a new instance leaves its source
//! in place, so with `prune_superseded` the source is deleted once the server
//! reports a stored derived instance with a different id. A derive that only
//! returns the modified file never prunes.

use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use super::OrthancClient;
use crate::error::{Error, Result};
use crate::models::{InstanceTags, Study};

/// Private creator slot.
pub const PRIVATE_CREATOR_TAG: &str = "7777,0001";
/// Memo text.
pub const MEMO_TEXT_TAG: &str = "7777,1001";
/// Embed timestamp.
pub const MEMO_CREATED_TAG: &str = "7777,1002";
/// Format version.
pub const MEMO_VERSION_TAG: &str = "7777,1003";
/// Image Comments.
pub const IMAGE_COMMENTS_TAG: &str = "0020,4000";
/// Identifying Comments.
pub const IDENTIFYING_COMMENTS_TAG: &str = "0008,4000";
/// Study Description.
pub const STUDY_DESCRIPTION_TAG: &str = "0008,1030";

pub const PRIVATE_CREATOR: &str = "OHIF_MEMO";
pub const MEMO_VERSION: &str = "1.0";
/// Prefix identifying a memo carried in Image Comments.
pub const IMAGE_COMMENTS_PREFIX: &str = "OHIF Memo: ";
const IDENTIFYING_COMMENTS_PREFIX: &str = "Study memo added by OHIF: ";
const DEFAULT_DESCRIPTION: &str = "CT Study";
const PREVIEW_CHARS: usize = 50;

/// Tags removed when a memo is stripped from an instance.
pub const MEMO_TAGS: [&str; 6] = [
    PRIVATE_CREATOR_TAG,
    MEMO_TEXT_TAG,
    MEMO_CREATED_TAG,
    MEMO_VERSION_TAG,
    IMAGE_COMMENTS_TAG,
    IDENTIFYING_COMMENTS_TAG,
];

fn memo_suffix() -> &'static Regex {
    static SUFFIX: OnceLock<Regex> = OnceLock::new();
    SUFFIX.get_or_init(|| Regex::new(r"(?s) \[Memo:.*?\]$").expect("valid suffix pattern"))
}

/// First 50 characters of the memo, with `...` when truncated.
pub fn preview(memo: &str) -> String {
    let mut chars = memo.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// Remove a trailing `[Memo: ...]` preview from a study description.
pub fn strip_memo_suffix(description: &str) -> String {
    memo_suffix().replace(description, "").into_owned()
}

/// Study description with a memo preview appended.
pub fn describe_with_memo(description: Option<&str>, memo: &str) -> String {
    let base = description
        .filter(|d| !d.is_empty())
        .unwrap_or(DEFAULT_DESCRIPTION);
    format!("{} [Memo: {}]", strip_memo_suffix(base), preview(memo))
}

/// Memo carried by an instance's attributes, if any.
///
/// The private tag wins; otherwise Image Comments must carry the known
/// prefix, which is stripped.
pub fn extract_memo(tags: &InstanceTags) -> Option<String> {
    if let Some(memo) = tags.text(MEMO_TEXT_TAG) {
        return Some(memo.to_string());
    }

    tags.text(IMAGE_COMMENTS_TAG)
        .and_then(|comments| comments.strip_prefix(IMAGE_COMMENTS_PREFIX))
        .filter(|memo| !memo.is_empty())
        .map(String::from)
}

/// Derive payload that embeds a memo.
pub fn embed_payload(memo: &str, description: Option<&str>) -> Value {
    let mut replace = Map::new();
    replace.insert(PRIVATE_CREATOR_TAG.into(), json!(PRIVATE_CREATOR));
    replace.insert(MEMO_TEXT_TAG.into(), json!(memo));
    replace.insert(MEMO_CREATED_TAG.into(), json!(Utc::now().to_rfc3339()));
    replace.insert(MEMO_VERSION_TAG.into(), json!(MEMO_VERSION));
    replace.insert(
        IMAGE_COMMENTS_TAG.into(),
        json!(format!("{}{}", IMAGE_COMMENTS_PREFIX, memo)),
    );
    replace.insert(
        IDENTIFYING_COMMENTS_TAG.into(),
        json!(format!("{}{}", IDENTIFYING_COMMENTS_PREFIX, memo)),
    );
    replace.insert(
        STUDY_DESCRIPTION_TAG.into(),
        json!(describe_with_memo(description, memo)),
    );

    json!({ "Replace": replace })
}

/// Derive payload that strips a memo.
pub fn remove_payload(description: Option<&str>) -> Value {
    let base = description
        .filter(|d| !d.is_empty())
        .unwrap_or(DEFAULT_DESCRIPTION);

    json!({
        "Remove": MEMO_TAGS,
        "Replace": { STUDY_DESCRIPTION_TAG: strip_memo_suffix(base) }
    })
}

/// An instance found carrying a memo.
struct EmbeddedMemo {
    study: Study,
    instance_id: String,
    memo: String,
}

/// Memo persistence through instance attributes.
#[derive(Clone)]
pub struct EmbeddedTagStore {
    client: OrthancClient,
    prune_superseded: bool,
}

impl EmbeddedTagStore {
    pub fn new(client: OrthancClient, prune_superseded: bool) -> Self {
        Self {
            client,
            prune_superseded,
        }
    }

    /// Embed a memo into the first instance of the study's first series.
    ///
    /// Returns the id of the derived instance when the server stored one.
    pub async fn embed(&self, orthanc_id: &str, memo: &str) -> Result<Option<String>> {
        let study = self.client.get_study(orthanc_id).await?;
        let series_id = study
            .series
            .first()
            .ok_or_else(|| Error::EmptyStudy(orthanc_id.to_string()))?;
        let series = self.client.get_series(series_id).await?;
        let instance_id = series
            .instances
            .first()
            .ok_or_else(|| Error::EmptyStudy(orthanc_id.to_string()))?;

        let payload = embed_payload(memo, study.main_dicom_tags.study_description.as_deref());
        let derived = self.client.modify_instance(instance_id, &payload).await?;

        info!(
            orthanc_id = %orthanc_id,
            instance_id = %instance_id,
            derived_id = ?derived,
            "Memo embedded into derived instance"
        );
        self.prune(instance_id, derived.as_deref()).await;

        Ok(derived)
    }

    /// Find the first embedded memo in listing order. Errors are swallowed.
    pub async fn scan(&self, orthanc_id: &str) -> Option<String> {
        match self.find(orthanc_id).await {
            Ok(found) => found.map(|hit| hit.memo),
            Err(e) => {
                warn!(orthanc_id = %orthanc_id, error = %e, "Embedded memo scan failed");
                None
            }
        }
    }

    /// Strip the first embedded memo found. Errors are swallowed.
    ///
    /// Returns whether a memo was found and the derive succeeded.
    pub async fn remove(&self, orthanc_id: &str) -> bool {
        let hit = match self.find(orthanc_id).await {
            Ok(Some(hit)) => hit,
            Ok(None) => {
                debug!(orthanc_id = %orthanc_id, "No embedded memo to remove");
                return false;
            }
            Err(e) => {
                warn!(orthanc_id = %orthanc_id, error = %e, "Embedded memo scan failed");
                return false;
            }
        };

        let payload = remove_payload(hit.study.main_dicom_tags.study_description.as_deref());
        match self.client.modify_instance(&hit.instance_id, &payload).await {
            Ok(derived) => {
                info!(
                    orthanc_id = %orthanc_id,
                    instance_id = %hit.instance_id,
                    derived_id = ?derived,
                    "Embedded memo removed"
                );
                self.prune(&hit.instance_id, derived.as_deref()).await;
                true
            }
            Err(e) => {
                warn!(
                    orthanc_id = %orthanc_id,
                    instance_id = %hit.instance_id,
                    error = %e,
                    "Failed to strip embedded memo"
                );
                false
            }
        }
    }

    /// Walk every series and instance, stopping at the first memo.
    async fn find(&self, orthanc_id: &str) -> Result<Option<EmbeddedMemo>> {
        let study = self.client.get_study(orthanc_id).await?;

        for series_id in &study.series {
            let series = match self.client.get_series(series_id).await {
                Ok(series) => series,
                Err(e) => {
                    debug!(series_id = %series_id, error = %e, "Skipping unreadable series");
                    continue;
                }
            };

            for instance_id in series.instances {
                let tags = match self.client.get_instance_tags(&instance_id).await {
                    Ok(tags) => tags,
                    Err(e) => {
                        debug!(instance_id = %instance_id, error = %e, "Skipping unreadable instance");
                        continue;
                    }
                };

                if let Some(memo) = extract_memo(&tags) {
                    debug!(instance_id = %instance_id, "Embedded memo found");
                    return Ok(Some(EmbeddedMemo {
                        study,
                        instance_id,
                        memo,
                    }));
                }
            }
        }

        Ok(None)
    }

    /// Delete a superseded source instance when pruning is enabled.
    ///
    /// Only a stored derived instance with a different id supersedes the
    /// source.
    async fn prune(&self, source_id: &str, derived_id: Option<&str>) {
        if !self.prune_superseded {
            return;
        }

        match derived_id {
            Some(derived) if derived != source_id => {}
            _ => {
                debug!(instance_id = %source_id, "No stored derived instance, keeping source");
                return;
            }
        }

        match self.client.delete_instance(source_id).await {
            Ok(_) => debug!(instance_id = %source_id, "Superseded instance deleted"),
            Err(e) => warn!(
                instance_id = %source_id,
                error = %e,
                "Failed to delete superseded instance"
            ),
        }
    }
}
