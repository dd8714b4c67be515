//! Catalog shapes returned by the Orthanc REST API.
//!
//! Only the fields needed to resolve and annotate a study are modelled.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Study (catalog record) detail from `GET /studies/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Study {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "MainDicomTags", default)]
    pub main_dicom_tags: StudyTags,
    #[serde(rename = "Series", default)]
    pub series: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudyTags {
    #[serde(rename = "StudyInstanceUID", default)]
    pub study_instance_uid: Option<String>,
    #[serde(rename = "StudyDescription", default)]
    pub study_description: Option<String>,
}

/// Series (sub-group) detail from `GET /series/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Series {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Instances", default)]
    pub instances: Vec<String>,
}

/// One attribute from `GET /instances/{id}/tags`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagEntry {
    #[serde(rename = "Name", default)]
    pub name: Option<String>,
    #[serde(rename = "Type", default)]
    pub kind: Option<String>,
    #[serde(rename = "Value", default)]
    pub value: Value,
}

impl TagEntry {
    /// The value as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_str()
    }
}

/// Attributes of one data instance, keyed by `gggg,eeee` tag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceTags(pub HashMap<String, TagEntry>);

/// Instance stored by a derive, as reported by `POST /instances/{id}/modify`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredInstance {
    #[serde(rename = "ID")]
    pub id: String,
}

impl InstanceTags {
    /// String value of a tag, if present and a non-empty string.
    pub fn text(&self, tag: &str) -> Option<&str> {
        self.0
            .get(tag)
            .and_then(TagEntry::as_str)
            .filter(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_study_parses_orthanc_shape() {
        let study: Study = serde_json::from_value(json!({
            "ID": "27f7126f-4f66f02b-b5e7c7a6-12c2e3a6-7a4b2c1d",
            "IsStable": true,
            "MainDicomTags": {
                "StudyInstanceUID": "1.2.3",
                "StudyDescription": "CT Chest"
            },
            "Series": ["s1", "s2"],
            "Type": "Study"
        }))
        .unwrap();

        assert_eq!(study.main_dicom_tags.study_instance_uid.as_deref(), Some("1.2.3"));
        assert_eq!(study.series, vec!["s1", "s2"]);
    }

    #[test]
    fn test_study_tolerates_missing_fields() {
        let study: Study = serde_json::from_value(json!({ "ID": "abc" })).unwrap();
        assert!(study.main_dicom_tags.study_instance_uid.is_none());
        assert!(study.series.is_empty());
    }

    #[test]
    fn test_instance_tags_text() {
        let tags: InstanceTags = serde_json::from_value(json!({
            "7777,1001": { "Name": "Unknown Tag & Data", "Type": "String", "Value": "memo" },
            "0020,4000": { "Name": "ImageComments", "Type": "String", "Value": "" },
            "0008,1115": { "Name": "ReferencedSeriesSequence", "Type": "Sequence", "Value": [] },
            "0018,0050": { "Name": "SliceThickness", "Type": "Null", "Value": null }
        }))
        .unwrap();

        assert_eq!(tags.text("7777,1001"), Some("memo"));
        assert_eq!(tags.text("0020,4000"), None);
        assert_eq!(tags.text("0008,1115"), None);
        assert_eq!(tags.text("0018,0050"), None);
        assert_eq!(tags.text("0010,0010"), None);
    }
}
