//! Fake Orthanc catalog for integration tests.
//!
//! One study (`st-1`) with one series (`se-1`) holding one instance
//! (`in-1`). Study metadata, the instance's tags and whether the study is
//! listed are stateful so that a write followed by a read behaves like the
//! real server.
//!
//! By default a derive applies its edits to `in-1` and reports a stored
//! instance `in-derived`. [`FakeCatalog::returning_files`] instead answers
//! derives the way a stock server does: with the modified file and nothing
//! stored.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use memo_core::config::Config;
use serde_json::{json, Map, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const STUDY_UID: &str = "1.2.3";
pub const MEMO: &str = "follow-up needed";
pub const STUDY_ID: &str = "st-1";
pub const INSTANCE_ID: &str = "in-1";

/// Address nothing listens on.
pub const UNREACHABLE_URL: &str = "http://127.0.0.1:9";

pub struct FakeCatalog {
    pub server: MockServer,
    pub metadata: Arc<Mutex<Option<String>>>,
    pub tags: Arc<Mutex<Map<String, Value>>>,
    pub listed: Arc<AtomicBool>,
}

#[derive(Default)]
struct Behaviour {
    reject_writes: bool,
    derive_returns_file: bool,
}

impl FakeCatalog {
    pub async fn start() -> Self {
        Self::build(Behaviour::default()).await
    }

    /// Catalog that refuses metadata writes.
    pub async fn read_only() -> Self {
        Self::build(Behaviour {
            reject_writes: true,
            ..Behaviour::default()
        })
        .await
    }

    /// Catalog whose derives return the modified file and store nothing.
    pub async fn returning_files() -> Self {
        Self::build(Behaviour {
            derive_returns_file: true,
            ..Behaviour::default()
        })
        .await
    }

    async fn build(behaviour: Behaviour) -> Self {
        let server = MockServer::start().await;
        let metadata = Arc::new(Mutex::new(None));
        let tags = Arc::new(Mutex::new(Map::new()));
        let listed = Arc::new(AtomicBool::new(true));

        Mock::given(method("GET"))
            .and(path("/studies"))
            .respond_with(ListStudies(listed.clone()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/studies/{}", STUDY_ID)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ID": STUDY_ID,
                "MainDicomTags": {
                    "StudyInstanceUID": STUDY_UID,
                    "StudyDescription": "CHEST CT"
                },
                "Series": ["se-1"]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/series/se-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ID": "se-1",
                "Instances": [INSTANCE_ID]
            })))
            .mount(&server)
            .await;

        let metadata_path = format!("/studies/{}/metadata/1025", STUDY_ID);
        Mock::given(method("GET"))
            .and(path(metadata_path.as_str()))
            .respond_with(ReadMetadata(metadata.clone()))
            .mount(&server)
            .await;
        if behaviour.reject_writes {
            Mock::given(method("PUT"))
                .and(path(metadata_path.as_str()))
                .respond_with(ResponseTemplate::new(403).set_body_string("read-only"))
                .mount(&server)
                .await;
        } else {
            Mock::given(method("PUT"))
                .and(path(metadata_path.as_str()))
                .respond_with(WriteMetadata(metadata.clone()))
                .mount(&server)
                .await;
        }
        Mock::given(method("DELETE"))
            .and(path(metadata_path.as_str()))
            .respond_with(DeleteMetadata(metadata.clone()))
            .mount(&server)
            .await;

        let instance_path = format!("/instances/{}", INSTANCE_ID);
        Mock::given(method("GET"))
            .and(path(format!("{}/tags", instance_path)))
            .respond_with(ReadTags(tags.clone()))
            .mount(&server)
            .await;
        if behaviour.derive_returns_file {
            Mock::given(method("POST"))
                .and(path(format!("{}/modify", instance_path)))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_raw(b"DICM\x00\x00".to_vec(), "application/dicom"),
                )
                .mount(&server)
                .await;
        } else {
            Mock::given(method("POST"))
                .and(path(format!("{}/modify", instance_path)))
                .respond_with(ModifyTags(tags.clone()))
                .mount(&server)
                .await;
        }
        Mock::given(method("DELETE"))
            .and(path(instance_path.as_str()))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        Self {
            server,
            metadata,
            tags,
            listed,
        }
    }

    /// Show or hide the study in the catalog listing.
    pub fn set_listed(&self, listed: bool) {
        self.listed.store(listed, Ordering::SeqCst);
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn config(&self, backup_dir: &Path) -> Config {
        Config::for_server(&self.uri(), backup_dir)
    }

    /// Seed a memo written by an older client into the instance's attributes.
    pub fn embed_legacy_memo(&self, memo: &str) {
        let mut tags = self.tags.lock().unwrap();
        tags.insert("7777,1001".into(), tag("String", json!(memo)));
        tags.insert(
            "0020,4000".into(),
            tag("String", json!(format!("OHIF Memo: {}", memo))),
        );
    }

    /// Seed a memo carried only by Image Comments.
    pub fn embed_comment_memo(&self, memo: &str) {
        self.tags.lock().unwrap().insert(
            "0020,4000".into(),
            tag("String", json!(format!("OHIF Memo: {}", memo))),
        );
    }

    pub fn stored_metadata(&self) -> Option<String> {
        self.metadata.lock().unwrap().clone()
    }

    pub fn has_embedded_memo(&self) -> bool {
        let tags = self.tags.lock().unwrap();
        tags.contains_key("7777,1001") || tags.contains_key("0020,4000")
    }

    pub async fn requests(&self, verb: &str, prefix: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.method.to_string() == verb && r.url.path().starts_with(prefix))
            .count()
    }
}

fn tag(kind: &str, value: Value) -> Value {
    json!({ "Name": "", "Type": kind, "Value": value })
}

struct ListStudies(Arc<AtomicBool>);

impl Respond for ListStudies {
    fn respond(&self, _: &Request) -> ResponseTemplate {
        let ids: Vec<&str> = if self.0.load(Ordering::SeqCst) {
            vec![STUDY_ID]
        } else {
            Vec::new()
        };
        ResponseTemplate::new(200).set_body_json(ids)
    }
}

struct ReadMetadata(Arc<Mutex<Option<String>>>);

impl Respond for ReadMetadata {
    fn respond(&self, _: &Request) -> ResponseTemplate {
        match self.0.lock().unwrap().as_ref() {
            Some(body) => ResponseTemplate::new(200).set_body_string(body.clone()),
            None => ResponseTemplate::new(404),
        }
    }
}

struct WriteMetadata(Arc<Mutex<Option<String>>>);

impl Respond for WriteMetadata {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body = String::from_utf8_lossy(&request.body).into_owned();
        *self.0.lock().unwrap() = Some(body);
        ResponseTemplate::new(200)
    }
}

struct DeleteMetadata(Arc<Mutex<Option<String>>>);

impl Respond for DeleteMetadata {
    fn respond(&self, _: &Request) -> ResponseTemplate {
        match self.0.lock().unwrap().take() {
            Some(_) => ResponseTemplate::new(200),
            None => ResponseTemplate::new(404),
        }
    }
}

struct ReadTags(Arc<Mutex<Map<String, Value>>>);

impl Respond for ReadTags {
    fn respond(&self, _: &Request) -> ResponseTemplate {
        let tags = self.0.lock().unwrap().clone();
        ResponseTemplate::new(200).set_body_json(Value::Object(tags))
    }
}

/// Applies `Replace` and `Remove` in place.
struct ModifyTags(Arc<Mutex<Map<String, Value>>>);

impl Respond for ModifyTags {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let Ok(payload) = serde_json::from_slice::<Value>(&request.body) else {
            return ResponseTemplate::new(400);
        };

        let mut tags = self.0.lock().unwrap();
        if let Some(remove) = payload["Remove"].as_array() {
            for key in remove.iter().filter_map(Value::as_str) {
                tags.remove(key);
            }
        }
        if let Some(replace) = payload["Replace"].as_object() {
            for (key, value) in replace {
                tags.insert(key.clone(), tag("String", value.clone()));
            }
        }

        ResponseTemplate::new(200).set_body_json(json!({
            "ID": "in-derived",
            "Path": "/instances/in-derived",
            "Type": "Instance"
        }))
    }
}
