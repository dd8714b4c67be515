//! Orthanc REST client.
//!
//! Thin wrapper over the endpoints the memo tiers consume:
//! - Study listing and detail
//! - Series detail
//! - Study metadata by key
//! - Instance tags, modify (derive) and delete

use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::config::OrthancConfig;
use crate::error::{Error, Result};
use crate::models::{InstanceTags, Series, StoredInstance, Study};

/// Client for the Orthanc REST API.
#[derive(Clone)]
pub struct OrthancClient {
    client: Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
}

impl OrthancClient {
    /// Create a client from configuration.
    pub fn new(config: &OrthancConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent("StudyMemo/1.0")
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Start a request with the JSON accept header and credentials.
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, self.url(path))
            .header(header::ACCEPT, "application/json");

        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            builder = builder.basic_auth(username, Some(password));
        }
        builder
    }

    /// Turn a non-success response into an error.
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        Err(Error::Remote {
            status: status.as_u16(),
            message: text,
        })
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        builder
            .send()
            .await
            .map_err(|e| Error::Transport(format!("Request failed: {}", e)))
    }

    /// GET a path and decode its JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(self.request(Method::GET, path)).await?;
        let response = Self::check(response).await?;

        response
            .json()
            .await
            .map_err(|e| Error::InvalidPayload(format!("Failed to parse response: {}", e)))
    }

    /// GET a path, succeeding only on a success status.
    pub async fn ping(&self, path: &str) -> Result<()> {
        let response = self.send(self.request(Method::GET, path)).await?;
        Self::check(response).await?;
        Ok(())
    }

    /// GET a path as text. A 404 is `None`.
    pub async fn get_text_optional(&self, path: &str) -> Result<Option<String>> {
        let response = self.send(self.request(Method::GET, path)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = Self::check(response).await?;
        let text = response.text().await?;
        Ok(Some(text))
    }

    /// PUT a plain-text body.
    pub async fn put_text(&self, path: &str, body: String) -> Result<()> {
        let builder = self
            .request(Method::PUT, path)
            .header(header::CONTENT_TYPE, "text/plain")
            .body(body);

        let response = self.send(builder).await?;
        Self::check(response).await?;
        Ok(())
    }

    /// POST a JSON body.
    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Response> {
        let response = self.send(self.request(Method::POST, path).json(body)).await?;
        Self::check(response).await
    }

    /// DELETE a path. Returns `false` when there was nothing to delete.
    pub async fn delete(&self, path: &str) -> Result<bool> {
        let response = self.send(self.request(Method::DELETE, path)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }

        Self::check(response).await?;
        Ok(true)
    }

    // =========================================================================
    // Typed endpoints
    // =========================================================================

    /// List every study id in the catalog.
    pub async fn list_studies(&self) -> Result<Vec<String>> {
        let ids: Vec<String> = self.get_json("/studies").await?;
        debug!(count = ids.len(), "Listed studies");
        Ok(ids)
    }

    pub async fn get_study(&self, study_id: &str) -> Result<Study> {
        self.get_json(&format!("/studies/{}", urlencoding::encode(study_id)))
            .await
    }

    pub async fn get_series(&self, series_id: &str) -> Result<Series> {
        self.get_json(&format!("/series/{}", urlencoding::encode(series_id)))
            .await
    }

    pub async fn get_instance_tags(&self, instance_id: &str) -> Result<InstanceTags> {
        self.get_json(&format!(
            "/instances/{}/tags",
            urlencoding::encode(instance_id)
        ))
        .await
    }

    /// Derive a modified copy of an instance.
    ///
    /// Returns the id of the derived instance when the server stored one.
    /// A reply carrying the modified file itself means nothing was stored.
    pub async fn modify_instance(
        &self,
        instance_id: &str,
        payload: &Value,
    ) -> Result<Option<String>> {
        let response = self
            .post_json(
                &format!("/instances/{}/modify", urlencoding::encode(instance_id)),
                payload,
            )
            .await?;

        let is_json = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("json"));
        if !is_json {
            debug!(instance_id = %instance_id, "Derive returned file content, nothing stored");
            return Ok(None);
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice::<StoredInstance>(&body)
            .ok()
            .map(|stored| stored.id))
    }

    pub async fn delete_instance(&self, instance_id: &str) -> Result<bool> {
        self.delete(&format!("/instances/{}", urlencoding::encode(instance_id)))
            .await
    }

    /// Path of a study metadata entry.
    pub fn metadata_path(study_id: &str, key: &str) -> String {
        format!(
            "/studies/{}/metadata/{}",
            urlencoding::encode(study_id),
            urlencoding::encode(key)
        )
    }
}
