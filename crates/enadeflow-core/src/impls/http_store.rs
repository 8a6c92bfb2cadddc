//! HTTP object-storage client.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::path::Path;
use tracing::info;

use crate::error::PipelineError;
use crate::ports::ObjectStore;

/// Uploads objects with an authenticated PUT against a storage HTTP API.
/// Upsert is enabled so re-publishing the same key is idempotent.
pub struct HttpObjectStore {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpObjectStore {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(&self, bucket: &str, key: &str, local: &Path) -> Result<(), PipelineError> {
        let bytes = tokio::fs::read(local).await?;
        let endpoint = format!(
            "{}/storage/v1/object/{bucket}/{key}",
            self.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .put(&endpoint)
            .bearer_auth(&self.token)
            .header(CONTENT_TYPE, "application/octet-stream")
            .query(&[("upsert", "true")])
            .body(bytes)
            .send()
            .await
            .map_err(|e| PipelineError::Upload(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Upload(format!("status {status}: {body}")));
        }
        info!(bucket, key, "artifact uploaded");
        Ok(())
    }
}
