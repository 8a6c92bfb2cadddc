//! HTTP archive fetcher.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::PipelineError;
use crate::ports::Fetcher;

/// Downloads the archive over HTTP(S).
#[derive(Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<PathBuf, PipelineError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PipelineError::Fetch(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Fetch(format!("{url} returned status {status}")));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| PipelineError::Fetch(e.to_string()))?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, &bytes).await?;
        info!(url, bytes = bytes.len(), dest = %dest.display(), "archive downloaded");
        Ok(dest.to_path_buf())
    }
}
