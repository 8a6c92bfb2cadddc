//! Ports: the seams to external collaborators.
//!
//! The pipeline only ever talks to the network and the archive format through
//! these traits; production adapters live in `impls`, and tests substitute
//! fakes.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;

/// Retrieves the remote archive to a local path.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<PathBuf, PipelineError>;
}

/// Extracts one expected entry out of a local archive.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Returns the path of the extracted entry under `dest_dir`. Fails with
    /// `Extract` if the entry is absent from the archive.
    async fn extract(
        &self,
        archive: &Path,
        inner_path: &Path,
        dest_dir: &Path,
    ) -> Result<PathBuf, PipelineError>;
}

/// Publishes a local file to durable object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, bucket: &str, key: &str, local: &Path) -> Result<(), PipelineError>;
}
