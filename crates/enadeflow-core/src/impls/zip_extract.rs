//! Zip archive extractor.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::PipelineError;
use crate::ports::Extractor;

/// Extracts one entry from a zip archive on the blocking thread pool.
pub struct ZipExtractor;

#[async_trait]
impl Extractor for ZipExtractor {
    async fn extract(
        &self,
        archive: &Path,
        inner_path: &Path,
        dest_dir: &Path,
    ) -> Result<PathBuf, PipelineError> {
        let archive = archive.to_path_buf();
        let inner_path = inner_path.to_path_buf();
        let dest_dir = dest_dir.to_path_buf();

        let out_path = tokio::task::spawn_blocking(move || {
            extract_entry(&archive, &inner_path, &dest_dir)
        })
        .await
        .map_err(|e| PipelineError::Extract(format!("extraction task aborted: {e}")))??;

        info!(path = %out_path.display(), "archive entry extracted");
        Ok(out_path)
    }
}

fn extract_entry(
    archive: &Path,
    inner_path: &Path,
    dest_dir: &Path,
) -> Result<PathBuf, PipelineError> {
    let file = std::fs::File::open(archive)?;
    let mut zip =
        zip::ZipArchive::new(file).map_err(|e| PipelineError::Extract(e.to_string()))?;

    // Zip entry names always use forward slashes.
    let entry_name = inner_path
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    let mut entry = zip.by_name(&entry_name).map_err(|_| {
        PipelineError::Extract(format!(
            "entry {entry_name} not found in {}",
            archive.display()
        ))
    })?;

    let out_path = dest_dir.join(inner_path);
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut out = std::fs::File::create(&out_path)?;
    std::io::copy(&mut entry, &mut out)?;
    Ok(out_path)
}
