//! The fixed pipeline: task bodies and graph wiring.
//!
//! One graph per run:
//! `download → extract → filter → {recode ×5} → join → persist → upload →
//! cleanup`, where download→extract and upload→cleanup are pure sequencing
//! and everything else passes data. The task set is wired explicitly here;
//! there is no registration side channel.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::domain::{Column, TaskValue};
use crate::error::PipelineError;
use crate::etl;
use crate::graph::spec::{Edge, Precondition, TaskInputs, TaskRun, TaskSpec};
use crate::graph::{Graph, RetryPolicy};
use crate::ports::{Extractor, Fetcher, ObjectStore};
use crate::transform::{self, Recode};

pub const DOWNLOAD: &str = "download";
pub const EXTRACT: &str = "extract";
pub const FILTER: &str = "filter";
pub const JOIN: &str = "join";
pub const PERSIST: &str = "persist";
pub const UPLOAD: &str = "upload";
pub const CLEANUP: &str = "cleanup";

/// Task id of the recode producing `output` ("recode_cor", ...).
pub fn recode_task_id(recode: &Recode) -> String {
    format!("recode_{}", recode.output())
}

/// External collaborators handed to the I/O tasks.
#[derive(Clone)]
pub struct Ports {
    pub fetcher: Arc<dyn Fetcher>,
    pub extractor: Arc<dyn Extractor>,
    pub store: Arc<dyn ObjectStore>,
}

struct FetchTask {
    fetcher: Arc<dyn Fetcher>,
    url: String,
    dest: PathBuf,
}

#[async_trait]
impl TaskRun for FetchTask {
    async fn run(&self, _inputs: &TaskInputs) -> Result<TaskValue, PipelineError> {
        self.fetcher
            .fetch(&self.url, &self.dest)
            .await
            .map(TaskValue::Path)
    }
}

/// Skip the download when the archive is already on disk.
struct ArchivePresent {
    path: PathBuf,
}

#[async_trait]
impl Precondition for ArchivePresent {
    async fn check(&self) -> Result<Option<TaskValue>, PipelineError> {
        if tokio::fs::try_exists(&self.path).await? {
            Ok(Some(TaskValue::Path(self.path.clone())))
        } else {
            Ok(None)
        }
    }
}

struct ExtractTask {
    extractor: Arc<dyn Extractor>,
    archive: PathBuf,
    inner_path: PathBuf,
    dest_dir: PathBuf,
}

#[async_trait]
impl TaskRun for ExtractTask {
    async fn run(&self, _inputs: &TaskInputs) -> Result<TaskValue, PipelineError> {
        self.extractor
            .extract(&self.archive, &self.inner_path, &self.dest_dir)
            .await
            .map(TaskValue::Path)
    }
}

struct FilterTask;

#[async_trait]
impl TaskRun for FilterTask {
    async fn run(&self, inputs: &TaskInputs) -> Result<TaskValue, PipelineError> {
        let path = inputs.path("raw_path")?.to_path_buf();
        let table = tokio::task::spawn_blocking(move || etl::load_filtered(&path))
            .await
            .map_err(|e| {
                PipelineError::Io(std::io::Error::other(format!("filter stage aborted: {e}")))
            })??;
        info!(rows = table.len(), "raw table filtered");
        Ok(TaskValue::Table(table))
    }
}

struct RecodeTask {
    recode: Recode,
}

#[async_trait]
impl TaskRun for RecodeTask {
    async fn run(&self, inputs: &TaskInputs) -> Result<TaskValue, PipelineError> {
        let filtered = inputs.table("filtered")?;
        let source = filtered.column(self.recode.source()).ok_or_else(|| {
            PipelineError::Schema(format!(
                "column {} missing from filtered table",
                self.recode.source()
            ))
        })?;
        Ok(TaskValue::Column(self.recode.apply(source)))
    }
}

struct JoinTask;

#[async_trait]
impl TaskRun for JoinTask {
    async fn run(&self, inputs: &TaskInputs) -> Result<TaskValue, PipelineError> {
        let filtered = inputs.table("filtered")?;
        let recoded: Vec<Column> = transform::registry()
            .iter()
            .map(|recode| inputs.column(recode.output()).map(Column::clone))
            .collect::<Result<_, _>>()?;
        etl::join(filtered, &recoded).map(TaskValue::Table)
    }
}

struct PersistTask {
    path: PathBuf,
}

#[async_trait]
impl TaskRun for PersistTask {
    async fn run(&self, inputs: &TaskInputs) -> Result<TaskValue, PipelineError> {
        let table = inputs.table("tidy")?.clone();
        let path = self.path.clone();
        let rows = table.len();
        tokio::task::spawn_blocking(move || etl::write_csv(&table, &path))
            .await
            .map_err(|e| {
                PipelineError::Io(std::io::Error::other(format!("persist stage aborted: {e}")))
            })??;
        info!(rows, path = %self.path.display(), "tidy artifact written");
        Ok(TaskValue::Path(self.path.clone()))
    }
}

struct UploadTask {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    key: String,
}

#[async_trait]
impl TaskRun for UploadTask {
    async fn run(&self, inputs: &TaskInputs) -> Result<TaskValue, PipelineError> {
        let local = inputs.path("artifact")?;
        self.store.put(&self.bucket, &self.key, local).await?;
        // The published object is now the source of truth; losing the local
        // copy is log-worthy, not fatal.
        if let Err(e) = tokio::fs::remove_file(local).await {
            warn!(path = %local.display(), error = %e, "could not remove uploaded file");
        }
        Ok(TaskValue::Unit)
    }
}

struct CleanupTask {
    extract_dir: PathBuf,
    artifact: PathBuf,
}

#[async_trait]
impl TaskRun for CleanupTask {
    async fn run(&self, _inputs: &TaskInputs) -> Result<TaskValue, PipelineError> {
        if let Err(e) = tokio::fs::remove_dir_all(&self.extract_dir).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %self.extract_dir.display(), error = %e, "could not remove extraction dir");
        }
        // Usually already gone after a successful upload.
        if let Err(e) = tokio::fs::remove_file(&self.artifact).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %self.artifact.display(), error = %e, "could not remove local artifact");
        }
        Ok(TaskValue::Unit)
    }
}

fn with_io_timeout(spec: TaskSpec, timeout: Option<Duration>) -> TaskSpec {
    match timeout {
        Some(limit) => spec.with_timeout(limit),
        None => spec,
    }
}

/// Build the fixed graph for one run. Validation (acyclicity, referential
/// integrity, input declarations) happens in `build()`, before any task runs.
pub fn build_graph(config: &PipelineConfig, ports: &Ports) -> Result<Graph, PipelineError> {
    let archive = config.archive_path();
    let output = config.output_path();
    let timeout = config.io_timeout();

    let mut builder = Graph::builder()
        .task(with_io_timeout(
            TaskSpec::io(
                DOWNLOAD,
                FetchTask {
                    fetcher: Arc::clone(&ports.fetcher),
                    url: config.source_url.clone(),
                    dest: archive.clone(),
                },
            )
            .with_retry(RetryPolicy::exponential(3, Duration::from_secs(2)))
            .with_precondition(ArchivePresent {
                path: archive.clone(),
            }),
            timeout,
        ))
        .task(with_io_timeout(
            TaskSpec::io(
                EXTRACT,
                ExtractTask {
                    extractor: Arc::clone(&ports.extractor),
                    archive,
                    inner_path: config.inner_path.clone(),
                    dest_dir: config.extract_dir(),
                },
            ),
            timeout,
        ))
        .task(TaskSpec::pure(FILTER, FilterTask).with_inputs(&["raw_path"]))
        .edge(Edge::order_only(DOWNLOAD, EXTRACT))
        .edge(Edge::data(EXTRACT, FILTER, "raw_path"));

    for recode in transform::registry() {
        let id = recode_task_id(&recode);
        builder = builder
            .task(TaskSpec::pure(id.as_str(), RecodeTask { recode }).with_inputs(&["filtered"]))
            .edge(Edge::data(FILTER, id.as_str(), "filtered"))
            .edge(Edge::data(id.as_str(), JOIN, recode.output()));
    }

    builder = builder
        .task(
            TaskSpec::pure(JOIN, JoinTask).with_inputs(&[
                "filtered", "estcivil", "cor", "escopai", "escomae", "renda",
            ]),
        )
        .edge(Edge::data(FILTER, JOIN, "filtered"))
        .task(with_io_timeout(
            TaskSpec::io(
                PERSIST,
                PersistTask {
                    path: output.clone(),
                },
            )
            .with_inputs(&["tidy"]),
            timeout,
        ))
        .edge(Edge::data(JOIN, PERSIST, "tidy"))
        .task(with_io_timeout(
            TaskSpec::io(
                UPLOAD,
                UploadTask {
                    store: Arc::clone(&ports.store),
                    bucket: config.bucket.clone(),
                    key: config.destination_key.clone(),
                },
            )
            .with_inputs(&["artifact"])
            .with_retry(RetryPolicy::fixed(2, Duration::from_secs(30))),
            timeout,
        ))
        .edge(Edge::data(PERSIST, UPLOAD, "artifact"))
        .task(TaskSpec::io(
            CLEANUP,
            CleanupTask {
                extract_dir: config.extract_dir(),
                artifact: output,
            },
        ))
        .edge(Edge::order_only(UPLOAD, CLEANUP));

    builder.build()
}
