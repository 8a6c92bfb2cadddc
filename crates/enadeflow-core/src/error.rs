//! Error taxonomy.
//!
//! Design:
//! - One enum for everything the pipeline can raise, with `#[from]` for the
//!   library errors that flow through unchanged.
//! - `ErrorKind` classifies each variant for retry decisions and run reports:
//!   only transient errors are ever retried, because retrying a schema or
//!   parse failure cannot change its outcome.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::domain::TaskId;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("schema error: {0}")]
    Schema(String),

    #[error("parse error in column {column}: {value:?}")]
    Parse { column: String, value: String },

    #[error("graph error: {0}")]
    Graph(String),

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("archive extraction failed: {0}")]
    Extract(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("task {task} is missing input {input:?}")]
    MissingInput { task: TaskId, input: String },

    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Schema(_) => ErrorKind::Schema,
            PipelineError::Parse { .. } | PipelineError::Csv(_) => ErrorKind::Parse,
            PipelineError::Graph(_) => ErrorKind::Graph,
            PipelineError::Fetch(_)
            | PipelineError::Upload(_)
            | PipelineError::Io(_)
            | PipelineError::Timeout(_) => ErrorKind::Transient,
            PipelineError::Extract(_) | PipelineError::MissingInput { .. } => ErrorKind::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

/// Operational classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Expected column missing. Fatal to the filter stage, never retried.
    Schema,

    /// Malformed field. Fatal, never retried.
    Parse,

    /// Malformed DAG. Fatal at construction, aborts before execution.
    Graph,

    /// Network or storage hiccup. Retried per policy.
    Transient,

    /// Anything else retrying cannot fix (absent archive entry, bad wiring).
    Permanent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(PipelineError::Fetch("reset".into()).is_transient());
        assert!(PipelineError::Upload("503".into()).is_transient());
        assert!(PipelineError::Timeout(Duration::from_secs(1)).is_transient());
    }

    #[test]
    fn pure_computation_errors_are_not() {
        assert!(!PipelineError::Schema("missing".into()).is_transient());
        assert!(
            !PipelineError::Parse {
                column: "NT_GER".into(),
                value: "abc".into(),
            }
            .is_transient()
        );
        assert!(!PipelineError::Graph("cycle".into()).is_transient());
        assert!(!PipelineError::Extract("no entry".into()).is_transient());
    }

    #[test]
    fn kind_classification() {
        assert_eq!(PipelineError::Schema("x".into()).kind(), ErrorKind::Schema);
        assert_eq!(
            PipelineError::Io(std::io::Error::other("disk")).kind(),
            ErrorKind::Transient
        );
    }
}
