//! Task specifications: what a unit of work is, before any run exists.
//!
//! Design:
//! - Tasks are constructed explicitly and handed to the graph builder. There
//!   is no global registry, so the task set is enumerable and testable in
//!   isolation.
//! - The body is a `TaskRun` trait object; the executor never knows what a
//!   task does, only what it produced.
//! - Skipping is a scheduler decision: a `Precondition` is evaluated before
//!   the first dispatch, never signalled from inside the body.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::retry::RetryPolicy;
use crate::domain::table::{Column, Table};
use crate::domain::{TaskId, TaskValue};
use crate::error::PipelineError;

/// Whether a task touches the outside world.
///
/// Only `Io` tasks are ever retried; a pure transform that fails will fail
/// identically on every attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Io,
    PureTransform,
}

/// The executable body of a task.
#[async_trait]
pub trait TaskRun: Send + Sync {
    async fn run(&self, inputs: &TaskInputs) -> Result<TaskValue, PipelineError>;
}

/// Predicate over external state, evaluated by the executor before the first
/// attempt. `Some(value)` means the task's effect is already in place and the
/// value stands in for its output. Expected to be cheap (an existence check,
/// not real work).
#[async_trait]
pub trait Precondition: Send + Sync {
    async fn check(&self) -> Result<Option<TaskValue>, PipelineError>;
}

/// Named upstream values handed to a task body.
#[derive(Debug, Clone)]
pub struct TaskInputs {
    task: TaskId,
    values: HashMap<String, Arc<TaskValue>>,
}

impl TaskInputs {
    pub fn new(task: TaskId, values: HashMap<String, Arc<TaskValue>>) -> Self {
        Self { task, values }
    }

    pub fn empty(task: impl Into<TaskId>) -> Self {
        Self {
            task: task.into(),
            values: HashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&TaskValue> {
        self.values.get(name).map(Arc::as_ref)
    }

    pub fn path(&self, name: &str) -> Result<&std::path::Path, PipelineError> {
        self.get(name)
            .and_then(TaskValue::as_path)
            .ok_or_else(|| self.missing(name))
    }

    pub fn table(&self, name: &str) -> Result<&Table, PipelineError> {
        self.get(name)
            .and_then(TaskValue::as_table)
            .ok_or_else(|| self.missing(name))
    }

    pub fn column(&self, name: &str) -> Result<&Column, PipelineError> {
        self.get(name)
            .and_then(TaskValue::as_column)
            .ok_or_else(|| self.missing(name))
    }

    fn missing(&self, name: &str) -> PipelineError {
        PipelineError::MissingInput {
            task: self.task.clone(),
            input: name.to_string(),
        }
    }
}

/// One unit of work, immutable once constructed.
pub struct TaskSpec {
    pub id: TaskId,
    pub kind: TaskKind,

    /// Input names this task expects; every incoming DATA edge must bind one.
    pub inputs: Vec<String>,

    pub run: Arc<dyn TaskRun>,
    pub retry: RetryPolicy,
    pub precondition: Option<Arc<dyn Precondition>>,

    /// Cap on one attempt's duration; overrun counts as a failed attempt.
    pub timeout: Option<Duration>,
}

impl TaskSpec {
    /// An I/O task: eligible for retries per its policy.
    pub fn io(id: impl Into<TaskId>, run: impl TaskRun + 'static) -> Self {
        Self::new(id, TaskKind::Io, run)
    }

    /// A pure transform: deterministic, never retried.
    pub fn pure(id: impl Into<TaskId>, run: impl TaskRun + 'static) -> Self {
        Self::new(id, TaskKind::PureTransform, run)
    }

    fn new(id: impl Into<TaskId>, kind: TaskKind, run: impl TaskRun + 'static) -> Self {
        Self {
            id: id.into(),
            kind,
            inputs: Vec::new(),
            run: Arc::new(run),
            retry: RetryPolicy::none(),
            precondition: None,
            timeout: None,
        }
    }

    pub fn with_inputs(mut self, names: &[&str]) -> Self {
        self.inputs = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_precondition(mut self, precondition: impl Precondition + 'static) -> Self {
        self.precondition = Some(Arc::new(precondition));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSpec")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("inputs", &self.inputs)
            .field("max_attempts", &self.retry.max_attempts)
            .field("has_precondition", &self.precondition.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// A dependency between two tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub from: TaskId,
    pub to: TaskId,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeKind {
    /// The source's output is passed to the target under `input`.
    Data { input: String },

    /// Pure sequencing; no value flows.
    OrderOnly,
}

impl Edge {
    pub fn data(
        from: impl Into<TaskId>,
        to: impl Into<TaskId>,
        input: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind: EdgeKind::Data {
                input: input.into(),
            },
        }
    }

    pub fn order_only(from: impl Into<TaskId>, to: impl Into<TaskId>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind: EdgeKind::OrderOnly,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl TaskRun for Noop {
        async fn run(&self, _inputs: &TaskInputs) -> Result<TaskValue, PipelineError> {
            Ok(TaskValue::Unit)
        }
    }

    #[test]
    fn spec_defaults() {
        let spec = TaskSpec::pure("join", Noop);
        assert_eq!(spec.kind, TaskKind::PureTransform);
        assert_eq!(spec.retry.max_attempts, 0);
        assert!(spec.precondition.is_none());
        assert!(spec.timeout.is_none());
        assert!(spec.inputs.is_empty());
    }

    #[test]
    fn inputs_report_missing_values_with_task_context() {
        let inputs = TaskInputs::empty("join");
        let err = inputs.table("filtered").unwrap_err();
        match err {
            PipelineError::MissingInput { task, input } => {
                assert_eq!(task.as_str(), "join");
                assert_eq!(input, "filtered");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn inputs_reject_wrong_value_shape() {
        let mut values = HashMap::new();
        values.insert("raw_path".to_string(), Arc::new(TaskValue::Unit));
        let inputs = TaskInputs::new(TaskId::new("filter"), values);
        assert!(inputs.path("raw_path").is_err());
    }
}
