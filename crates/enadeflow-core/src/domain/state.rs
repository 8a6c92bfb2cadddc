//! Task and run state vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{RunId, TaskId};
use crate::error::ErrorKind;

/// Per-task state within one run.
///
/// State transitions:
/// - Pending -> Running -> Succeeded
/// - Pending -> Running -> Running (retry, until attempts are exhausted)
/// - Pending -> Running -> Failed
/// - Pending -> Skipped (precondition met, upstream failed, or cancelled)
///
/// A task waiting out a retry backoff is Pending again; the executor tracks the
/// wakeup internally so the public state set stays at these five.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    /// Not yet dispatched (or waiting for a retry slot).
    Pending,

    /// An attempt is currently executing.
    Running,

    /// Produced its output.
    Succeeded,

    /// Terminal without the body ever running (see [`SkipReason`]).
    Skipped,

    /// All attempts exhausted.
    Failed,
}

impl TaskState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Skipped | TaskState::Failed
        )
    }

    /// Is this task eligible for dispatch?
    pub fn is_runnable(self) -> bool {
        matches!(self, TaskState::Pending)
    }
}

/// Why a task reached `Skipped` without its body running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// The precondition reported the task's effect already in place; its
    /// recovered output is reused downstream.
    PreconditionMet,

    /// A data dependency failed (or was itself skipped without an output).
    UpstreamFailed,

    /// The run was cancelled before the task could be dispatched.
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::PreconditionMet => write!(f, "precondition_met"),
            SkipReason::UpstreamFailed => write!(f, "upstream_failed"),
            SkipReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Counts by state for observability.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RunCounts {
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Terminal outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Every task succeeded or was skipped with a reusable output.
    Succeeded,

    /// At least one task exhausted its attempts. Names the first failure.
    Failed { first_failed: TaskId, kind: ErrorKind },

    /// Neither a clean success nor a concrete failure: tasks were skipped for
    /// cancellation, so the persist/upload chain never executed.
    Partial,
}

/// What the controller reports after one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub status: RunStatus,
    pub counts: RunCounts,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}
