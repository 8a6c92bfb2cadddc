//! Per-run task records.
//!
//! Design:
//! - `RunState` is the single source of truth for task states within one run.
//!   The executor's dispatch structures hold `TaskId`s only.
//! - Mutated exclusively by the executor's event loop; task bodies report
//!   results over a channel and never touch it. One run, one owner.

use std::collections::HashMap;
use std::sync::Arc;

use super::Graph;
use crate::domain::{RunCounts, SkipReason, TaskId, TaskState, TaskValue};
use crate::error::PipelineError;

/// State, attempt count and outcome of one task within one run.
#[derive(Debug)]
pub struct TaskRecord {
    pub state: TaskState,

    /// Attempts started so far (including a currently running one).
    pub attempts: u32,

    /// Output, present once Succeeded or Skipped with a reusable value.
    pub value: Option<Arc<TaskValue>>,

    pub skip_reason: Option<SkipReason>,
    pub error: Option<PipelineError>,
}

impl TaskRecord {
    fn new() -> Self {
        Self {
            state: TaskState::Pending,
            attempts: 0,
            value: None,
            skip_reason: None,
            error: None,
        }
    }

    /// Does this record carry an output a dependent task can consume?
    pub fn has_output(&self) -> bool {
        self.value.is_some()
    }
}

/// All task records for one run, keyed by task id.
#[derive(Debug)]
pub struct RunState {
    records: HashMap<TaskId, TaskRecord>,
    first_failed: Option<TaskId>,
}

impl RunState {
    /// Fresh state for every task in the graph, all Pending.
    pub fn for_graph(graph: &Graph) -> Self {
        Self {
            records: graph
                .task_ids()
                .map(|id| (id.clone(), TaskRecord::new()))
                .collect(),
            first_failed: None,
        }
    }

    pub fn record(&self, id: &TaskId) -> &TaskRecord {
        self.records
            .get(id)
            .expect("every task id in a run comes from the graph that built this state")
    }

    fn record_mut(&mut self, id: &TaskId) -> &mut TaskRecord {
        self.records
            .get_mut(id)
            .expect("every task id in a run comes from the graph that built this state")
    }

    pub fn state_of(&self, id: &TaskId) -> TaskState {
        self.record(id).state
    }

    pub fn attempts(&self, id: &TaskId) -> u32 {
        self.record(id).attempts
    }

    pub fn value_of(&self, id: &TaskId) -> Option<Arc<TaskValue>> {
        self.record(id).value.clone()
    }

    pub fn first_failed(&self) -> Option<&TaskId> {
        self.first_failed.as_ref()
    }

    pub fn records(&self) -> impl Iterator<Item = (&TaskId, &TaskRecord)> {
        self.records.iter()
    }

    pub fn all_terminal(&self) -> bool {
        self.records.values().all(|r| r.state.is_terminal())
    }

    pub fn counts(&self) -> RunCounts {
        let mut counts = RunCounts::default();
        for record in self.records.values() {
            match record.state {
                TaskState::Pending => counts.pending += 1,
                TaskState::Running => counts.running += 1,
                TaskState::Succeeded => counts.succeeded += 1,
                TaskState::Skipped => counts.skipped += 1,
                TaskState::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Pending -> Running, counting the attempt.
    pub fn start_attempt(&mut self, id: &TaskId) {
        let record = self.record_mut(id);
        record.state = TaskState::Running;
        record.attempts += 1;
    }

    /// Running -> Pending, to wait out a retry backoff.
    pub fn requeue(&mut self, id: &TaskId) {
        self.record_mut(id).state = TaskState::Pending;
    }

    pub fn mark_succeeded(&mut self, id: &TaskId, value: Arc<TaskValue>) {
        let record = self.record_mut(id);
        record.state = TaskState::Succeeded;
        record.value = Some(value);
    }

    pub fn mark_failed(&mut self, id: &TaskId, error: PipelineError) {
        let record = self.record_mut(id);
        record.state = TaskState::Failed;
        record.error = Some(error);
        if self.first_failed.is_none() {
            self.first_failed = Some(id.clone());
        }
    }

    pub fn mark_skipped(
        &mut self,
        id: &TaskId,
        reason: SkipReason,
        value: Option<Arc<TaskValue>>,
    ) {
        let record = self.record_mut(id);
        record.state = TaskState::Skipped;
        record.skip_reason = Some(reason);
        record.value = value;
    }
}
