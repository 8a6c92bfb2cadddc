//! Scheduler/executor: walks a graph, dispatching ready tasks.
//!
//! Design:
//! - Dispatch and execution are decoupled. Every attempt runs in its own
//!   spawned task and reports back over an mpsc channel; the loop here is the
//!   only writer of `RunState`, so per-task state transitions are serialized
//!   without a lock and a slow attempt never starves readiness evaluation.
//! - Retry backoff lives in a min-heap of `(wakeup, task)` entries raced
//!   against the result channel with `select!`. A task waiting out a backoff
//!   is Pending but held, so it cannot be re-dispatched early.
//! - Readiness: DATA parents must be Succeeded or Skipped with a reusable
//!   output; ORDER_ONLY parents merely terminal. A Failed DATA parent (or a
//!   skip without output) propagates forward as `Skipped(UpstreamFailed)`.
//! - Cancellation is cooperative: running attempts finish, nothing new is
//!   dispatched, remaining Pending tasks resolve to `Skipped(Cancelled)`.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::domain::{SkipReason, TaskId, TaskState, TaskValue};
use crate::error::PipelineError;
use crate::graph::spec::{TaskInputs, TaskKind};
use crate::graph::{Graph, RunState};

/// Result of one finished attempt, reported by the spawned body.
struct AttemptOutcome {
    task: TaskId,
    result: Result<TaskValue, PipelineError>,
}

/// Retry wakeup entry. Reverse ordering turns `BinaryHeap` into a min-heap,
/// earliest wakeup first.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduledRetry {
    next_run_at: Instant,
    task: TaskId,
}

impl PartialOrd for ScheduledRetry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledRetry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .next_run_at
            .cmp(&self.next_run_at)
            .then_with(|| other.task.cmp(&self.task))
    }
}

/// Executes one graph to completion.
pub struct Executor {
    max_parallel: usize,
}

impl Executor {
    pub fn new(max_parallel: usize) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
        }
    }

    /// Drive every task in `graph` to a terminal state.
    ///
    /// The caller owns `state` and reads the outcome from it afterwards; this
    /// method itself cannot fail (task failures are recorded, not raised).
    /// Dropping the `cancel` sender is treated as a cancellation request.
    pub async fn run(&self, graph: &Graph, state: &mut RunState, mut cancel: watch::Receiver<bool>) {
        let (tx, mut rx) = mpsc::channel::<AttemptOutcome>(graph.len().max(1));
        let mut scheduled: BinaryHeap<ScheduledRetry> = BinaryHeap::new();
        let mut held: HashSet<TaskId> = HashSet::new();
        let mut running = 0usize;
        let mut cancel_closed = false;

        loop {
            propagate_upstream_skips(graph, state);

            if cancel_closed || *cancel.borrow() {
                cancel_pending(graph, state, &mut held, &mut scheduled);
            } else {
                self.dispatch_ready(graph, state, &held, &mut running, &tx).await;
            }

            if running == 0 && state.all_terminal() {
                break;
            }

            // Wait for a result, the next retry wakeup, or cancellation.
            let next_wake = scheduled.peek().map(|entry| entry.next_run_at);
            if let Some(wake) = next_wake {
                tokio::select! {
                    maybe = rx.recv() => {
                        if let Some(outcome) = maybe {
                            running -= 1;
                            on_attempt_outcome(graph, state, &mut held, &mut scheduled, outcome);
                        }
                    }
                    _ = tokio::time::sleep_until(wake.into()) => {
                        promote_due_retries(&mut held, &mut scheduled);
                    }
                    changed = cancel.changed(), if !cancel_closed => {
                        if changed.is_err() {
                            cancel_closed = true;
                        }
                    }
                }
            } else {
                tokio::select! {
                    maybe = rx.recv() => {
                        if let Some(outcome) = maybe {
                            running -= 1;
                            on_attempt_outcome(graph, state, &mut held, &mut scheduled, outcome);
                        }
                    }
                    changed = cancel.changed(), if !cancel_closed => {
                        if changed.is_err() {
                            cancel_closed = true;
                        }
                    }
                }
            }
        }
    }

    /// Dispatch every ready Pending task, up to the parallelism bound.
    async fn dispatch_ready(
        &self,
        graph: &Graph,
        state: &mut RunState,
        held: &HashSet<TaskId>,
        running: &mut usize,
        tx: &mpsc::Sender<AttemptOutcome>,
    ) {
        let ids: Vec<TaskId> = graph.task_ids().cloned().collect();
        for id in ids {
            if *running >= self.max_parallel {
                break;
            }
            if state.state_of(&id) != TaskState::Pending || held.contains(&id) {
                continue;
            }
            if !is_ready(graph, state, &id) {
                continue;
            }
            let spec = graph
                .task(&id)
                .expect("dispatch iterates ids taken from the graph");

            // The precondition is consulted once, before the first attempt;
            // a retry must re-do the work, not trust its partial effects.
            if state.attempts(&id) == 0
                && let Some(precondition) = &spec.precondition
            {
                match precondition.check().await {
                    Ok(Some(value)) => {
                        info!(task = %id, "precondition satisfied, skipping");
                        state.mark_skipped(&id, SkipReason::PreconditionMet, Some(Arc::new(value)));
                        continue;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        error!(task = %id, error = %err, "precondition check failed");
                        state.mark_failed(&id, err);
                        continue;
                    }
                }
            }

            let mut values = HashMap::new();
            for (parent, input) in graph.data_parents(&id) {
                let value = state
                    .value_of(parent)
                    .expect("readiness requires every data parent to carry an output");
                values.insert(input.clone(), value);
            }
            let inputs = TaskInputs::new(id.clone(), values);

            state.start_attempt(&id);
            *running += 1;
            debug!(task = %id, attempt = state.attempts(&id), "dispatching");

            let run = Arc::clone(&spec.run);
            let timeout = spec.timeout;
            let tx = tx.clone();
            let task = id;
            tokio::spawn(async move {
                let result = match timeout {
                    Some(limit) => match tokio::time::timeout(limit, run.run(&inputs)).await {
                        Ok(result) => result,
                        Err(_) => Err(PipelineError::Timeout(limit)),
                    },
                    None => run.run(&inputs).await,
                };
                // The loop holds the receiver for the whole run; a send can
                // only fail if the run itself was dropped.
                let _ = tx.send(AttemptOutcome { task, result }).await;
            });
        }
    }
}

fn is_ready(graph: &Graph, state: &RunState, id: &TaskId) -> bool {
    let data_ok = graph.data_parents(id).iter().all(|(parent, _)| {
        let record = state.record(parent);
        record.state == TaskState::Succeeded
            || (record.state == TaskState::Skipped && record.has_output())
    });
    let order_ok = graph
        .order_parents(id)
        .iter()
        .all(|parent| state.state_of(parent).is_terminal());
    data_ok && order_ok
}

/// Forward failure propagation: a Pending task with a Failed DATA parent (or
/// one skipped without an output) can never run. Repeats to a fixpoint so the
/// skip cascades through the whole reachable set before anything dispatches.
fn propagate_upstream_skips(graph: &Graph, state: &mut RunState) {
    loop {
        let mut blocked = Vec::new();
        for id in graph.task_ids() {
            if state.state_of(id) != TaskState::Pending {
                continue;
            }
            let has_dead_parent = graph.data_parents(id).iter().any(|(parent, _)| {
                let record = state.record(parent);
                record.state == TaskState::Failed
                    || (record.state == TaskState::Skipped && !record.has_output())
            });
            if has_dead_parent {
                blocked.push(id.clone());
            }
        }
        if blocked.is_empty() {
            break;
        }
        for id in blocked {
            warn!(task = %id, "skipping: upstream failed");
            state.mark_skipped(&id, SkipReason::UpstreamFailed, None);
        }
    }
}

fn cancel_pending(
    graph: &Graph,
    state: &mut RunState,
    held: &mut HashSet<TaskId>,
    scheduled: &mut BinaryHeap<ScheduledRetry>,
) {
    held.clear();
    scheduled.clear();
    let pending: Vec<TaskId> = graph
        .task_ids()
        .filter(|id| state.state_of(id) == TaskState::Pending)
        .cloned()
        .collect();
    for id in pending {
        info!(task = %id, "skipping: run cancelled");
        state.mark_skipped(&id, SkipReason::Cancelled, None);
    }
}

fn on_attempt_outcome(
    graph: &Graph,
    state: &mut RunState,
    held: &mut HashSet<TaskId>,
    scheduled: &mut BinaryHeap<ScheduledRetry>,
    outcome: AttemptOutcome,
) {
    let AttemptOutcome { task, result } = outcome;
    let spec = graph
        .task(&task)
        .expect("outcomes only arrive for dispatched tasks");
    match result {
        Ok(value) => {
            info!(task = %task, "succeeded");
            state.mark_succeeded(&task, Arc::new(value));
        }
        Err(error) => {
            let attempts = state.attempts(&task);
            let retryable = spec.kind == TaskKind::Io
                && error.is_transient()
                && attempts <= spec.retry.max_attempts;
            if retryable {
                let delay = spec.retry.next_delay(attempts);
                warn!(
                    task = %task,
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "attempt failed, retry scheduled"
                );
                state.requeue(&task);
                held.insert(task.clone());
                scheduled.push(ScheduledRetry {
                    next_run_at: Instant::now() + delay,
                    task,
                });
            } else {
                error!(task = %task, attempts, error = %error, "task failed");
                state.mark_failed(&task, error);
            }
        }
    }
}

/// Release tasks whose backoff has elapsed. The heap is sorted, so the first
/// non-due entry ends the scan.
fn promote_due_retries(held: &mut HashSet<TaskId>, scheduled: &mut BinaryHeap<ScheduledRetry>) {
    let now = Instant::now();
    while let Some(entry) = scheduled.peek() {
        if entry.next_run_at > now {
            break;
        }
        let entry = scheduled.pop().expect("peeked entry exists");
        if held.remove(&entry.task) {
            debug!(task = %entry.task, "retry backoff elapsed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::spec::{Edge, Precondition, TaskRun, TaskSpec};
    use crate::graph::RetryPolicy;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering as AtomicOrdering};
    use std::time::Duration;

    struct Produce(TaskValue);

    #[async_trait]
    impl TaskRun for Produce {
        async fn run(&self, _inputs: &TaskInputs) -> Result<TaskValue, PipelineError> {
            Ok(self.0.clone())
        }
    }

    /// Echoes the named input back as its own output.
    struct Echo(&'static str);

    #[async_trait]
    impl TaskRun for Echo {
        async fn run(&self, inputs: &TaskInputs) -> Result<TaskValue, PipelineError> {
            Ok(TaskValue::Path(inputs.path(self.0)?.to_path_buf()))
        }
    }

    /// Fails n times, then succeeds.
    struct Flaky {
        remaining_failures: AtomicU32,
    }

    impl Flaky {
        fn new(n: u32) -> Self {
            Self {
                remaining_failures: AtomicU32::new(n),
            }
        }
    }

    #[async_trait]
    impl TaskRun for Flaky {
        async fn run(&self, _inputs: &TaskInputs) -> Result<TaskValue, PipelineError> {
            let left = self.remaining_failures.load(AtomicOrdering::Relaxed);
            if left > 0 {
                self.remaining_failures.fetch_sub(1, AtomicOrdering::Relaxed);
                return Err(PipelineError::Upload(format!("intentional failure (left={left})")));
            }
            Ok(TaskValue::Unit)
        }
    }

    struct AlwaysFail(fn(String) -> PipelineError);

    #[async_trait]
    impl TaskRun for AlwaysFail {
        async fn run(&self, _inputs: &TaskInputs) -> Result<TaskValue, PipelineError> {
            Err((self.0)("boom".into()))
        }
    }

    struct Sleeper(Duration);

    #[async_trait]
    impl TaskRun for Sleeper {
        async fn run(&self, _inputs: &TaskInputs) -> Result<TaskValue, PipelineError> {
            tokio::time::sleep(self.0).await;
            Ok(TaskValue::Unit)
        }
    }

    struct CountingPrecondition {
        calls: Arc<AtomicU32>,
        answer: Option<TaskValue>,
    }

    #[async_trait]
    impl Precondition for CountingPrecondition {
        async fn check(&self) -> Result<Option<TaskValue>, PipelineError> {
            self.calls.fetch_add(1, AtomicOrdering::Relaxed);
            Ok(self.answer.clone())
        }
    }

    async fn execute(graph: &Graph, state: &mut RunState) {
        let (keep_alive, cancel) = watch::channel(false);
        Executor::new(4).run(graph, state, cancel).await;
        drop(keep_alive);
    }

    fn id(s: &str) -> TaskId {
        TaskId::new(s)
    }

    #[tokio::test]
    async fn linear_chain_passes_values_downstream() {
        let graph = Graph::builder()
            .task(TaskSpec::io("a", Produce(TaskValue::Path(PathBuf::from("/tmp/raw")))))
            .task(TaskSpec::pure("b", Echo("from_a")).with_inputs(&["from_a"]))
            .edge(Edge::data("a", "b", "from_a"))
            .build()
            .unwrap();
        let mut state = RunState::for_graph(&graph);
        execute(&graph, &mut state).await;

        assert_eq!(state.state_of(&id("b")), TaskState::Succeeded);
        let value = state.value_of(&id("b")).unwrap();
        assert_eq!(value.as_path().unwrap(), std::path::Path::new("/tmp/raw"));
    }

    #[tokio::test]
    async fn independent_tasks_all_complete() {
        let graph = Graph::builder()
            .task(TaskSpec::pure("a", Produce(TaskValue::Unit)))
            .task(TaskSpec::pure("b", Produce(TaskValue::Unit)))
            .task(TaskSpec::pure("c", Produce(TaskValue::Unit)))
            .build()
            .unwrap();
        let mut state = RunState::for_graph(&graph);
        execute(&graph, &mut state).await;

        assert_eq!(state.counts().succeeded, 3);
        assert!(state.all_terminal());
    }

    #[tokio::test]
    async fn flaky_io_succeeds_within_retry_budget() {
        let graph = Graph::builder()
            .task(
                TaskSpec::io("upload", Flaky::new(2))
                    .with_retry(RetryPolicy::fixed(2, Duration::from_millis(5))),
            )
            .build()
            .unwrap();
        let mut state = RunState::for_graph(&graph);
        execute(&graph, &mut state).await;

        assert_eq!(state.state_of(&id("upload")), TaskState::Succeeded);
        assert_eq!(state.attempts(&id("upload")), 3);
    }

    #[tokio::test]
    async fn io_task_fails_after_exhausting_retries() {
        let graph = Graph::builder()
            .task(
                TaskSpec::io("upload", Flaky::new(3))
                    .with_retry(RetryPolicy::fixed(2, Duration::from_millis(5))),
            )
            .build()
            .unwrap();
        let mut state = RunState::for_graph(&graph);
        execute(&graph, &mut state).await;

        assert_eq!(state.state_of(&id("upload")), TaskState::Failed);
        assert_eq!(state.attempts(&id("upload")), 3);
        assert_eq!(state.first_failed(), Some(&id("upload")));
    }

    #[tokio::test]
    async fn pure_task_is_never_retried() {
        // Transient-looking error + generous retry budget, but the task is a
        // pure transform: one attempt, then Failed.
        let graph = Graph::builder()
            .task(
                TaskSpec::pure("recode", AlwaysFail(PipelineError::Upload))
                    .with_retry(RetryPolicy::fixed(5, Duration::from_millis(1))),
            )
            .build()
            .unwrap();
        let mut state = RunState::for_graph(&graph);
        execute(&graph, &mut state).await;

        assert_eq!(state.state_of(&id("recode")), TaskState::Failed);
        assert_eq!(state.attempts(&id("recode")), 1);
    }

    #[tokio::test]
    async fn schema_error_is_not_retried_even_on_io_task() {
        let graph = Graph::builder()
            .task(
                TaskSpec::io("fetch", AlwaysFail(PipelineError::Schema))
                    .with_retry(RetryPolicy::fixed(5, Duration::from_millis(1))),
            )
            .build()
            .unwrap();
        let mut state = RunState::for_graph(&graph);
        execute(&graph, &mut state).await;

        assert_eq!(state.state_of(&id("fetch")), TaskState::Failed);
        assert_eq!(state.attempts(&id("fetch")), 1);
    }

    #[tokio::test]
    async fn upstream_failure_skips_data_descendants() {
        let graph = Graph::builder()
            .task(TaskSpec::pure("filter", AlwaysFail(PipelineError::Schema)))
            .task(TaskSpec::pure("recode", Echo("filtered")).with_inputs(&["filtered"]))
            .task(TaskSpec::pure("join", Echo("recoded")).with_inputs(&["recoded"]))
            .edge(Edge::data("filter", "recode", "filtered"))
            .edge(Edge::data("recode", "join", "recoded"))
            .build()
            .unwrap();
        let mut state = RunState::for_graph(&graph);
        execute(&graph, &mut state).await;

        assert_eq!(state.state_of(&id("filter")), TaskState::Failed);
        for task in ["recode", "join"] {
            let record = state.record(&id(task));
            assert_eq!(record.state, TaskState::Skipped, "{task}");
            assert_eq!(record.skip_reason, Some(SkipReason::UpstreamFailed), "{task}");
            assert_eq!(record.attempts, 0, "{task} must never run");
        }
        assert_eq!(state.first_failed(), Some(&id("filter")));
    }

    #[tokio::test]
    async fn order_only_successor_still_runs_after_failure() {
        let graph = Graph::builder()
            .task(TaskSpec::io("upload", AlwaysFail(PipelineError::Upload)))
            .task(TaskSpec::io("cleanup", Produce(TaskValue::Unit)))
            .edge(Edge::order_only("upload", "cleanup"))
            .build()
            .unwrap();
        let mut state = RunState::for_graph(&graph);
        execute(&graph, &mut state).await;

        assert_eq!(state.state_of(&id("upload")), TaskState::Failed);
        assert_eq!(state.state_of(&id("cleanup")), TaskState::Succeeded);
    }

    #[tokio::test]
    async fn precondition_skip_feeds_downstream() {
        let calls = Arc::new(AtomicU32::new(0));
        let graph = Graph::builder()
            .task(
                TaskSpec::io("download", AlwaysFail(PipelineError::Fetch)).with_precondition(
                    CountingPrecondition {
                        calls: Arc::clone(&calls),
                        answer: Some(TaskValue::Path(PathBuf::from("/data/archive.zip"))),
                    },
                ),
            )
            .task(TaskSpec::pure("extract", Echo("archive")).with_inputs(&["archive"]))
            .edge(Edge::data("download", "extract", "archive"))
            .build()
            .unwrap();
        let mut state = RunState::for_graph(&graph);
        execute(&graph, &mut state).await;

        let download = state.record(&id("download"));
        assert_eq!(download.state, TaskState::Skipped);
        assert_eq!(download.skip_reason, Some(SkipReason::PreconditionMet));
        assert_eq!(download.attempts, 0);
        assert_eq!(calls.load(AtomicOrdering::Relaxed), 1);

        let extract = state.value_of(&id("extract")).unwrap();
        assert_eq!(
            extract.as_path().unwrap(),
            std::path::Path::new("/data/archive.zip")
        );
    }

    #[tokio::test]
    async fn unmet_precondition_is_checked_once_across_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let graph = Graph::builder()
            .task(
                TaskSpec::io("download", Flaky::new(1))
                    .with_retry(RetryPolicy::fixed(2, Duration::from_millis(5)))
                    .with_precondition(CountingPrecondition {
                        calls: Arc::clone(&calls),
                        answer: None,
                    }),
            )
            .build()
            .unwrap();
        let mut state = RunState::for_graph(&graph);
        execute(&graph, &mut state).await;

        assert_eq!(state.state_of(&id("download")), TaskState::Succeeded);
        assert_eq!(state.attempts(&id("download")), 2);
        assert_eq!(calls.load(AtomicOrdering::Relaxed), 1);
    }

    #[tokio::test]
    async fn cancellation_lets_running_finish_and_skips_pending() {
        let graph = Graph::builder()
            .task(TaskSpec::io("slow", Sleeper(Duration::from_millis(50))))
            .task(TaskSpec::pure("after", Produce(TaskValue::Unit)).with_inputs(&["x"]))
            .edge(Edge::data("slow", "after", "x"))
            .build()
            .unwrap();
        let mut state = RunState::for_graph(&graph);

        let (tx, cancel) = watch::channel(false);
        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = tx.send(true);
        });
        Executor::new(2).run(&graph, &mut state, cancel).await;
        trigger.await.unwrap();

        // The running task finished normally; the dependent never started.
        assert_eq!(state.state_of(&id("slow")), TaskState::Succeeded);
        let after = state.record(&id("after"));
        assert_eq!(after.state, TaskState::Skipped);
        assert_eq!(after.skip_reason, Some(SkipReason::Cancelled));
    }

    #[tokio::test]
    async fn timeout_counts_as_failed_attempt() {
        let graph = Graph::builder()
            .task(
                TaskSpec::io("slow", Sleeper(Duration::from_millis(100)))
                    .with_timeout(Duration::from_millis(10)),
            )
            .build()
            .unwrap();
        let mut state = RunState::for_graph(&graph);
        execute(&graph, &mut state).await;

        let record = state.record(&id("slow"));
        assert_eq!(record.state, TaskState::Failed);
        assert!(matches!(record.error, Some(PipelineError::Timeout(_))));
    }

    /// Records how many bodies overlap, to check the parallelism bound.
    struct Gauge {
        current: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TaskRun for Gauge {
        async fn run(&self, _inputs: &TaskInputs) -> Result<TaskValue, PipelineError> {
            let now = self.current.fetch_add(1, AtomicOrdering::SeqCst) + 1;
            self.peak.fetch_max(now, AtomicOrdering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.current.fetch_sub(1, AtomicOrdering::SeqCst);
            Ok(TaskValue::Unit)
        }
    }

    #[tokio::test]
    async fn dispatch_respects_max_parallel() {
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut builder = Graph::builder();
        for name in ["r1", "r2", "r3", "r4", "r5"] {
            builder = builder.task(TaskSpec::pure(
                name,
                Gauge {
                    current: Arc::clone(&current),
                    peak: Arc::clone(&peak),
                },
            ));
        }
        let graph = builder.build().unwrap();
        let mut state = RunState::for_graph(&graph);

        let (keep_alive, cancel) = watch::channel(false);
        Executor::new(2).run(&graph, &mut state, cancel).await;
        drop(keep_alive);

        assert_eq!(state.counts().succeeded, 5);
        assert!(peak.load(AtomicOrdering::SeqCst) <= 2);
    }
}
