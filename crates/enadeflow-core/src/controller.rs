//! Run controller: one graph + run state per trigger.
//!
//! The controller owns the graph and run state for the duration of a run and
//! drives runs strictly sequentially, so the working directory and the output
//! file always belong to a single run at a time.

use chrono::Utc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::domain::{RunId, RunReport, RunStatus, SkipReason, TaskState};
use crate::error::{ErrorKind, PipelineError};
use crate::executor::Executor;
use crate::graph::RunState;
use crate::pipeline::{self, Ports};

/// Requests cancellation of the controller's runs and trigger loop. Running
/// attempts finish; nothing new is dispatched.
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }
}

pub struct RunController {
    config: PipelineConfig,
    ports: Ports,
    executor: Executor,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
}

impl RunController {
    pub fn new(config: PipelineConfig, ports: Ports) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let executor = Executor::new(config.max_parallel);
        Self {
            config,
            ports,
            executor,
            cancel_tx,
            cancel_rx,
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.cancel_tx.clone())
    }

    /// Construct and execute one fresh graph, reporting its terminal status.
    ///
    /// Graph validation errors abort before anything executes; task failures
    /// are inside the report, not this Result.
    pub async fn run_once(&self) -> Result<RunReport, PipelineError> {
        let run_id = RunId::generate();
        let started_at = Utc::now();
        info!(%run_id, "run starting");

        let graph = pipeline::build_graph(&self.config, &self.ports)?;
        let mut state = RunState::for_graph(&graph);
        self.executor
            .run(&graph, &mut state, self.cancel_rx.clone())
            .await;

        let report = RunReport {
            run_id,
            status: summarize(&state),
            counts: state.counts(),
            started_at,
            finished_at: Utc::now(),
        };
        match &report.status {
            RunStatus::Succeeded => info!(%run_id, counts = ?report.counts, "run succeeded"),
            RunStatus::Failed { first_failed, kind } => {
                error!(%run_id, task = %first_failed, ?kind, "run failed")
            }
            RunStatus::Partial => warn!(%run_id, counts = ?report.counts, "run partially complete"),
        }
        Ok(report)
    }

    /// Fixed-interval trigger loop. Ticks landing while a run is active are
    /// queued behind it, never executed concurrently. Returns after
    /// cancellation.
    pub async fn run_on_interval(&self) -> Result<(), PipelineError> {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.config.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cancel = self.cancel_rx.clone();

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        return Ok(());
                    }
                    continue;
                }
            }
            if *cancel.borrow() {
                return Ok(());
            }
            let report = self.run_once().await?;
            debug!(status = ?report.status, "trigger cycle complete");
            if *cancel.borrow() {
                return Ok(());
            }
        }
    }
}

fn summarize(state: &RunState) -> RunStatus {
    if let Some(first_failed) = state.first_failed() {
        let kind = state
            .record(first_failed)
            .error
            .as_ref()
            .map(PipelineError::kind)
            .unwrap_or(ErrorKind::Permanent);
        return RunStatus::Failed {
            first_failed: first_failed.clone(),
            kind,
        };
    }
    let fully_complete = state.records().all(|(_, record)| match record.state {
        TaskState::Succeeded => true,
        TaskState::Skipped => record.skip_reason == Some(SkipReason::PreconditionMet),
        _ => false,
    });
    if fully_complete {
        RunStatus::Succeeded
    } else {
        RunStatus::Partial
    }
}
