//! enadeflow-core
//!
//! Core building blocks for the enadeflow batch pipeline: a fixed task graph
//! that fetches the ENADE 2019 survey microdata, filters and recodes a set of
//! questionnaire columns, joins them into a tidy table and publishes it to
//! object storage.
//!
//! Module map:
//! - **domain**: identifiers, task/run states, tables and task values
//! - **error**: the error taxonomy and retry classification
//! - **graph**: task specs, retry policy, the validated DAG, per-run records
//! - **executor**: dispatch loop (readiness, retries, skips, cancellation)
//! - **transform**: the fixed recode tables
//! - **etl**: filter, join and persist stages
//! - **ports** / **impls**: collaborator seams and their production adapters
//! - **pipeline**: task bodies and the wiring of the fixed graph
//! - **config** / **controller**: configuration and the per-trigger driver

pub mod config;
pub mod controller;
pub mod domain;
pub mod error;
pub mod etl;
pub mod executor;
pub mod graph;
pub mod impls;
pub mod pipeline;
pub mod ports;
pub mod transform;

pub use config::PipelineConfig;
pub use controller::{CancelHandle, RunController};
pub use domain::{RunReport, RunStatus};
pub use error::{ErrorKind, PipelineError};
pub use executor::Executor;
pub use pipeline::{build_graph, Ports};
