//! Domain model (identifiers, states, tables, task values).

pub mod ids;
pub mod state;
pub mod table;

pub use ids::{RunId, TaskId};
pub use state::{RunCounts, RunReport, RunStatus, SkipReason, TaskState};
pub use table::{Column, Table, TaskValue};
