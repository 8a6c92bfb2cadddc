//! ETL stages: filter, join, persist.

pub mod filter;
pub mod join;
pub mod write;

pub use filter::{load_filtered, RAW_COLUMNS};
pub use join::{join, TIDY_COLUMNS};
pub use write::write_csv;
