//! Persist the tidy table as a comma-delimited file.

use std::path::Path;

use crate::domain::Table;
use crate::error::PipelineError;

/// Write `table` to `path`: header row, one row per record, no index column.
pub fn write_csv(table: &Table, path: &Path) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(table.header())?;
    for row in table.rows() {
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}
