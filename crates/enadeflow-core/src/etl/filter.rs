//! Filter stage: read the raw microdata file and keep the rows of interest.

use std::path::Path;

use crate::domain::{Column, Table};
use crate::error::PipelineError;

/// The columns selected from the raw file, in output order.
pub const RAW_COLUMNS: [&str; 12] = [
    "CO_GRUPO", "TP_SEXO", "NU_IDADE", "NT_GER", "NT_FG", "NT_CE", "QE_I01", "QE_I02", "QE_I03",
    "QE_I04", "QE_I05", "QE_I08",
];

/// The raw file is semicolon-delimited.
pub const RAW_DELIMITER: u8 = b';';

const AGE: usize = 2; // NU_IDADE
const SCORE: usize = 3; // NT_GER

/// Load `path`, project onto [`RAW_COLUMNS`] and retain rows where
/// `20 < NU_IDADE < 40` and `NT_GER > 0`.
///
/// Missing declared columns raise `Schema`; non-blank cells that fail the
/// comma-decimal numeric convention raise `Parse`. Blank age/score cells
/// carry no value and the row is dropped by the comparison.
pub fn load_filtered(path: &Path) -> Result<Table, PipelineError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(RAW_DELIMITER)
        .from_path(path)?;
    let headers = reader.headers()?.clone();

    let mut indices = Vec::with_capacity(RAW_COLUMNS.len());
    for name in RAW_COLUMNS {
        let position = headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| PipelineError::Schema(format!("column {name} missing from raw file")))?;
        indices.push(position);
    }

    let mut cells: Vec<Vec<String>> = vec![Vec::new(); RAW_COLUMNS.len()];
    for record in reader.records() {
        let record = record?;
        let Some(age) = parse_number(record.get(indices[AGE]).unwrap_or(""), "NU_IDADE")? else {
            continue;
        };
        let Some(score) = parse_number(record.get(indices[SCORE]).unwrap_or(""), "NT_GER")? else {
            continue;
        };
        if !(age > 20.0 && age < 40.0 && score > 0.0) {
            continue;
        }
        for (slot, &index) in cells.iter_mut().zip(&indices) {
            slot.push(record.get(index).unwrap_or("").to_string());
        }
    }

    let columns = RAW_COLUMNS
        .iter()
        .zip(cells)
        .map(|(name, values)| Column::new(*name, values))
        .collect();
    Table::from_columns(columns)
}

/// Comma-as-decimal-separator convention. Blank cells are `None`.
fn parse_number(raw: &str, column: &str) -> Result<Option<f64>, PipelineError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .replace(',', ".")
        .parse::<f64>()
        .map(Some)
        .map_err(|_| PipelineError::Parse {
            column: column.to_string(),
            value: raw.to_string(),
        })
}
