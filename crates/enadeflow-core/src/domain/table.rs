//! Column-oriented in-memory tables and the values tasks exchange.
//!
//! Cells are kept as the strings read from the source file; numeric
//! interpretation (comma decimal separator) happens in the filter stage only.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::PipelineError;

/// One named column of string cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    name: String,
    values: Vec<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A set of equal-length columns.
///
/// Row alignment is positional: the i-th cell of every column belongs to the
/// i-th row. Operations that would break this invariant return `Schema`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_columns(columns: Vec<Column>) -> Result<Self, PipelineError> {
        let mut table = Self::new();
        for column in columns {
            table.push_column(column)?;
        }
        Ok(table)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn header(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn row(&self, index: usize) -> Vec<&str> {
        self.columns
            .iter()
            .map(|c| c.values[index].as_str())
            .collect()
    }

    pub fn rows(&self) -> impl Iterator<Item = Vec<&str>> + '_ {
        (0..self.len()).map(|i| self.row(i))
    }

    /// Append a column; it must match the existing row count.
    pub fn push_column(&mut self, column: Column) -> Result<(), PipelineError> {
        if !self.columns.is_empty() && column.len() != self.len() {
            return Err(PipelineError::Schema(format!(
                "column {} has {} rows, table has {}",
                column.name,
                column.len(),
                self.len()
            )));
        }
        if self.column(&column.name).is_some() {
            return Err(PipelineError::Schema(format!(
                "duplicate column {}",
                column.name
            )));
        }
        self.columns.push(column);
        Ok(())
    }

    /// Project onto the named columns, in the given order.
    pub fn select(&self, names: &[&str]) -> Result<Table, PipelineError> {
        let mut out = Table::new();
        for &name in names {
            let column = self
                .column(name)
                .ok_or_else(|| PipelineError::Schema(format!("column {name} not found")))?;
            out.push_column(column.clone())?;
        }
        Ok(out)
    }
}

/// The value one task produces and passes downstream.
///
/// Wrapped in `Arc` by the run state so the five parallel recodes share the
/// filtered table without cloning it.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskValue {
    Path(PathBuf),
    Table(Table),
    Column(Column),
    Unit,
}

impl TaskValue {
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            TaskValue::Path(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            TaskValue::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_column(&self) -> Option<&Column> {
        match self {
            TaskValue::Column(c) => Some(c),
            _ => None,
        }
    }
}
