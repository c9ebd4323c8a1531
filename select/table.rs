//! # In-Memory Sales Table
//!
//! A small column store for housing-sale records. Every column is real-valued and
//! stored as an `ndarray` vector of the same length. Each row remembers the
//! position it had in the originally loaded file (its row id), which survives
//! feature derivation and every split. The splitter's partition invariants are
//! checked against these ids.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use std::collections::HashSet;
use thiserror::Error;

/// Column-oriented table of sale records.
#[derive(Debug, Clone, PartialEq)]
pub struct SalesTable {
    names: Vec<String>,
    columns: Vec<Array1<f64>>,
    row_ids: Vec<usize>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TableError {
    #[error("The column '{0}' does not exist in the table.")]
    ColumnNotFound(String),
    #[error("The column '{0}' appears more than once.")]
    DuplicateColumn(String),
    #[error("Column '{column}' has {found} values, but the table has {expected} rows.")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },
    #[error("Row position {position} is out of range for a table with {rows} rows.")]
    RowOutOfRange { position: usize, rows: usize },
}

impl SalesTable {
    /// Builds a table from named columns. Row ids are assigned `0..n` in order.
    pub fn new(columns: Vec<(String, Array1<f64>)>) -> Result<Self, TableError> {
        let rows = columns.first().map_or(0, |(_, values)| values.len());
        let mut seen = HashSet::with_capacity(columns.len());
        let mut names = Vec::with_capacity(columns.len());
        let mut data = Vec::with_capacity(columns.len());

        for (name, values) in columns {
            if !seen.insert(name.clone()) {
                return Err(TableError::DuplicateColumn(name));
            }
            if values.len() != rows {
                return Err(TableError::LengthMismatch {
                    column: name,
                    expected: rows,
                    found: values.len(),
                });
            }
            names.push(name);
            data.push(values);
        }

        Ok(Self {
            names,
            columns: data,
            row_ids: (0..rows).collect(),
        })
    }

    pub fn n_rows(&self) -> usize {
        self.row_ids.len()
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Original row ids, in table order.
    pub fn row_ids(&self) -> &[usize] {
        &self.row_ids
    }

    pub fn column(&self, name: &str) -> Result<ArrayView1<'_, f64>, TableError> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| self.columns[idx].view())
            .ok_or_else(|| TableError::ColumnNotFound(name.to_string()))
    }

    /// Adds a column, replacing any existing column with the same name.
    pub fn set_column(&mut self, name: &str, values: Array1<f64>) -> Result<(), TableError> {
        if values.len() != self.n_rows() {
            return Err(TableError::LengthMismatch {
                column: name.to_string(),
                expected: self.n_rows(),
                found: values.len(),
            });
        }
        match self.names.iter().position(|n| n == name) {
            Some(idx) => self.columns[idx] = values,
            None => {
                self.names.push(name.to_string());
                self.columns.push(values);
            }
        }
        Ok(())
    }

    /// Returns a table holding the rows at `positions`, in that order.
    /// Row ids travel with their rows.
    pub fn select_rows(&self, positions: &[usize]) -> Result<Self, TableError> {
        if let Some(&position) = positions.iter().find(|&&p| p >= self.n_rows()) {
            return Err(TableError::RowOutOfRange {
                position,
                rows: self.n_rows(),
            });
        }
        Ok(Self {
            names: self.names.clone(),
            columns: self
                .columns
                .iter()
                .map(|column| column.select(Axis(0), positions))
                .collect(),
            row_ids: positions.iter().map(|&p| self.row_ids[p]).collect(),
        })
    }

    /// Stacks the named columns into an `[n_rows, features.len()]` matrix,
    /// keeping the order of `features`.
    pub fn design_matrix(&self, features: &[String]) -> Result<Array2<f64>, TableError> {
        let mut matrix = Array2::zeros((self.n_rows(), features.len()));
        for (j, feature) in features.iter().enumerate() {
            matrix.column_mut(j).assign(&self.column(feature)?);
        }
        Ok(matrix)
    }
}
