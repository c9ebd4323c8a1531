//! Derived feature columns (square roots and squares of raw sale fields).

use crate::table::{SalesTable, TableError};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transform {
    Sqrt,
    Square,
}

/// One engineered column: `name = transform(source)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedColumn {
    pub name: String,
    pub source: String,
    pub transform: Transform,
}

impl DerivedColumn {
    pub fn new(name: &str, source: &str, transform: Transform) -> Self {
        Self {
            name: name.to_string(),
            source: source.to_string(),
            transform,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeatureError {
    #[error(
        "Cannot take the square root of negative value {value} in column '{column}' (row {row})."
    )]
    DomainError {
        column: String,
        row: usize,
        value: f64,
    },
    #[error("Column '{column}' has a missing or non-finite value at row {row}.")]
    MissingValue { column: String, row: usize },
    #[error(transparent)]
    Table(#[from] TableError),
}

/// The square-root and square columns used by the housing workflow.
pub fn housing_derivations() -> Vec<DerivedColumn> {
    vec![
        DerivedColumn::new("sqft_living_sqrt", "sqft_living", Transform::Sqrt),
        DerivedColumn::new("sqft_lot_sqrt", "sqft_lot", Transform::Sqrt),
        DerivedColumn::new("bedrooms_square", "bedrooms", Transform::Square),
        DerivedColumn::new("floors_square", "floors", Transform::Square),
    ]
}

/// Returns a copy of `table` with every derivation applied in order.
///
/// A derivation may read a column produced by an earlier one. Rows are reported
/// by their original row id.
pub fn apply_derivations(
    table: &SalesTable,
    derivations: &[DerivedColumn],
) -> Result<SalesTable, FeatureError> {
    let mut augmented = table.clone();
    for derived in derivations {
        let values = derive(&augmented, derived)?;
        augmented.set_column(&derived.name, values)?;
        log::debug!(
            "Derived '{}' as {:?} of '{}'",
            derived.name,
            derived.transform,
            derived.source
        );
    }
    Ok(augmented)
}

fn derive(table: &SalesTable, derived: &DerivedColumn) -> Result<Array1<f64>, FeatureError> {
    let source = table.column(&derived.source)?;
    let mut out = Array1::zeros(source.len());

    for ((slot, &value), &row) in out.iter_mut().zip(source.iter()).zip(table.row_ids()) {
        if !value.is_finite() {
            return Err(FeatureError::MissingValue {
                column: derived.source.clone(),
                row,
            });
        }
        *slot = match derived.transform {
            Transform::Sqrt if value < 0.0 => {
                return Err(FeatureError::DomainError {
                    column: derived.source.clone(),
                    row,
                    value,
                });
            }
            Transform::Sqrt => value.sqrt(),
            Transform::Square => value * value,
        };
    }
    Ok(out)
}
