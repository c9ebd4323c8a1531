//! Penalty sequences: logarithmic and linear spacing, plus the checks every
//! search applies before it fits anything.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("The penalty grid is empty.")]
    Empty,
    #[error("Penalty {value} at position {index} is not a non-negative finite number.")]
    InvalidPenalty { index: usize, value: f64 },
    #[error("Penalties must be in ascending order, but position {index} ({value}) follows {previous}.")]
    NotAscending {
        index: usize,
        previous: f64,
        value: f64,
    },
}

/// A penalty sequence as written in a configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PenaltyGrid {
    /// `count` values evenly spaced in log10 between `10^start_exponent` and `10^end_exponent`.
    Log {
        start_exponent: f64,
        end_exponent: f64,
        count: usize,
    },
    /// `count` values evenly spaced between `start` and `end`, both included.
    Linear { start: f64, end: f64, count: usize },
    Explicit { values: Vec<f64> },
}

impl PenaltyGrid {
    pub fn values(&self) -> Vec<f64> {
        match self {
            PenaltyGrid::Log {
                start_exponent,
                end_exponent,
                count,
            } => log_spaced(*start_exponent, *end_exponent, *count),
            PenaltyGrid::Linear { start, end, count } => linear_spaced(*start, *end, *count),
            PenaltyGrid::Explicit { values } => values.clone(),
        }
    }
}

/// Evenly spaced values from `start` to `end` inclusive.
pub fn linear_spaced(start: f64, end: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (count - 1) as f64;
            (0..count)
                .map(|i| {
                    if i + 1 == count {
                        end
                    } else {
                        start + step * i as f64
                    }
                })
                .collect()
        }
    }
}

/// Powers of ten whose exponents are evenly spaced from `start_exponent` to
/// `end_exponent` inclusive.
pub fn log_spaced(start_exponent: f64, end_exponent: f64, count: usize) -> Vec<f64> {
    linear_spaced(start_exponent, end_exponent, count)
        .into_iter()
        .map(|exponent| 10f64.powf(exponent))
        .collect()
}

/// Checks that `penalties` is non-empty and every value is finite and
/// non-negative. Order is not checked.
pub fn validate_penalties(penalties: &[f64]) -> Result<(), GridError> {
    if penalties.is_empty() {
        return Err(GridError::Empty);
    }
    match penalties
        .iter()
        .position(|value| !value.is_finite() || *value < 0.0)
    {
        Some(index) => Err(GridError::InvalidPenalty {
            index,
            value: penalties[index],
        }),
        None => Ok(()),
    }
}

/// [`validate_penalties`], plus ascending order. Equal neighbours are allowed.
pub fn validate_ascending(penalties: &[f64]) -> Result<(), GridError> {
    validate_penalties(penalties)?;
    match penalties.windows(2).position(|pair| pair[1] < pair[0]) {
        Some(idx) => Err(GridError::NotAscending {
            index: idx + 1,
            previous: penalties[idx],
            value: penalties[idx + 1],
        }),
        None => Ok(()),
    }
}
