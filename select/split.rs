//! # Seeded Dataset Splitting
//!
//! Rows are assigned by drawing one uniform value per row from a `StdRng`
//! seeded with the caller's seed, so the same table, fraction and seed always
//! produce the same partition. A three-way partition is two chained splits
//! sharing one seed: first (training + validation) versus test, then training
//! versus validation.

use crate::table::{SalesTable, TableError};
use rand::distributions::Standard;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SplitError {
    #[error("Invalid split configuration: '{parameter}' must be a finite value in [0, 1], got {value}.")]
    ConfigurationError { parameter: &'static str, value: f64 },
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Fractions and seed for the chained three-way split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitPlan {
    /// Share of all rows kept for fitting (training + validation); the rest is test.
    pub fit_fraction: f64,
    /// Share of the fitting rows used for training; the rest is validation.
    pub training_fraction: f64,
    pub seed: u64,
}

impl Default for SplitPlan {
    fn default() -> Self {
        Self {
            fit_fraction: 0.9,
            training_fraction: 0.5,
            seed: 1,
        }
    }
}

impl SplitPlan {
    pub fn validate(&self) -> Result<(), SplitError> {
        check_fraction("fit_fraction", self.fit_fraction)?;
        check_fraction("training_fraction", self.training_fraction)
    }
}

/// Disjoint training, validation and test subsets of one table.
#[derive(Debug, Clone)]
pub struct Partition {
    pub training: SalesTable,
    pub validation: SalesTable,
    pub test: SalesTable,
}

fn check_fraction(parameter: &'static str, value: f64) -> Result<(), SplitError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(SplitError::ConfigurationError { parameter, value })
    }
}

/// Splits `table` in two. A row lands in the first subset when its draw falls
/// below `fraction`, so the first subset holds roughly `fraction` of the rows.
pub fn random_split(
    table: &SalesTable,
    fraction: f64,
    seed: u64,
) -> Result<(SalesTable, SalesTable), SplitError> {
    check_fraction("fraction", fraction)?;

    let mut rng = StdRng::seed_from_u64(seed);
    let (first, second): (Vec<usize>, Vec<usize>) = (0..table.n_rows()).partition(|_| {
        let draw: f64 = rng.sample(Standard);
        draw < fraction
    });

    log::debug!(
        "Split {} rows at fraction {} (seed {}): {} / {}",
        table.n_rows(),
        fraction,
        seed,
        first.len(),
        second.len()
    );
    Ok((table.select_rows(&first)?, table.select_rows(&second)?))
}

/// Produces the training / validation / test partition described by `plan`.
pub fn partition(table: &SalesTable, plan: &SplitPlan) -> Result<Partition, SplitError> {
    plan.validate()?;
    let (fitting, test) = random_split(table, plan.fit_fraction, plan.seed)?;
    let (training, validation) = random_split(&fitting, plan.training_fraction, plan.seed)?;

    log::info!(
        "Partitioned {} sales into {} training, {} validation, {} test",
        table.n_rows(),
        training.n_rows(),
        validation.n_rows(),
        test.n_rows()
    );
    Ok(Partition {
        training,
        validation,
        test,
    })
}
