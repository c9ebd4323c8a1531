//! # Housing Selection Workflow
//!
//! Wires the pieces together in the order a run needs them:
//!
//! 1.  Load the raw columns named by the configuration.
//! 2.  Derive the engineered columns.
//! 3.  Partition into training, validation and test with the configured seed.
//! 4.  Run either the validation grid search or the sparsity search, then read
//!     the winning model's error on the test subset.
//!
//! The fitter is a parameter so the same workflow drives the bundled solver or
//! any other [`ModelFitter`].

use crate::config::{ConfigError, WorkflowConfig};
use crate::data::{DataError, load_sales_table};
use crate::features::{FeatureError, apply_derivations};
use crate::model::{ModelError, ModelFitter};
use crate::report::ReportError;
use crate::search::{GridSearchReport, SearchError, penalty_grid_search};
use crate::sparsity::{SparsityReport, sparsity_search};
use crate::split::{Partition, SplitError, partition};
use crate::table::SalesTable;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error("Feature derivation failed: {0}")]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Split(#[from] SplitError),
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error("Could not score the selected model on the test subset: {0}")]
    Model(#[from] ModelError),
    #[error(transparent)]
    Report(#[from] ReportError),
}

/// The validation grid search together with the winner's test error.
#[derive(Debug, Clone)]
pub struct GridOutcome {
    pub report: GridSearchReport,
    pub test_rss: f64,
}

/// The sparsity search together with the winner's test error.
#[derive(Debug, Clone)]
pub struct SparsityOutcome {
    pub report: SparsityReport,
    pub test_rss: f64,
}

/// Derives the configured columns on an already loaded table and partitions it.
pub fn prepare_table(
    config: &WorkflowConfig,
    table: &SalesTable,
) -> Result<Partition, WorkflowError> {
    let augmented = apply_derivations(table, &config.derivations)?;
    log::debug!(
        "Derived {} columns; table now has {}",
        config.derivations.len(),
        augmented.column_names().len()
    );
    Ok(partition(&augmented, &config.split)?)
}

/// Loads `path` and returns the partition every search works on.
pub fn prepare(config: &WorkflowConfig, path: &Path) -> Result<Partition, WorkflowError> {
    config.validate()?;
    let raw = load_sales_table(path, &config.raw_columns(), config.delimiter_byte())?;
    prepare_table(config, &raw)
}

pub fn run_grid_search<F: ModelFitter + ?Sized>(
    fitter: &F,
    config: &WorkflowConfig,
    data: &Partition,
) -> Result<GridOutcome, WorkflowError> {
    let report = penalty_grid_search(
        fitter,
        &data.training,
        &data.validation,
        &config.base_fit_config(),
        &config.validation_grid.values(),
    )?;
    let test_rss = report.test_rss(&data.test, &config.target)?;
    log::info!(
        "Test RSS at l1_penalty {:.6e}: {:.6e}",
        report.best.penalty,
        test_rss
    );
    Ok(GridOutcome { report, test_rss })
}

pub fn run_sparsity_search<F: ModelFitter + ?Sized>(
    fitter: &F,
    config: &WorkflowConfig,
    data: &Partition,
) -> Result<SparsityOutcome, WorkflowError> {
    let report = sparsity_search(
        fitter,
        &data.training,
        &data.validation,
        &config.base_fit_config(),
        &config.sparsity.coarse_grid.values(),
        &config.sparsity.settings(),
    )?;
    let test_rss = report
        .selection
        .model
        .residual_sum_of_squares(&data.test, &config.target)?;
    log::info!(
        "Test RSS at l1_penalty {:.6e}: {:.6e}",
        report.selection.penalty,
        test_rss
    );
    Ok(SparsityOutcome { report, test_rss })
}
