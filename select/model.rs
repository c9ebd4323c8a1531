use crate::table::{SalesTable, TableError};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// --- Fit Configuration ---

/// The complete set of options a fitter recognizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitConfig {
    /// Name of the column being predicted.
    pub target: String,
    /// Regression inputs, in the order coefficients are reported.
    pub features: Vec<String>,
    pub l1_penalty: f64,
    /// Always zero in the selection workflow.
    pub l2_penalty: f64,
}

impl FitConfig {
    pub fn new(target: &str, features: &[String]) -> Self {
        Self {
            target: target.to_string(),
            features: features.to_vec(),
            l1_penalty: 0.0,
            l2_penalty: 0.0,
        }
    }

    /// A copy of this configuration with a different L1 penalty.
    pub fn with_l1_penalty(&self, l1_penalty: f64) -> Self {
        Self {
            l1_penalty,
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<(), FitError> {
        if self.target.is_empty() {
            return Err(FitError::InvalidConfig(
                "the target column name is empty".to_string(),
            ));
        }
        if self.features.is_empty() {
            return Err(FitError::InvalidConfig(
                "at least one feature is required".to_string(),
            ));
        }
        if let Some(dup) = self
            .features
            .iter()
            .enumerate()
            .find_map(|(i, f)| self.features[..i].contains(f).then_some(f))
        {
            return Err(FitError::InvalidConfig(format!(
                "feature '{dup}' is listed more than once"
            )));
        }
        if self.features.contains(&self.target) {
            return Err(FitError::InvalidConfig(format!(
                "the target '{}' is also listed as a feature",
                self.target
            )));
        }
        for (name, value) in [("l1_penalty", self.l1_penalty), ("l2_penalty", self.l2_penalty)] {
            if !value.is_finite() || value < 0.0 {
                return Err(FitError::InvalidConfig(format!(
                    "{name} must be a non-negative finite number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("Invalid fit configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error("The training set is empty.")]
    EmptyTrainingSet,
    #[error("Column '{column}' contains non-finite values and cannot be fitted.")]
    NonFiniteInput { column: String },
    #[error("The fitter failed: {0}")]
    Solver(String),
}

/// The seam between the selection searches and whatever performs the regression.
///
/// The searches only ever see the returned [`Model`]; convergence behaviour is the
/// implementor's business.
pub trait ModelFitter {
    fn fit(&self, training: &SalesTable, config: &FitConfig) -> Result<Model, FitError>;
}

impl<F> ModelFitter for F
where
    F: Fn(&SalesTable, &FitConfig) -> Result<Model, FitError>,
{
    fn fit(&self, training: &SalesTable, config: &FitConfig) -> Result<Model, FitError> {
        self(training, config)
    }
}

// --- Fitted Model ---

/// One named coefficient of a fitted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coefficient {
    pub name: String,
    pub value: f64,
}

/// A fitted linear model: an intercept plus one coefficient per feature.
///
/// Models are immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    intercept: f64,
    coefficients: Vec<Coefficient>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error(transparent)]
    Table(#[from] TableError),
    #[error("The model produced a non-finite prediction for row {row}.")]
    NonFinitePrediction { row: usize },
}

impl Model {
    /// Name under which the intercept is reported.
    pub const INTERCEPT: &'static str = "(intercept)";

    pub fn new(intercept: f64, coefficients: Vec<Coefficient>) -> Self {
        Self {
            intercept,
            coefficients,
        }
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn coefficients(&self) -> &[Coefficient] {
        &self.coefficients
    }

    pub fn coefficient(&self, name: &str) -> Option<f64> {
        if name == Self::INTERCEPT {
            return Some(self.intercept);
        }
        self.coefficients
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.value)
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.coefficients.iter().map(|c| c.name.clone()).collect()
    }

    /// Intercept first, then features in fit order, keeping only nonzero entries.
    pub fn nonzero_terms(&self) -> Vec<Coefficient> {
        std::iter::once(Coefficient {
            name: Self::INTERCEPT.to_string(),
            value: self.intercept,
        })
        .chain(self.coefficients.iter().cloned())
        .filter(|c| c.value != 0.0)
        .collect()
    }

    /// Number of nonzero coefficients, counting the intercept.
    pub fn nonzero_count(&self) -> usize {
        usize::from(self.intercept != 0.0)
            + self.coefficients.iter().filter(|c| c.value != 0.0).count()
    }

    pub fn predict(&self, table: &SalesTable) -> Result<Array1<f64>, ModelError> {
        let x = table.design_matrix(&self.feature_names())?;
        let weights = Array1::from_iter(self.coefficients.iter().map(|c| c.value));
        let predictions = x.dot(&weights) + self.intercept;

        if let Some(idx) = predictions.iter().position(|p| !p.is_finite()) {
            return Err(ModelError::NonFinitePrediction {
                row: table.row_ids()[idx],
            });
        }
        Ok(predictions)
    }

    /// Sum of squared residuals of this model against the `target` column of `table`.
    pub fn residual_sum_of_squares(
        &self,
        table: &SalesTable,
        target: &str,
    ) -> Result<f64, ModelError> {
        let actual = table.column(target)?;
        let predicted = self.predict(table)?;
        Ok(predicted
            .iter()
            .zip(actual.iter())
            .map(|(p, y)| (p - y) * (p - y))
            .sum())
    }
}
