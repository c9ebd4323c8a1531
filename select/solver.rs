//! # Reference Coordinate-Descent Fitter
//!
//! A compact implementation of [`ModelFitter`] so the searches have something
//! concrete to drive. It minimizes
//!
//! ```text
//! RSS(w) + l1_penalty * sum_{j>0} |w_j| + l2_penalty * sum_{j>0} w_j^2
//! ```
//!
//! over weights `w` expressed for unit-norm columns (the all-ones intercept
//! column included, but never penalized). Each pass visits every coordinate once
//! and applies the soft-threshold update
//!
//! ```text
//! w_j <- S(rho_j, l1_penalty / 2) / (1 + l2_penalty),  rho_j = z_j . (y - prediction + w_j z_j)
//! ```
//!
//! Weights are rescaled to the original feature units before they are returned,
//! so penalties are comparable across features with very different magnitudes.

use crate::model::{Coefficient, FitConfig, FitError, Model, ModelFitter};
use crate::table::SalesTable;
use ndarray::{Array1, Array2, Axis, s};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinateDescentFitter {
    /// Upper bound on full passes over the coordinates.
    pub max_iterations: usize,
    /// Relative step size below which the fit is considered converged.
    pub tolerance: f64,
}

impl Default for CoordinateDescentFitter {
    fn default() -> Self {
        Self {
            max_iterations: 5000,
            tolerance: 1e-7,
        }
    }
}

fn soft_threshold(value: f64, threshold: f64) -> f64 {
    if value > threshold {
        value - threshold
    } else if value < -threshold {
        value + threshold
    } else {
        0.0
    }
}

impl ModelFitter for CoordinateDescentFitter {
    fn fit(&self, training: &SalesTable, config: &FitConfig) -> Result<Model, FitError> {
        config.validate()?;
        if self.max_iterations == 0 || !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(FitError::InvalidConfig(format!(
                "solver needs max_iterations > 0 and a positive tolerance (got {}, {})",
                self.max_iterations, self.tolerance
            )));
        }
        let n = training.n_rows();
        if n == 0 {
            return Err(FitError::EmptyTrainingSet);
        }

        let y = training.column(&config.target)?.to_owned();
        if y.iter().any(|v| !v.is_finite()) {
            return Err(FitError::NonFiniteInput {
                column: config.target.clone(),
            });
        }

        // Column 0 is the intercept.
        let features = training.design_matrix(&config.features)?;
        let mut design = Array2::<f64>::ones((n, config.features.len() + 1));
        design.slice_mut(s![.., 1..]).assign(&features);
        for (j, column) in design.axis_iter(Axis(1)).enumerate().skip(1) {
            if column.iter().any(|v| !v.is_finite()) {
                return Err(FitError::NonFiniteInput {
                    column: config.features[j - 1].clone(),
                });
            }
        }

        let norms: Array1<f64> = design
            .axis_iter(Axis(1))
            .map(|column| column.dot(&column).sqrt())
            .collect();
        for (mut column, &norm) in design.axis_iter_mut(Axis(1)).zip(norms.iter()) {
            if norm > 0.0 {
                column /= norm;
            }
        }

        let threshold = config.l1_penalty / 2.0;
        let shrink = 1.0 + config.l2_penalty;
        let mut weights = Array1::<f64>::zeros(design.ncols());
        let mut residual = y;
        let mut converged = false;
        let mut passes = 0;

        while passes < self.max_iterations {
            passes += 1;
            let mut largest_step = 0.0_f64;

            for j in 0..design.ncols() {
                if norms[j] == 0.0 {
                    continue;
                }
                let column = design.column(j);
                let rho = column.dot(&residual) + weights[j];
                let updated = if j == 0 {
                    rho
                } else {
                    soft_threshold(rho, threshold) / shrink
                };
                let step = updated - weights[j];
                if step != 0.0 {
                    residual.scaled_add(-step, &column);
                    weights[j] = updated;
                    largest_step = largest_step.max(step.abs());
                }
            }

            let scale = weights.iter().fold(1.0_f64, |acc, w| acc.max(w.abs()));
            log::trace!("Pass {passes}: largest coordinate step {largest_step:.3e}");
            if largest_step <= self.tolerance * scale {
                converged = true;
                break;
            }
        }

        if converged {
            log::debug!(
                "Coordinate descent converged after {passes} passes (l1_penalty = {:.6e})",
                config.l1_penalty
            );
        } else {
            log::warn!(
                "Coordinate descent stopped after {} passes without converging (l1_penalty = {:.6e}); returning the last iterate.",
                passes,
                config.l1_penalty
            );
        }

        let unscaled: Vec<f64> = weights
            .iter()
            .zip(norms.iter())
            .map(|(&w, &norm)| if norm > 0.0 { w / norm } else { 0.0 })
            .collect();

        let coefficients = config
            .features
            .iter()
            .zip(unscaled.iter().skip(1))
            .map(|(name, &value)| Coefficient {
                name: name.clone(),
                value,
            })
            .collect();

        Ok(Model::new(unscaled[0], coefficients))
    }
}
