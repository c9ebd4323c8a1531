//! # Penalty Grid Search
//!
//! Fits one model per candidate penalty on the training subset and scores it by
//! its residual sum of squares on the validation subset. The winner is carried
//! through a fold over the candidates in grid order and only replaced on a
//! strictly lower score, so when two scores tie the earlier penalty wins.
//!
//! A failed fit does not end the scan. It is logged, recorded as a failed
//! candidate, and the next penalty is tried.
//!
//! Candidates are scanned in the order given. Unlike bracketing, the grid
//! search does not need them sorted.

use crate::grid::{GridError, validate_penalties};
use crate::model::{FitConfig, FitError, Model, ModelError, ModelFitter};
use crate::table::SalesTable;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchError {
    #[error("Invalid penalty grid: {0}")]
    InvalidGrid(#[from] GridError),
    #[error("Invalid base configuration: {0}")]
    InvalidConfig(#[from] FitError),
    #[error("All {candidates} candidate penalties failed to produce a usable model.")]
    NoSuccessfulFit { candidates: usize },
    #[error("No coarse penalty produced more than {target} nonzero coefficients; start the grid lower.")]
    NoLowerBracket { target: usize },
    #[error("No coarse penalty produced fewer than {target} nonzero coefficients; extend the grid higher.")]
    NoUpperBracket { target: usize },
    #[error(
        "Nonzero counts are not monotone in the penalty: the bracket [{penalty_min:.6e}, {penalty_max:.6e}] is empty."
    )]
    InvertedBracket { penalty_min: f64, penalty_max: f64 },
    #[error("No qualifying model: none of the {candidates} refinement penalties gave exactly {target} nonzero coefficients.")]
    NoQualifyingModel { target: usize, candidates: usize },
}

/// How one candidate penalty fared.
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateOutcome {
    Scored { rss: f64, nonzeros: usize },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateEvaluation {
    pub penalty: f64,
    pub outcome: CandidateOutcome,
}

impl CandidateEvaluation {
    pub fn rss(&self) -> Option<f64> {
        match self.outcome {
            CandidateOutcome::Scored { rss, .. } => Some(rss),
            CandidateOutcome::Failed { .. } => None,
        }
    }

    pub fn nonzeros(&self) -> Option<usize> {
        match self.outcome {
            CandidateOutcome::Scored { nonzeros, .. } => Some(nonzeros),
            CandidateOutcome::Failed { .. } => None,
        }
    }
}

/// A chosen penalty and its validation score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection {
    pub penalty: f64,
    pub rss: f64,
}

#[derive(Debug, Clone)]
pub struct GridSearchReport {
    /// Every candidate, in grid order.
    pub evaluations: Vec<CandidateEvaluation>,
    pub best: Selection,
    /// The model fitted at `best.penalty`.
    pub model: Model,
}

impl GridSearchReport {
    /// Generalization error of the selected model on a held-out test subset.
    /// This only reads the model; nothing is refitted.
    pub fn test_rss(&self, test: &SalesTable, target: &str) -> Result<f64, ModelError> {
        self.model.residual_sum_of_squares(test, target)
    }
}

/// Picks the `(penalty, score)` pair with the lowest score. The first of equal
/// scores wins and non-finite scores never win. Returns `None` when no score
/// is finite.
pub fn select_minimum<I>(scores: I) -> Option<Selection>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    scores
        .into_iter()
        .filter(|&(_, rss)| rss.is_finite())
        .fold(None, |best: Option<Selection>, (penalty, rss)| match best {
            Some(current) if current.rss <= rss => Some(current),
            _ => Some(Selection { penalty, rss }),
        })
}

/// Fits and scores one penalty. The model is returned alongside the evaluation
/// when scoring succeeded.
pub(crate) fn evaluate_candidate<F: ModelFitter + ?Sized>(
    fitter: &F,
    training: &SalesTable,
    validation: &SalesTable,
    base: &FitConfig,
    penalty: f64,
) -> (CandidateEvaluation, Option<Model>) {
    let config = base.with_l1_penalty(penalty);
    let scored = fitter
        .fit(training, &config)
        .map_err(|e| e.to_string())
        .and_then(|model| {
            let rss = model
                .residual_sum_of_squares(validation, &config.target)
                .map_err(|e| e.to_string())?;
            if rss.is_finite() {
                Ok((model, rss))
            } else {
                Err(format!("validation RSS is not finite ({rss})"))
            }
        });

    match scored {
        Ok((model, rss)) => {
            let nonzeros = model.nonzero_count();
            log::info!("l1_penalty {penalty:>14.6e}  nonzeros {nonzeros:>3}  validation RSS {rss:.6e}");
            (
                CandidateEvaluation {
                    penalty,
                    outcome: CandidateOutcome::Scored { rss, nonzeros },
                },
                Some(model),
            )
        }
        Err(reason) => {
            log::warn!("Skipping l1_penalty {penalty:.6e}: {reason}");
            (
                CandidateEvaluation {
                    penalty,
                    outcome: CandidateOutcome::Failed { reason },
                },
                None,
            )
        }
    }
}

/// Runs the validation grid search over `penalties`, in the given order.
pub fn penalty_grid_search<F: ModelFitter + ?Sized>(
    fitter: &F,
    training: &SalesTable,
    validation: &SalesTable,
    base: &FitConfig,
    penalties: &[f64],
) -> Result<GridSearchReport, SearchError> {
    validate_penalties(penalties)?;
    base.validate()?;
    log::info!(
        "Grid search over {} penalties from {:.3e} to {:.3e}",
        penalties.len(),
        penalties[0],
        penalties[penalties.len() - 1]
    );

    let (evaluations, best) = penalties.iter().fold(
        (Vec::with_capacity(penalties.len()), None::<(Selection, Model)>),
        |(mut evaluations, best), &penalty| {
            let (evaluation, model) =
                evaluate_candidate(fitter, training, validation, base, penalty);
            let best = match (best, evaluation.rss(), model) {
                (Some((current, _)), Some(rss), Some(model)) if rss < current.rss => {
                    Some((Selection { penalty, rss }, model))
                }
                (None, Some(rss), Some(model)) => Some((Selection { penalty, rss }, model)),
                (best, _, _) => best,
            };
            evaluations.push(evaluation);
            (evaluations, best)
        },
    );

    let (best, model) = best.ok_or(SearchError::NoSuccessfulFit {
        candidates: penalties.len(),
    })?;
    log::info!(
        "Best l1_penalty {:.6e} with validation RSS {:.6e}",
        best.penalty,
        best.rss
    );
    Ok(GridSearchReport {
        evaluations,
        best,
        model,
    })
}
