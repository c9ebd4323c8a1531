//! # Sparsity-Constrained Penalty Search
//!
//! Finds the penalty whose model has exactly `target` nonzero coefficients
//! (intercept included) and the lowest validation error among such models.
//!
//! 1.  Bracketing: a coarse ascending sweep fits on training only and records each
//!     model's nonzero count. The bracket runs from the largest penalty that
//!     still leaves too many coefficients to the smallest penalty that leaves too
//!     few.
//!
//! 2.  Refinement: a linear sweep across the bracket keeps only models with the
//!     exact target count and selects the one with the lowest validation RSS.
//!
//! Bracketing assumes that larger L1 penalties never add coefficients. Solvers
//! do not guarantee this, so the sweep checks it and records whether it held.

use crate::grid::{linear_spaced, validate_ascending};
use crate::model::{FitConfig, Model, ModelFitter};
use crate::search::{CandidateEvaluation, SearchError, Selection, evaluate_candidate, select_minimum};
use crate::table::SalesTable;

/// Nonzero count observed at one coarse penalty. `None` when the fit failed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SparsityProbe {
    pub penalty: f64,
    pub nonzeros: Option<usize>,
}

/// Penalty range presumed to contain models with the target sparsity.
#[derive(Debug, Clone, PartialEq)]
pub struct Bracket {
    pub penalty_min: f64,
    pub penalty_max: f64,
    /// Every coarse penalty in sweep order.
    pub probes: Vec<SparsityProbe>,
    /// Whether nonzero counts were non-increasing across the successful probes.
    pub monotone: bool,
}

#[derive(Debug, Clone)]
pub struct SparseSelection {
    pub penalty: f64,
    pub rss: f64,
    pub model: Model,
    /// Every refinement candidate, matching or not.
    pub evaluations: Vec<CandidateEvaluation>,
}

#[derive(Debug, Clone)]
pub struct SparsityReport {
    pub bracket: Bracket,
    pub selection: SparseSelection,
}

/// Target count and refinement resolution for the two-phase search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SparsitySettings {
    pub target_nonzeros: usize,
    pub refinement_steps: usize,
}

/// Returns the first position where a count rises above its predecessor.
pub fn first_monotonicity_violation(counts: &[(f64, usize)]) -> Option<usize> {
    counts
        .windows(2)
        .position(|pair| pair[1].1 > pair[0].1)
        .map(|idx| idx + 1)
}

/// Derives `(penalty_min, penalty_max)` from `(penalty, nonzeros)` pairs.
///
/// `penalty_min` is the largest penalty with more than `target` nonzeros and
/// `penalty_max` the smallest with fewer.
pub fn bracket_from_counts(counts: &[(f64, usize)], target: usize) -> Result<(f64, f64), SearchError> {
    let penalty_min = counts
        .iter()
        .filter(|&&(_, nonzeros)| nonzeros > target)
        .map(|&(penalty, _)| penalty)
        .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |a| a.max(p))))
        .ok_or(SearchError::NoLowerBracket { target })?;
    let penalty_max = counts
        .iter()
        .filter(|&&(_, nonzeros)| nonzeros < target)
        .map(|&(penalty, _)| penalty)
        .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |a| a.min(p))))
        .ok_or(SearchError::NoUpperBracket { target })?;

    if penalty_min >= penalty_max {
        return Err(SearchError::InvertedBracket {
            penalty_min,
            penalty_max,
        });
    }
    Ok((penalty_min, penalty_max))
}

/// Phase 1: sweeps `penalties` (ascending) on `training` and brackets `target`.
pub fn find_bracket<F: ModelFitter + ?Sized>(
    fitter: &F,
    training: &SalesTable,
    base: &FitConfig,
    penalties: &[f64],
    target: usize,
) -> Result<Bracket, SearchError> {
    validate_ascending(penalties)?;
    base.validate()?;
    log::info!(
        "Bracketing {} nonzero coefficients over {} penalties",
        target,
        penalties.len()
    );

    let probes: Vec<SparsityProbe> = penalties
        .iter()
        .map(|&penalty| {
            let nonzeros = match fitter.fit(training, &base.with_l1_penalty(penalty)) {
                Ok(model) => {
                    let count = model.nonzero_count();
                    log::info!("l1_penalty {penalty:>14.6e}  nonzeros {count:>3}");
                    Some(count)
                }
                Err(e) => {
                    log::warn!("Skipping l1_penalty {penalty:.6e}: {e}");
                    None
                }
            };
            SparsityProbe { penalty, nonzeros }
        })
        .collect();

    let counts: Vec<(f64, usize)> = probes
        .iter()
        .filter_map(|probe| probe.nonzeros.map(|n| (probe.penalty, n)))
        .collect();
    if counts.is_empty() {
        return Err(SearchError::NoSuccessfulFit {
            candidates: penalties.len(),
        });
    }

    let monotone = match first_monotonicity_violation(&counts) {
        Some(idx) => {
            log::warn!(
                "Nonzero count rose from {} to {} between l1_penalty {:.6e} and {:.6e}; the bracket may be unreliable.",
                counts[idx - 1].1,
                counts[idx].1,
                counts[idx - 1].0,
                counts[idx].0
            );
            false
        }
        None => true,
    };

    let (penalty_min, penalty_max) = bracket_from_counts(&counts, target)?;
    log::info!("Bracket: l1_penalty_min {penalty_min:.6e}, l1_penalty_max {penalty_max:.6e}");
    Ok(Bracket {
        penalty_min,
        penalty_max,
        probes,
        monotone,
    })
}

/// Phase 2: sweeps `steps` penalties across `bracket` and keeps the best model
/// with exactly `target` nonzero coefficients.
pub fn refine_within_bracket<F: ModelFitter + ?Sized>(
    fitter: &F,
    training: &SalesTable,
    validation: &SalesTable,
    base: &FitConfig,
    bracket: &Bracket,
    steps: usize,
    target: usize,
) -> Result<SparseSelection, SearchError> {
    let penalties = linear_spaced(bracket.penalty_min, bracket.penalty_max, steps);
    validate_ascending(&penalties)?;
    base.validate()?;
    log::info!(
        "Refining over {} penalties in [{:.6e}, {:.6e}]",
        penalties.len(),
        bracket.penalty_min,
        bracket.penalty_max
    );

    let (evaluations, qualifying): (Vec<CandidateEvaluation>, Vec<Option<Model>>) = penalties
        .iter()
        .map(|&penalty| {
            let (evaluation, model) =
                evaluate_candidate(fitter, training, validation, base, penalty);
            let keep = model.filter(|m| m.nonzero_count() == target);
            (evaluation, keep)
        })
        .unzip();

    if evaluations.iter().all(|evaluation| evaluation.rss().is_none()) {
        log::warn!("Every one of the {} refinement fits failed", penalties.len());
        return Err(SearchError::NoSuccessfulFit {
            candidates: penalties.len(),
        });
    }

    let best = select_minimum(
        evaluations
            .iter()
            .zip(&qualifying)
            .filter(|(_, model)| model.is_some())
            .filter_map(|(evaluation, _)| evaluation.rss().map(|rss| (evaluation.penalty, rss))),
    );

    let Some(Selection { penalty, rss }) = best else {
        log::warn!(
            "None of the {} refinement penalties produced exactly {} nonzero coefficients",
            penalties.len(),
            target
        );
        return Err(SearchError::NoQualifyingModel {
            target,
            candidates: penalties.len(),
        });
    };

    let model = evaluations
        .iter()
        .zip(qualifying)
        .find_map(|(evaluation, model)| (evaluation.penalty == penalty).then_some(model).flatten())
        .ok_or(SearchError::NoQualifyingModel {
            target,
            candidates: penalties.len(),
        })?;

    log::info!("Selected l1_penalty {penalty:.6e} with validation RSS {rss:.6e}");
    Ok(SparseSelection {
        penalty,
        rss,
        model,
        evaluations,
    })
}

/// Runs bracketing then refinement.
pub fn sparsity_search<F: ModelFitter + ?Sized>(
    fitter: &F,
    training: &SalesTable,
    validation: &SalesTable,
    base: &FitConfig,
    coarse_penalties: &[f64],
    settings: &SparsitySettings,
) -> Result<SparsityReport, SearchError> {
    let bracket = find_bracket(
        fitter,
        training,
        base,
        coarse_penalties,
        settings.target_nonzeros,
    )?;
    let selection = refine_within_bracket(
        fitter,
        training,
        validation,
        base,
        &bracket,
        settings.refinement_steps,
        settings.target_nonzeros,
    )?;
    Ok(SparsityReport { bracket, selection })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Coefficient, FitError};
    use crate::search::CandidateOutcome;
    use ndarray::array;

    /// Target 0 and sixteen all-zero feature columns, so any model built by
    /// `model_with` predicts its intercept everywhere.
    fn table() -> SalesTable {
        let mut columns = vec![("price".to_string(), array![0.0])];
        columns.extend((0..16).map(|i| (format!("f{i}"), array![0.0])));
        SalesTable::new(columns).unwrap()
    }

    fn config() -> FitConfig {
        FitConfig::new("price", &["f0".to_string()])
    }

    /// A model with `nonzeros` nonzero terms (intercept included) whose RSS on
    /// `table()` equals `rss`.
    fn model_with(nonzeros: usize, rss: f64) -> Model {
        let coefficients = (0..nonzeros.saturating_sub(1))
            .map(|i| Coefficient {
                name: format!("f{i}"),
                value: 1.0,
            })
            .collect();
        Model::new(rss.sqrt().max(f64::MIN_POSITIVE), coefficients)
    }

    #[test]
    fn scenario_bracket() {
        let counts = [(3.0e9, 8), (3.3e9, 8), (3.8e9, 6), (4.8e9, 5)];
        assert_eq!(bracket_from_counts(&counts, 7).unwrap(), (3.3e9, 3.8e9));
    }

    #[test]
    fn bracket_needs_both_sides() {
        assert_eq!(
            bracket_from_counts(&[(1.0, 5), (2.0, 3)], 7),
            Err(SearchError::NoLowerBracket { target: 7 })
        );
        assert_eq!(
            bracket_from_counts(&[(1.0, 9), (2.0, 7)], 7),
            Err(SearchError::NoUpperBracket { target: 7 })
        );
    }

    #[test]
    fn non_monotone_counts_can_invert_the_bracket() {
        let counts = [(1.0, 5), (2.0, 9)];
        assert_eq!(first_monotonicity_violation(&counts), Some(1));
        assert_eq!(
            bracket_from_counts(&counts, 7),
            Err(SearchError::InvertedBracket {
                penalty_min: 2.0,
                penalty_max: 1.0
            })
        );
        assert_eq!(first_monotonicity_violation(&[(1.0, 9), (2.0, 9), (3.0, 2)]), None);
    }

    #[test]
    fn find_bracket_records_probes_and_skips_failures() {
        let fitter = |_: &SalesTable, cfg: &FitConfig| -> Result<Model, FitError> {
            match cfg.l1_penalty {
                p if p < 2.0 => Ok(model_with(9, 1.0)),
                p if p < 3.0 => Err(FitError::Solver("diverged".to_string())),
                p if p < 4.0 => Ok(model_with(8, 1.0)),
                _ => Ok(model_with(4, 1.0)),
            }
        };
        let bracket = find_bracket(&fitter, &table(), &config(), &[1.0, 2.0, 3.0, 4.0], 7).unwrap();
        assert_eq!(bracket.penalty_min, 3.0);
        assert_eq!(bracket.penalty_max, 4.0);
        assert!(bracket.monotone);
        assert_eq!(bracket.probes[1].nonzeros, None);
        assert_eq!(bracket.probes[3].nonzeros, Some(4));
    }

    #[test]
    fn find_bracket_flags_non_monotone_sweeps() {
        let fitter = |_: &SalesTable, cfg: &FitConfig| -> Result<Model, FitError> {
            let count = match cfg.l1_penalty as u32 {
                1 => 9,
                2 => 8,
                3 => 9,
                4 => 6,
                _ => 3,
            };
            Ok(model_with(count, 1.0))
        };
        let bracket =
            find_bracket(&fitter, &table(), &config(), &[1.0, 2.0, 3.0, 4.0, 5.0], 7).unwrap();
        assert!(!bracket.monotone);
        assert_eq!((bracket.penalty_min, bracket.penalty_max), (3.0, 4.0));
    }

    #[test]
    fn find_bracket_rejects_an_inverted_sweep() {
        let fitter = |_: &SalesTable, cfg: &FitConfig| -> Result<Model, FitError> {
            let count = if cfg.l1_penalty < 2.0 { 5 } else { 9 };
            Ok(model_with(count, 1.0))
        };
        let err = find_bracket(&fitter, &table(), &config(), &[1.0, 2.0], 7).unwrap_err();
        assert!(matches!(err, SearchError::InvertedBracket { .. }));
    }

    #[test]
    fn refinement_picks_lowest_rss_among_exact_matches() {
        // Penalties 10, 20, 30, 40, 50 across the bracket.
        let fitter = |_: &SalesTable, cfg: &FitConfig| -> Result<Model, FitError> {
            Ok(match cfg.l1_penalty as u32 {
                10 => model_with(8, 1.0),
                20 => model_with(7, 50.0),
                30 => model_with(7, 20.0),
                40 => model_with(6, 1.0),
                _ => model_with(5, 1.0),
            })
        };
        let bracket = Bracket {
            penalty_min: 10.0,
            penalty_max: 50.0,
            probes: Vec::new(),
            monotone: true,
        };
        let selection =
            refine_within_bracket(&fitter, &table(), &table(), &config(), &bracket, 5, 7).unwrap();
        assert_eq!(selection.penalty, 30.0);
        approx::assert_relative_eq!(selection.rss, 20.0, max_relative = 1e-12);
        assert_eq!(selection.model.nonzero_count(), 7);
        assert_eq!(selection.evaluations.len(), 5);
    }

    #[test]
    fn no_exact_match_is_reported() {
        // The lowest-RSS candidate has the wrong count and must not be returned.
        let fitter = |_: &SalesTable, cfg: &FitConfig| -> Result<Model, FitError> {
            Ok(if cfg.l1_penalty < 15.0 {
                model_with(8, 0.5)
            } else {
                model_with(6, 3.0)
            })
        };
        let bracket = Bracket {
            penalty_min: 10.0,
            penalty_max: 20.0,
            probes: Vec::new(),
            monotone: true,
        };
        let err = refine_within_bracket(&fitter, &table(), &table(), &config(), &bracket, 4, 7)
            .unwrap_err();
        assert_eq!(
            err,
            SearchError::NoQualifyingModel {
                target: 7,
                candidates: 4
            }
        );
    }

    #[test]
    fn refinement_survives_a_failed_fit() {
        // Penalties 10, 20, 30, 40, 50; the best-scoring one cannot be fitted.
        let fitter = |_: &SalesTable, cfg: &FitConfig| -> Result<Model, FitError> {
            match cfg.l1_penalty as u32 {
                20 => Err(FitError::Solver("did not converge".to_string())),
                30 => Ok(model_with(7, 20.0)),
                40 => Ok(model_with(7, 30.0)),
                _ => Ok(model_with(5, 1.0)),
            }
        };
        let bracket = Bracket {
            penalty_min: 10.0,
            penalty_max: 50.0,
            probes: Vec::new(),
            monotone: true,
        };
        let selection =
            refine_within_bracket(&fitter, &table(), &table(), &config(), &bracket, 5, 7).unwrap();
        assert_eq!(selection.penalty, 30.0);
        assert!(matches!(
            selection.evaluations[1].outcome,
            CandidateOutcome::Failed { .. }
        ));
        assert_eq!(selection.evaluations.len(), 5);
    }

    #[test]
    fn refinement_with_no_successful_fit_is_reported() {
        let fitter = |_: &SalesTable, _: &FitConfig| -> Result<Model, FitError> {
            Err(FitError::Solver("did not converge".to_string()))
        };
        let bracket = Bracket {
            penalty_min: 1.0,
            penalty_max: 2.0,
            probes: Vec::new(),
            monotone: true,
        };
        let err = refine_within_bracket(&fitter, &table(), &table(), &config(), &bracket, 4, 2)
            .unwrap_err();
        assert_eq!(err, SearchError::NoSuccessfulFit { candidates: 4 });
    }

    #[test]
    fn full_search_chains_both_phases() {
        // Count drops by one per unit of penalty: 12 at 0, 7 at 5, 1 at 11.
        let fitter = |_: &SalesTable, cfg: &FitConfig| -> Result<Model, FitError> {
            let count = 12usize.saturating_sub(cfg.l1_penalty.floor() as usize).max(1);
            Ok(model_with(count, 100.0 - cfg.l1_penalty))
        };
        let settings = SparsitySettings {
            target_nonzeros: 7,
            refinement_steps: 9,
        };
        let report = sparsity_search(
            &fitter,
            &table(),
            &table(),
            &config(),
            &[0.0, 2.0, 4.0, 6.0, 8.0, 10.0],
            &settings,
        )
        .unwrap();

        assert_eq!((report.bracket.penalty_min, report.bracket.penalty_max), (4.0, 6.0));
        // Refinement grid 4.0, 4.25, ..., 6.0; count 7 holds on [5, 6).
        assert_eq!(report.selection.penalty, 5.75);
        assert_eq!(report.selection.model.nonzero_count(), 7);
    }
}
