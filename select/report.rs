//! Plain-text and CSV renderings of search results.

use crate::model::{Coefficient, Model};
use crate::search::{CandidateEvaluation, CandidateOutcome};
use crate::sparsity::SparsityProbe;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write CSV report: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error while writing report: {0}")]
    IoError(#[from] std::io::Error),
}

/// One flattened row of the exported evaluation table.
#[derive(Debug, Serialize)]
struct EvaluationRow<'a> {
    l1_penalty: f64,
    status: &'static str,
    nonzeros: Option<usize>,
    rss: Option<f64>,
    reason: Option<&'a str>,
}

impl<'a> From<&'a CandidateEvaluation> for EvaluationRow<'a> {
    fn from(evaluation: &'a CandidateEvaluation) -> Self {
        match &evaluation.outcome {
            CandidateOutcome::Scored { rss, nonzeros } => Self {
                l1_penalty: evaluation.penalty,
                status: "scored",
                nonzeros: Some(*nonzeros),
                rss: Some(*rss),
                reason: None,
            },
            CandidateOutcome::Failed { reason } => Self {
                l1_penalty: evaluation.penalty,
                status: "failed",
                nonzeros: None,
                rss: None,
                reason: Some(reason),
            },
        }
    }
}

/// Penalty / nonzeros / RSS table, one line per candidate.
pub fn render_evaluations(evaluations: &[CandidateEvaluation]) -> String {
    let mut out = format!("{:>14}  {:>8}  {:>14}\n", "l1_penalty", "nonzeros", "RSS");
    for evaluation in evaluations {
        let line = match &evaluation.outcome {
            CandidateOutcome::Scored { rss, nonzeros } => format!(
                "{:>14.6e}  {:>8}  {:>14.6e}\n",
                evaluation.penalty, nonzeros, rss
            ),
            CandidateOutcome::Failed { reason } => format!(
                "{:>14.6e}  {:>8}  failed: {}\n",
                evaluation.penalty, "-", reason
            ),
        };
        out.push_str(&line);
    }
    out
}

/// Penalty / nonzeros table for the bracketing sweep.
pub fn render_probes(probes: &[SparsityProbe]) -> String {
    let mut out = format!("{:>14}  {:>8}\n", "l1_penalty", "nonzeros");
    for probe in probes {
        let line = match probe.nonzeros {
            Some(count) => format!("{:>14.6e}  {:>8}\n", probe.penalty, count),
            None => format!("{:>14.6e}  {:>8}\n", probe.penalty, "failed"),
        };
        out.push_str(&line);
    }
    out
}

/// Coefficient listing. With `nonzero_only`, zero coefficients are left out.
pub fn render_model(model: &Model, nonzero_only: bool) -> String {
    let mut out = format!("{:<20}  {:>16}\n", "name", "value");
    let terms = if nonzero_only {
        model.nonzero_terms()
    } else {
        let mut all = vec![Coefficient {
            name: Model::INTERCEPT.to_string(),
            value: model.intercept(),
        }];
        all.extend(model.coefficients().iter().cloned());
        all
    };
    for term in terms {
        out.push_str(&format!("{:<20}  {:>16.6e}\n", term.name, term.value));
    }
    out
}

/// Writes the evaluation table to `path` as CSV.
pub fn write_evaluations_csv(
    path: &Path,
    evaluations: &[CandidateEvaluation],
) -> Result<(), ReportError> {
    let mut writer = csv::Writer::from_path(path)?;
    for evaluation in evaluations {
        writer.serialize(EvaluationRow::from(evaluation))?;
    }
    writer.flush()?;
    log::info!(
        "Wrote {} evaluations to '{}'",
        evaluations.len(),
        path.display()
    );
    Ok(())
}
