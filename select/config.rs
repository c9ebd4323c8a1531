//! Workflow configuration, stored as TOML.
//!
//! Every field has a default matching the housing-sale study, so an empty file
//! (or no file at all) runs the standard workflow.

use crate::features::{DerivedColumn, housing_derivations};
use crate::grid::{GridError, PenaltyGrid, validate_ascending, validate_penalties};
use crate::model::FitConfig;
use crate::solver::CoordinateDescentFitter;
use crate::sparsity::SparsitySettings;
use crate::split::{SplitError, SplitPlan};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// The seventeen regression inputs of the housing study, derived columns included.
pub const HOUSING_FEATURES: [&str; 17] = [
    "bedrooms",
    "bedrooms_square",
    "bathrooms",
    "sqft_living",
    "sqft_living_sqrt",
    "sqft_lot",
    "sqft_lot_sqrt",
    "floors",
    "floors_square",
    "waterfront",
    "view",
    "condition",
    "grade",
    "sqft_above",
    "sqft_basement",
    "yr_built",
    "yr_renovated",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SparsityConfig {
    /// Required nonzero coefficients, intercept included.
    pub target_nonzeros: usize,
    pub refinement_steps: usize,
    pub coarse_grid: PenaltyGrid,
}

impl Default for SparsityConfig {
    fn default() -> Self {
        Self {
            target_nonzeros: 7,
            refinement_steps: 20,
            coarse_grid: PenaltyGrid::Log {
                start_exponent: 8.0,
                end_exponent: 10.0,
                count: 20,
            },
        }
    }
}

impl SparsityConfig {
    pub fn settings(&self) -> SparsitySettings {
        SparsitySettings {
            target_nonzeros: self.target_nonzeros,
            refinement_steps: self.refinement_steps,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub target: String,
    /// Field separator of the input file.
    pub delimiter: char,
    pub features: Vec<String>,
    pub derivations: Vec<DerivedColumn>,
    pub split: SplitPlan,
    pub validation_grid: PenaltyGrid,
    pub sparsity: SparsityConfig,
    pub solver: CoordinateDescentFitter,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            target: "price".to_string(),
            delimiter: ',',
            features: HOUSING_FEATURES.iter().map(|s| s.to_string()).collect(),
            derivations: housing_derivations(),
            split: SplitPlan::default(),
            validation_grid: PenaltyGrid::Log {
                start_exponent: 1.0,
                end_exponent: 7.0,
                count: 13,
            },
            sparsity: SparsityConfig::default(),
            solver: CoordinateDescentFitter::default(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Invalid split settings: {0}")]
    Split(#[from] SplitError),
    #[error("Invalid penalty grid '{name}': {source}")]
    Grid {
        name: &'static str,
        #[source]
        source: GridError,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl WorkflowConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(text.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target.is_empty() {
            return Err(ConfigError::Invalid("target must not be empty".to_string()));
        }
        if !self.delimiter.is_ascii() {
            return Err(ConfigError::Invalid(format!(
                "delimiter must be a single ASCII character, got '{}'",
                self.delimiter
            )));
        }
        self.base_fit_config()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if let Some(derived) = self.derivations.iter().find(|d| d.name == self.target) {
            return Err(ConfigError::Invalid(format!(
                "derivation '{}' would overwrite the target column",
                derived.name
            )));
        }
        self.split.validate()?;
        validate_penalties(&self.validation_grid.values()).map_err(|source| ConfigError::Grid {
            name: "validation_grid",
            source,
        })?;
        validate_ascending(&self.sparsity.coarse_grid.values()).map_err(|source| {
            ConfigError::Grid {
                name: "sparsity.coarse_grid",
                source,
            }
        })?;
        if self.sparsity.refinement_steps < 2 {
            return Err(ConfigError::Invalid(format!(
                "sparsity.refinement_steps must be at least 2, got {}",
                self.sparsity.refinement_steps
            )));
        }
        if self.sparsity.target_nonzeros == 0 {
            return Err(ConfigError::Invalid(
                "sparsity.target_nonzeros must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Fit configuration with zero penalties; the searches set the L1 penalty.
    pub fn base_fit_config(&self) -> FitConfig {
        FitConfig::new(&self.target, &self.features)
    }

    /// Columns that must be read from the input file: the target, every feature
    /// not produced by a derivation, and every derivation source that is not
    /// itself derived earlier. Order is first appearance, without duplicates.
    pub fn raw_columns(&self) -> Vec<String> {
        let mut derived_so_far: Vec<&str> = Vec::new();
        let mut sources: Vec<&str> = Vec::new();
        for derivation in &self.derivations {
            if !derived_so_far.contains(&derivation.source.as_str()) {
                sources.push(&derivation.source);
            }
            derived_so_far.push(&derivation.name);
        }

        let mut columns: Vec<String> = Vec::new();
        let candidates = std::iter::once(self.target.as_str())
            .chain(
                self.features
                    .iter()
                    .map(String::as_str)
                    .filter(|f| !derived_so_far.contains(f)),
            )
            .chain(sources);
        for name in candidates {
            if !columns.iter().any(|c| c == name) {
                columns.push(name.to_string());
            }
        }
        columns
    }

    pub fn delimiter_byte(&self) -> u8 {
        // `validate` guarantees an ASCII delimiter.
        self.delimiter as u8
    }
}
