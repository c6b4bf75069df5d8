//! Declarative scoring model: feature weights, feature→category grouping,
//! and hour-of-day multipliers.
//!
//! The baseline model is embedded at compile time from
//! `weights/default.toml`. An offline-trained replacement with the same
//! layout can be loaded from disk via [`ModelConfig::from_env`] without
//! touching the scoring code.

use std::collections::BTreeMap;
use std::path::Path;

use risk_map_risk_models::{Category, Feature};
use serde::{Deserialize, Serialize};

/// Environment variable naming an alternative model TOML file.
pub const MODEL_PATH_ENV: &str = "RISK_MODEL_PATH";

/// Number of hour-of-day multipliers a model must define.
pub const HOURS_PER_DAY: usize = 24;

const DEFAULT_MODEL_TOML: &str = include_str!("../weights/default.toml");

/// Errors raised while loading or validating a model configuration.
#[derive(Debug, thiserror::Error)]
pub enum ModelConfigError {
    /// The model file could not be read.
    #[error("Failed to read model file: {0}")]
    Io(#[from] std::io::Error),

    /// The model file is not valid TOML or has the wrong shape.
    #[error("Failed to parse model: {0}")]
    Parse(#[from] toml::de::Error),

    /// A feature has no weight.
    #[error("No weight configured for feature {0}")]
    MissingWeight(Feature),

    /// A weight is NaN or infinite.
    #[error("Weight for feature {feature} is not finite: {weight}")]
    NonFiniteWeight {
        /// The offending feature.
        feature: Feature,
        /// The configured weight.
        weight: f64,
    },

    /// A feature is not assigned to any category.
    #[error("No category configured for feature {0}")]
    MissingCategory(Feature),

    /// The multiplier table does not cover every hour.
    #[error("Expected 24 time multipliers, found {0}")]
    MultiplierCount(usize),

    /// A multiplier is not a positive finite number.
    #[error("Time multiplier for hour {hour} must be positive and finite: {value}")]
    InvalidMultiplier {
        /// Hour of day.
        hour: usize,
        /// The configured multiplier.
        value: f64,
    },
}

/// A static linear risk model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Version tag reported alongside scores.
    pub version: String,
    /// Signed weight per feature.
    pub weights: BTreeMap<Feature, f64>,
    /// Category each feature's term is attributed to.
    pub categories: BTreeMap<Feature, Category>,
    /// Multiplier per hour of day, index 0 = midnight.
    pub time_multipliers: Vec<f64>,
}

impl ModelConfig {
    /// Returns the embedded baseline model.
    ///
    /// # Panics
    ///
    /// Panics if the embedded TOML is malformed (covered by the test suite,
    /// so this cannot happen in a released build).
    #[must_use]
    pub fn builtin() -> Self {
        Self::from_toml_str(DEFAULT_MODEL_TOML)
            .unwrap_or_else(|e| panic!("Failed to parse embedded risk model: {e}"))
    }

    /// Parses and validates a model from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ModelConfigError`] if the text does not parse or the model
    /// is incomplete.
    pub fn from_toml_str(s: &str) -> Result<Self, ModelConfigError> {
        let model: Self = toml::de::from_str(s)?;
        model.validate()?;
        Ok(model)
    }

    /// Loads and validates a model from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ModelConfigError`] if the file cannot be read, does not
    /// parse, or the model is incomplete.
    pub fn load(path: &Path) -> Result<Self, ModelConfigError> {
        let text = std::fs::read_to_string(path)?;
        let model = Self::from_toml_str(&text)?;
        log::info!(
            "Loaded risk model {} from {}",
            model.version,
            path.display()
        );
        Ok(model)
    }

    /// Loads the model named by `RISK_MODEL_PATH`, falling back to the
    /// embedded baseline when the variable is unset.
    ///
    /// # Errors
    ///
    /// Returns [`ModelConfigError`] if the variable is set but the file is
    /// unusable.
    pub fn from_env() -> Result<Self, ModelConfigError> {
        match std::env::var(MODEL_PATH_ENV) {
            Ok(path) if !path.is_empty() => Self::load(Path::new(&path)),
            _ => Ok(Self::builtin()),
        }
    }

    /// Checks that every feature is weighted and categorized and that every
    /// hour has a positive multiplier.
    ///
    /// # Errors
    ///
    /// Returns the first [`ModelConfigError`] found.
    pub fn validate(&self) -> Result<(), ModelConfigError> {
        for &feature in Feature::all() {
            let Some(&weight) = self.weights.get(&feature) else {
                return Err(ModelConfigError::MissingWeight(feature));
            };
            if !weight.is_finite() {
                return Err(ModelConfigError::NonFiniteWeight { feature, weight });
            }
            if !self.categories.contains_key(&feature) {
                return Err(ModelConfigError::MissingCategory(feature));
            }
        }

        if self.time_multipliers.len() != HOURS_PER_DAY {
            return Err(ModelConfigError::MultiplierCount(
                self.time_multipliers.len(),
            ));
        }

        for (hour, &value) in self.time_multipliers.iter().enumerate() {
            if !(value.is_finite() && value > 0.0) {
                return Err(ModelConfigError::InvalidMultiplier { hour, value });
            }
        }

        Ok(())
    }

    /// Weight of `feature`. Unweighted features contribute nothing.
    #[must_use]
    pub fn weight(&self, feature: Feature) -> f64 {
        self.weights.get(&feature).copied().unwrap_or(0.0)
    }

    /// Category `feature` is attributed to.
    #[must_use]
    pub fn category(&self, feature: Feature) -> Category {
        self.categories
            .get(&feature)
            .copied()
            .unwrap_or(Category::Socioeconomic)
    }

    /// Multiplier for an hour of day. Hours outside `0..24` map to `1.0`.
    #[must_use]
    pub fn time_multiplier(&self, hour: u32) -> f64 {
        usize::try_from(hour)
            .ok()
            .and_then(|h| self.time_multipliers.get(h))
            .copied()
            .unwrap_or(1.0)
    }
}
