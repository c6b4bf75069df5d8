//! Population-wide calibration: per-feature ranges and the distribution of
//! raw weighted scores.
//!
//! Both aggregates are computed from a full scan of the feature store. The
//! [`crate::RiskEngine`] computes them once and keeps them for the life of
//! the process; there is no refresh path, so feature updates made after the
//! first scored request only take effect after a restart.

use std::collections::BTreeMap;

use risk_map_risk_models::{CellFeatures, Feature};
use serde::Serialize;

use crate::model::ModelConfig;
use crate::scorer;

/// Percentile that separates `Low` from `Medium`.
pub const LOWER_TERTILE: f64 = 33.0;

/// Percentile that separates `Medium` from `High`.
pub const UPPER_TERTILE: f64 = 66.0;

/// Errors raised while calibrating against the cell population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CalibrationError {
    /// The feature store returned no cells.
    #[error("Cannot calibrate against an empty cell population")]
    EmptyPopulation,
}

/// Observed bounds of one feature across the population.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureRange {
    /// Smallest observed value.
    pub min: f64,
    /// Largest observed value.
    pub max: f64,
}

impl FeatureRange {
    /// Maps `value` linearly so that `min` → 0 and `max` → 1.
    ///
    /// A range with no spread normalizes every input to `0.0`, which removes
    /// the feature from the score.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn normalize(&self, value: f64) -> f64 {
        if self.max == self.min {
            return 0.0;
        }
        (value - self.min) / (self.max - self.min)
    }
}

/// Per-feature ranges across the population.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRanges(BTreeMap<Feature, FeatureRange>);

impl FeatureRanges {
    /// Scans `population` for the min/max of every weighted feature.
    /// Missing values count as `0.0`.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::EmptyPopulation`] if there are no cells.
    pub fn from_population(population: &[CellFeatures]) -> Result<Self, CalibrationError> {
        if population.is_empty() {
            return Err(CalibrationError::EmptyPopulation);
        }

        let ranges = Feature::all()
            .iter()
            .map(|&feature| {
                let range = population.iter().map(|cell| cell.features.get(feature)).fold(
                    FeatureRange {
                        min: f64::INFINITY,
                        max: f64::NEG_INFINITY,
                    },
                    |acc, v| FeatureRange {
                        min: acc.min.min(v),
                        max: acc.max.max(v),
                    },
                );
                (feature, range)
            })
            .collect();

        Ok(Self(ranges))
    }

    /// Range of `feature`. Unknown features get an empty range, which
    /// normalizes to `0.0`.
    #[must_use]
    pub fn get(&self, feature: Feature) -> FeatureRange {
        self.0
            .get(&feature)
            .copied()
            .unwrap_or(FeatureRange { min: 0.0, max: 0.0 })
    }
}

impl FromIterator<(Feature, FeatureRange)> for FeatureRanges {
    fn from_iter<T: IntoIterator<Item = (Feature, FeatureRange)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Cut points and bounds of the raw score distribution.
///
/// `min <= p33 <= p66 <= max` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreDistribution {
    /// 33rd percentile.
    pub p33: f64,
    /// 66th percentile.
    pub p66: f64,
    /// Lowest raw score.
    pub min: f64,
    /// Highest raw score.
    pub max: f64,
}

impl ScoreDistribution {
    /// Summarizes a set of raw scores.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::EmptyPopulation`] if `scores` is empty.
    pub fn from_scores(scores: &[f64]) -> Result<Self, CalibrationError> {
        let mut sorted = scores.to_vec();
        sorted.sort_by(f64::total_cmp);

        let (Some(&min), Some(&max)) = (sorted.first(), sorted.last()) else {
            return Err(CalibrationError::EmptyPopulation);
        };

        Ok(Self {
            p33: percentile(&sorted, LOWER_TERTILE),
            p66: percentile(&sorted, UPPER_TERTILE),
            min,
            max,
        })
    }
}

/// Linear-interpolated percentile of an ascending slice
/// (rank = `pct / 100 * (n - 1)`).
///
/// Returns `0.0` for an empty slice.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn percentile(sorted: &[f64], pct: f64) -> f64 {
    let Some(last) = sorted.len().checked_sub(1) else {
        return 0.0;
    };

    let rank = (pct / 100.0).clamp(0.0, 1.0) * last as f64;
    let lower = rank.floor();
    let lo = sorted[lower as usize];
    let hi = sorted[(rank.ceil() as usize).min(last)];

    lo + (hi - lo) * (rank - lower)
}

/// Everything the scorer needs from the population.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Calibration {
    /// Per-feature min/max.
    pub ranges: FeatureRanges,
    /// Raw score distribution.
    pub distribution: ScoreDistribution,
    /// Number of cells the calibration was computed from.
    pub population_size: usize,
}

impl Calibration {
    /// Computes feature ranges, then the raw score of every cell against
    /// those ranges, then the score distribution.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::EmptyPopulation`] if there are no cells.
    pub fn compute(
        model: &ModelConfig,
        population: &[CellFeatures],
    ) -> Result<Self, CalibrationError> {
        let ranges = FeatureRanges::from_population(population)?;

        let scores: Vec<f64> = population
            .iter()
            .map(|cell| scorer::raw_score(model, &ranges, &cell.features))
            .collect();

        let distribution = ScoreDistribution::from_scores(&scores)?;

        Ok(Self {
            ranges,
            distribution,
            population_size: population.len(),
        })
    }
}
