//! The risk scoring transform for a single cell.
//!
//! Scoring runs in five steps:
//!
//! 1. Normalize each feature against the population range and multiply by
//!    its signed weight. The terms sum to the raw score and are also summed
//!    per [`Category`].
//! 2. Multiply the raw score by the hour-of-day multiplier.
//! 3. Classify the adjusted score against the 33rd/66th percentile cut
//!    points (both boundaries belong to the lower band).
//! 4. Map the adjusted score piecewise-linearly onto `[0, 100]` using the
//!    same cut points, then clamp.
//! 5. Explain the result with the three largest category contributions.
//!
//! Everything here is a pure function of the model, the calibration, and
//! the request.

use std::fmt::Write as _;

use chrono::{NaiveDateTime, Timelike as _};
use risk_map_risk_models::{
    Category, Contributions, Feature, FeatureVector, RiskAssessment, RiskLevel,
};

use crate::calibration::{Calibration, FeatureRanges, ScoreDistribution};
use crate::model::ModelConfig;

/// Output score assigned to the 33rd percentile.
pub const LOW_BAND_TOP: f64 = 33.0;

/// Output score assigned to the 66th percentile.
pub const MEDIUM_BAND_TOP: f64 = 66.0;

/// Upper bound of the output scale.
pub const SCORE_MAX: f64 = 100.0;

/// Number of categories named in an explanation.
pub const EXPLAINED_FACTORS: usize = 3;

/// Raw score of a feature vector together with its category breakdown.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedScore {
    /// Sum of all weighted, normalized feature terms.
    pub raw_score: f64,
    /// The same terms summed per category.
    pub contributions: Contributions,
}

/// Normalizes and weights every feature, summing the terms overall and per
/// category.
#[must_use]
pub fn weighted_score(
    model: &ModelConfig,
    ranges: &FeatureRanges,
    features: &FeatureVector,
) -> WeightedScore {
    let mut raw_score = 0.0;
    let mut contributions = Contributions::zeroed();

    for &feature in Feature::all() {
        let term = feature_term(model, ranges, features, feature);
        raw_score += term;
        contributions.add(model.category(feature), term);
    }

    WeightedScore {
        raw_score,
        contributions,
    }
}

/// Raw score alone, as used when calibrating the population.
#[must_use]
pub fn raw_score(model: &ModelConfig, ranges: &FeatureRanges, features: &FeatureVector) -> f64 {
    Feature::all()
        .iter()
        .map(|&feature| feature_term(model, ranges, features, feature))
        .sum()
}

fn feature_term(
    model: &ModelConfig,
    ranges: &FeatureRanges,
    features: &FeatureVector,
    feature: Feature,
) -> f64 {
    ranges.get(feature).normalize(features.get(feature)) * model.weight(feature)
}

/// Assigns a risk tier. Ties go to the lower tier.
#[must_use]
pub fn classify(adjusted_score: f64, distribution: &ScoreDistribution) -> RiskLevel {
    if adjusted_score <= distribution.p33 {
        RiskLevel::Low
    } else if adjusted_score <= distribution.p66 {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    }
}

/// Maps an adjusted score onto `[0, 100]`.
///
/// `[min, p33]` → `[0, 33]`, `(p33, p66]` → `(33, 66]`, `(p66, max]` →
/// `(66, 100]`. Values outside `[min, max]` (possible once the time
/// multiplier is applied) are clamped.
#[must_use]
pub fn rescale(adjusted_score: f64, distribution: &ScoreDistribution) -> f64 {
    let scaled = match classify(adjusted_score, distribution) {
        RiskLevel::Low => scale(
            adjusted_score,
            distribution.min,
            distribution.p33,
            0.0,
            LOW_BAND_TOP,
        ),
        RiskLevel::Medium => scale(
            adjusted_score,
            distribution.p33,
            distribution.p66,
            LOW_BAND_TOP,
            MEDIUM_BAND_TOP,
        ),
        RiskLevel::High => scale(
            adjusted_score,
            distribution.p66,
            distribution.max,
            MEDIUM_BAND_TOP,
            SCORE_MAX,
        ),
    };

    scaled.clamp(0.0, SCORE_MAX)
}

/// Linear map of `value` from `[from_lo, from_hi]` to `[to_lo, to_hi]`.
/// An empty input band maps everything to `to_lo`.
#[allow(clippy::float_cmp)]
fn scale(value: f64, from_lo: f64, from_hi: f64, to_lo: f64, to_hi: f64) -> f64 {
    if from_hi == from_lo {
        return to_lo;
    }
    (value - from_lo) / (from_hi - from_lo) * (to_hi - to_lo) + to_lo
}

/// Whether `hour` counts as night time (22:00 through 05:59).
#[must_use]
pub const fn is_night(hour: u32) -> bool {
    hour >= 22 || hour < 6
}

/// The `n` categories with the largest absolute contribution, largest
/// first. Equal magnitudes keep category declaration order.
#[must_use]
pub fn top_factors(contributions: &Contributions, n: usize) -> Vec<(Category, f64)> {
    let mut ranked: Vec<(Category, f64)> = contributions.iter().collect();
    ranked.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
    ranked.truncate(n);
    ranked
}

/// Renders the one-line explanation for an assessment.
///
/// Contributions are printed as `|value| × 100` with a percent sign. They
/// are raw weighted-sum units, not shares of a whole.
#[must_use]
pub fn explain(contributions: &Contributions, level: RiskLevel, hour: u32) -> String {
    let time_of_day = if is_night(hour) { "night" } else { "day" };

    let mut factors = String::new();
    for (i, (category, value)) in top_factors(contributions, EXPLAINED_FACTORS)
        .into_iter()
        .enumerate()
    {
        if i > 0 {
            factors.push_str(", ");
        }
        let _ = write!(factors, "{category} ({:.0}%)", value.abs() * 100.0);
    }

    format!("{level} risk area during {time_of_day}. Main factors: {factors}")
}

/// Rounds to two decimal places.
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// A cell whose weighted score overflowed.
///
/// Happens when a feature value lies so far outside a very narrow
/// population range that its normalized term is infinite.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Risk score for cell {cell_id} is not a finite number")]
pub struct NonFiniteScore {
    /// The cell being scored.
    pub cell_id: String,
}

/// Scores one cell.
///
/// # Errors
///
/// Returns [`NonFiniteScore`] if the adjusted score is infinite or NaN.
pub fn assess(
    model: &ModelConfig,
    calibration: &Calibration,
    cell_id: &str,
    features: &FeatureVector,
    prediction_time: NaiveDateTime,
) -> Result<RiskAssessment, NonFiniteScore> {
    let hour = prediction_time.hour();
    let WeightedScore {
        raw_score,
        contributions,
    } = weighted_score(model, &calibration.ranges, features);

    let adjusted_score = raw_score * model.time_multiplier(hour);
    if !adjusted_score.is_finite() {
        return Err(NonFiniteScore {
            cell_id: cell_id.to_string(),
        });
    }

    let level = classify(adjusted_score, &calibration.distribution);
    let score = rescale(adjusted_score, &calibration.distribution);
    let explanation = explain(&contributions, level, hour);

    Ok(RiskAssessment {
        cell_id: cell_id.to_string(),
        score: round2(score),
        level,
        raw_score,
        adjusted_score,
        contributions,
        explanation,
        prediction_time,
    })
}
