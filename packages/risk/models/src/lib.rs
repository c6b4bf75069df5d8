#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Feature, category, and risk assessment types.
//!
//! This crate defines the closed set of environmental metrics that feed the
//! risk model, the semantic categories they are grouped into for
//! explanations, and the assessment produced for a single grid cell. All
//! other crates in the risk-map workspace share these definitions.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// One of the weighted environmental metrics stored per grid cell.
///
/// The `snake_case` string form of each variant is also its column name in
/// the `grid_features` table.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Feature {
    /// Number of bars in the cell.
    BarsCount,
    /// Number of nightclubs in the cell.
    NightclubsCount,
    /// Number of liquor stores in the cell.
    LiquorStoresCount,
    /// Distance from the cell center to the nearest subway stop, in meters.
    NearestSubwayMeters,
    /// Number of street lights in the cell.
    StreetLightsCount,
    /// Number of abandoned buildings in the cell.
    AbandonedBuildingsCount,
    /// Residents per square kilometer.
    PopulationDensity,
    /// Unemployment rate, as a percentage.
    UnemploymentRate,
    /// Median household income.
    MedianIncome,
}

impl Feature {
    /// Number of weighted features.
    pub const COUNT: usize = 9;

    /// Returns all variants of this enum in declaration order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::BarsCount,
            Self::NightclubsCount,
            Self::LiquorStoresCount,
            Self::NearestSubwayMeters,
            Self::StreetLightsCount,
            Self::AbandonedBuildingsCount,
            Self::PopulationDensity,
            Self::UnemploymentRate,
            Self::MedianIncome,
        ]
    }
}

/// Semantic grouping of features used to explain a score.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Category {
    /// Bars, nightclubs, and liquor stores.
    AlcoholDensity,
    /// Proximity to public transit.
    TransitProximity,
    /// Street lighting coverage.
    Lighting,
    /// Abandoned and vacant buildings.
    Vacancy,
    /// Population density.
    Population,
    /// Unemployment and income.
    Socioeconomic,
}

impl Category {
    /// Number of categories.
    pub const COUNT: usize = 6;

    /// Returns all variants of this enum in declaration order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::AlcoholDensity,
            Self::TransitProximity,
            Self::Lighting,
            Self::Vacancy,
            Self::Population,
            Self::Socioeconomic,
        ]
    }
}

/// Three-tier risk classification relative to the cell population.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum RiskLevel {
    /// At or below the 33rd percentile.
    Low,
    /// Above the 33rd and at or below the 66th percentile.
    Medium,
    /// Above the 66th percentile.
    High,
}

/// A cell of the hexagonal grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    /// H3 cell index in its canonical hex form.
    pub cell_id: String,
    /// Latitude of the cell center (WGS84).
    pub center_lat: f64,
    /// Longitude of the cell center (WGS84).
    pub center_lon: f64,
}

/// Feature values for one grid cell.
///
/// Missing features read as `0.0`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(BTreeMap<Feature, f64>);

impl FeatureVector {
    /// Creates an empty feature vector.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Returns the value of `feature`, or `0.0` if it is absent.
    #[must_use]
    pub fn get(&self, feature: Feature) -> f64 {
        self.0.get(&feature).copied().unwrap_or(0.0)
    }

    /// Sets the value of `feature`.
    pub fn set(&mut self, feature: Feature, value: f64) {
        self.0.insert(feature, value);
    }

    /// Builder-style variant of [`Self::set`].
    #[must_use]
    pub fn with(mut self, feature: Feature, value: f64) -> Self {
        self.set(feature, value);
        self
    }

    /// Whether `feature` has an explicit value.
    #[must_use]
    pub fn contains(&self, feature: Feature) -> bool {
        self.0.contains_key(&feature)
    }
}

impl FromIterator<(Feature, f64)> for FeatureVector {
    fn from_iter<T: IntoIterator<Item = (Feature, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Feature vector keyed by the cell it describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellFeatures {
    /// H3 cell index.
    pub cell_id: String,
    /// Feature values.
    pub features: FeatureVector,
}

/// Signed weighted contribution of each category to a raw score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Contributions(BTreeMap<Category, f64>);

impl Contributions {
    /// Creates a set of contributions with every category at `0.0`.
    #[must_use]
    pub fn zeroed() -> Self {
        Self(Category::all().iter().map(|c| (*c, 0.0)).collect())
    }

    /// Returns the contribution of `category`, or `0.0` if absent.
    #[must_use]
    pub fn get(&self, category: Category) -> f64 {
        self.0.get(&category).copied().unwrap_or(0.0)
    }

    /// Adds `term` to the contribution of `category`.
    pub fn add(&mut self, category: Category, term: f64) {
        *self.0.entry(category).or_insert(0.0) += term;
    }

    /// Sum of all category contributions.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    /// Iterates categories in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (Category, f64)> + '_ {
        self.0.iter().map(|(c, v)| (*c, *v))
    }
}

/// The calibrated risk estimate for one cell at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    /// H3 cell index.
    pub cell_id: String,
    /// Calibrated score in `[0, 100]`, rounded to two decimals.
    pub score: f64,
    /// Risk tier.
    pub level: RiskLevel,
    /// Weighted sum of normalized features before the time adjustment.
    pub raw_score: f64,
    /// Raw score multiplied by the hour-of-day multiplier.
    pub adjusted_score: f64,
    /// Per-category share of the raw score, in raw score units.
    pub contributions: Contributions,
    /// Human-readable summary of the main factors.
    pub explanation: String,
    /// Local wall-clock time the assessment was computed for.
    pub prediction_time: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_names_match_columns() {
        assert_eq!(Feature::BarsCount.as_ref(), "bars_count");
        assert_eq!(Feature::NearestSubwayMeters.to_string(), "nearest_subway_meters");
        assert_eq!(
            "median_income".parse::<Feature>().unwrap(),
            Feature::MedianIncome
        );
        assert_eq!(Feature::all().len(), Feature::COUNT);
    }

    #[test]
    fn category_names_are_snake_case() {
        assert_eq!(Category::AlcoholDensity.to_string(), "alcohol_density");
        assert_eq!(Category::Socioeconomic.as_ref(), "socioeconomic");
        assert_eq!(Category::all().len(), Category::COUNT);
    }

    #[test]
    fn missing_feature_reads_as_zero() {
        let features = FeatureVector::new().with(Feature::BarsCount, 4.0);
        assert!((features.get(Feature::BarsCount) - 4.0).abs() < f64::EPSILON);
        assert!(features.get(Feature::MedianIncome).abs() < f64::EPSILON);
        assert!(!features.contains(Feature::MedianIncome));
    }

    #[test]
    fn contributions_accumulate_per_category() {
        let mut contributions = Contributions::zeroed();
        contributions.add(Category::AlcoholDensity, 0.25);
        contributions.add(Category::AlcoholDensity, 0.10);
        contributions.add(Category::Lighting, -0.12);
        assert!((contributions.get(Category::AlcoholDensity) - 0.35).abs() < 1e-12);
        assert!((contributions.total() - 0.23).abs() < 1e-12);
        assert_eq!(contributions.iter().count(), Category::COUNT);
    }

    #[test]
    fn feature_vector_serializes_as_column_map() {
        let features = FeatureVector::new().with(Feature::StreetLightsCount, 8.0);
        let json = serde_json::to_value(&features).unwrap();
        assert_eq!(json, serde_json::json!({ "street_lights_count": 8.0 }));
    }

    #[test]
    fn risk_level_display() {
        assert_eq!(RiskLevel::Medium.to_string(), "Medium");
        assert!(RiskLevel::Low < RiskLevel::High);
    }
}
