#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the risk map server.
//!
//! Responses are serialized to JSON with `camelCase` field names. Query
//! parameters keep their `snake_case` names. These types are separate from
//! the scoring and database types to allow independent evolution of the
//! API contract.

use chrono::NaiveDateTime;
use risk_map_database_models::PoliceStation;
use risk_map_risk_models::{Category, GridCell, RiskAssessment, RiskLevel};
use serde::{Deserialize, Serialize};

/// Confidence reported with every risk zone.
pub const ZONE_CONFIDENCE: f64 = 0.75;

/// A scored cell within a search radius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRiskZone {
    /// H3 cell id.
    pub cell_id: String,
    /// Cell center latitude.
    pub center_lat: f64,
    /// Cell center longitude.
    pub center_lon: f64,
    /// Calibrated score in `0..=100`.
    pub risk_score: f64,
    /// Risk tier.
    pub risk_level: RiskLevel,
    /// Fixed model confidence.
    pub confidence: f64,
    /// Time the score was computed for.
    pub prediction_time: NaiveDateTime,
}

impl ApiRiskZone {
    /// Combines a cell and its assessment.
    #[must_use]
    pub fn new(cell: &GridCell, assessment: &RiskAssessment) -> Self {
        Self {
            cell_id: cell.cell_id.clone(),
            center_lat: cell.center_lat,
            center_lon: cell.center_lon,
            risk_score: assessment.score,
            risk_level: assessment.level,
            confidence: ZONE_CONFIDENCE,
            prediction_time: assessment.prediction_time,
        }
    }
}

/// Per-category breakdown of one cell's score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRiskFactors {
    /// H3 cell id.
    pub cell_id: String,
    /// Bars, nightclubs, and liquor stores.
    pub alcohol_contribution: f64,
    /// Transit proximity.
    pub transit_contribution: f64,
    /// Street lighting.
    pub lighting_contribution: f64,
    /// Abandoned buildings.
    pub vacancy_contribution: f64,
    /// Population density.
    pub population_contribution: f64,
    /// Unemployment and income.
    pub socioeconomic_contribution: f64,
    /// Change from the hour-of-day multiplier (`adjusted - raw`).
    pub temporal_contribution: f64,
    /// Ranked explanation of the main factors.
    pub explanation: String,
}

impl From<&RiskAssessment> for ApiRiskFactors {
    fn from(assessment: &RiskAssessment) -> Self {
        let c = &assessment.contributions;
        Self {
            cell_id: assessment.cell_id.clone(),
            alcohol_contribution: c.get(Category::AlcoholDensity),
            transit_contribution: c.get(Category::TransitProximity),
            lighting_contribution: c.get(Category::Lighting),
            vacancy_contribution: c.get(Category::Vacancy),
            population_contribution: c.get(Category::Population),
            socioeconomic_contribution: c.get(Category::Socioeconomic),
            temporal_contribution: assessment.adjusted_score - assessment.raw_score,
            explanation: assessment.explanation.clone(),
        }
    }
}

/// Score of the cell nearest to a point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRiskAtPoint {
    /// H3 cell id.
    pub cell_id: String,
    /// Cell center latitude.
    pub center_lat: f64,
    /// Cell center longitude.
    pub center_lon: f64,
    /// Calibrated score in `0..=100`.
    pub risk_score: f64,
    /// Risk tier.
    pub risk_level: RiskLevel,
    /// Distance from the query point to the cell center.
    pub distance_meters: f64,
}

/// A police station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPoliceStation {
    /// Station id.
    pub station_id: i32,
    /// Station name.
    pub name: String,
    /// Latitude.
    pub latitude: f64,
    /// Longitude.
    pub longitude: f64,
    /// Street address.
    pub address: Option<String>,
}

impl From<PoliceStation> for ApiPoliceStation {
    fn from(row: PoliceStation) -> Self {
        Self {
            station_id: row.station_id,
            name: row.name,
            latitude: row.latitude,
            longitude: row.longitude,
            address: row.address,
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiHealth {
    /// Always `"healthy"` when the server responds.
    pub status: String,
    /// Server time.
    pub timestamp: NaiveDateTime,
    /// Server version.
    pub version: String,
}

/// Root banner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiRoot {
    /// Service name.
    pub message: String,
    /// Server version.
    pub version: String,
    /// Path of the API documentation.
    pub docs: String,
}

/// Error body for every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    /// Human-readable error message.
    pub error: String,
}

/// Query parameters for `GET /api/risk-zones`.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskZonesParams {
    /// Center latitude.
    pub lat: f64,
    /// Center longitude.
    pub lon: f64,
    /// Radius in miles.
    pub radius: Option<f64>,
    /// ISO 8601 time to score for.
    pub prediction_time: Option<String>,
    /// Hour of day (0-23) today, used when `prediction_time` is absent.
    pub hour: Option<u32>,
}

/// Query parameters for `GET /api/risk-at-point`.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskAtPointParams {
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lon: f64,
    /// ISO 8601 time to score for.
    pub prediction_time: Option<String>,
}

/// Query parameters for `GET /api/police-stations`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PoliceStationParams {
    /// Southern bound.
    pub min_lat: f64,
    /// Northern bound.
    pub max_lat: f64,
    /// Western bound.
    pub min_lon: f64,
    /// Eastern bound.
    pub max_lon: f64,
}

/// Query parameters for `GET /api/geocode`.
#[derive(Debug, Clone, Deserialize)]
pub struct GeocodeParams {
    /// Free-form address or place name.
    pub q: String,
}
