//! HTTP handler functions for the risk map API.

use actix_web::{HttpResponse, web};
use chrono::{DateTime, Local, NaiveDateTime, TimeDelta};
use futures::{StreamExt as _, TryStreamExt as _};
use risk_map_database_models::BoundingBox;
use risk_map_risk_models::GridCell;
use risk_map_server_models::{
    ApiHealth, ApiPoliceStation, ApiRiskAtPoint, ApiRiskFactors, ApiRiskZone, ApiRoot,
    GeocodeParams, PoliceStationParams, RiskAtPointParams, RiskZonesParams,
};
use risk_map_spatial::candidates;

use crate::AppState;
use crate::config::{DEFAULT_RADIUS_MILES, MAX_RADIUS_MILES, MIN_RADIUS_MILES};
use crate::error::ApiError;

/// Cells scored concurrently per risk-zone request.
const SCORING_CONCURRENCY: usize = 16;

/// `GET /`
pub async fn root() -> HttpResponse {
    HttpResponse::Ok().json(ApiRoot {
        message: "Crime Risk Prediction API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        docs: "/docs".to_string(),
    })
}

/// `GET /docs`
///
/// Lists the API routes.
pub async fn docs() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!([
        {"method": "GET", "path": "/api/risk-zones", "query": "lat, lon, radius, prediction_time, hour"},
        {"method": "GET", "path": "/api/risk-factors/{cell_id}"},
        {"method": "GET", "path": "/api/risk-at-point", "query": "lat, lon, prediction_time"},
        {"method": "GET", "path": "/api/police-stations", "query": "min_lat, max_lat, min_lon, max_lon"},
        {"method": "GET", "path": "/api/geocode", "query": "q"},
        {"method": "GET", "path": "/api/health"},
    ]))
}

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        status: "healthy".to_string(),
        timestamp: now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /api/risk-zones`
///
/// Scores every grid cell within `radius` miles of `(lat, lon)`, nearest
/// first. Cells without features are skipped.
pub async fn risk_zones(
    state: web::Data<AppState>,
    params: web::Query<RiskZonesParams>,
) -> Result<HttpResponse, ApiError> {
    let radius = params.radius.unwrap_or(DEFAULT_RADIUS_MILES);

    if !state.region.contains(params.lat, params.lon) {
        let region = state.region;
        return Err(ApiError::bad_request(format!(
            "lat must be between {} and {} and lon between {} and {}",
            region.min_lat, region.max_lat, region.min_lon, region.max_lon
        )));
    }
    if !(MIN_RADIUS_MILES..=MAX_RADIUS_MILES).contains(&radius) {
        return Err(ApiError::bad_request(format!(
            "radius must be between {MIN_RADIUS_MILES} and {MAX_RADIUS_MILES} miles"
        )));
    }

    let prediction_time =
        resolve_prediction_time(params.prediction_time.as_deref(), params.hour, now())?;

    let cell_ids: Vec<String> = candidates::candidate_cells(params.lat, params.lon, radius)?
        .iter()
        .map(candidates::Candidate::cell_id)
        .collect();
    let cells = state.spatial.cells_by_ids(&cell_ids).await?;

    log::debug!(
        "risk_zones: {} candidates, {} in grid",
        cell_ids.len(),
        cells.len()
    );

    let zones: Vec<ApiRiskZone> = futures::stream::iter(cells)
        .map(|cell| score_zone(&state, cell, prediction_time))
        .buffered(SCORING_CONCURRENCY)
        .try_filter_map(|zone| async move { Ok(zone) })
        .try_collect()
        .await?;

    Ok(HttpResponse::Ok().json(zones))
}

async fn score_zone(
    state: &AppState,
    cell: GridCell,
    prediction_time: NaiveDateTime,
) -> Result<Option<ApiRiskZone>, ApiError> {
    let assessment = state
        .engine
        .assess_cell(&cell.cell_id, prediction_time)
        .await?;
    Ok(assessment.map(|assessment| ApiRiskZone::new(&cell, &assessment)))
}

/// `GET /api/risk-factors/{cell_id}`
///
/// Category breakdown and explanation for one cell, evaluated now.
pub async fn risk_factors(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let cell_id = path.into_inner();

    let assessment = state
        .engine
        .assess_cell(&cell_id, now())
        .await?
        .ok_or_else(|| ApiError::not_found("Cell not found"))?;

    Ok(HttpResponse::Ok().json(ApiRiskFactors::from(&assessment)))
}

/// `GET /api/risk-at-point`
///
/// Scores the grid cell nearest to `(lat, lon)`.
pub async fn risk_at_point(
    state: web::Data<AppState>,
    params: web::Query<RiskAtPointParams>,
) -> Result<HttpResponse, ApiError> {
    if !((-90.0..=90.0).contains(&params.lat) && (-180.0..=180.0).contains(&params.lon)) {
        return Err(ApiError::bad_request(
            "lat must be between -90 and 90 and lon between -180 and 180",
        ));
    }

    let prediction_time = resolve_prediction_time(params.prediction_time.as_deref(), None, now())?;

    let nearest = state
        .spatial
        .nearest_cell(params.lat, params.lon)
        .await?
        .ok_or_else(|| ApiError::not_found("No nearby grid cell found"))?;

    let assessment = state
        .engine
        .assess_cell(&nearest.cell.cell_id, prediction_time)
        .await?
        .ok_or_else(|| ApiError::not_found("Grid cell features not found"))?;

    Ok(HttpResponse::Ok().json(ApiRiskAtPoint {
        cell_id: nearest.cell.cell_id,
        center_lat: nearest.cell.center_lat,
        center_lon: nearest.cell.center_lon,
        risk_score: assessment.score,
        risk_level: assessment.level,
        distance_meters: nearest.distance_meters,
    }))
}

/// `GET /api/police-stations`
///
/// Stations inside the bounding box.
pub async fn police_stations(
    state: web::Data<AppState>,
    params: web::Query<PoliceStationParams>,
) -> Result<HttpResponse, ApiError> {
    let bbox = BoundingBox::new(params.min_lon, params.min_lat, params.max_lon, params.max_lat);
    if !bbox.is_valid() {
        return Err(ApiError::bad_request(
            "min_lat must not exceed max_lat and min_lon must not exceed max_lon",
        ));
    }

    let stations: Vec<ApiPoliceStation> = state
        .spatial
        .facilities_in_bbox(&bbox)
        .await?
        .into_iter()
        .map(ApiPoliceStation::from)
        .collect();

    Ok(HttpResponse::Ok().json(stations))
}

/// `GET /api/geocode`
///
/// Proxies the query to Nominatim and returns its raw result list.
pub async fn geocode(
    state: web::Data<AppState>,
    params: web::Query<GeocodeParams>,
) -> Result<HttpResponse, ApiError> {
    let query = params.q.trim();
    if query.is_empty() {
        return Err(ApiError::bad_request("q must not be empty"));
    }

    let results = state.geocoder.search(query).await?;
    Ok(HttpResponse::Ok().json(results))
}

/// Local wall-clock time.
fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Picks the time to score for.
///
/// An explicit `prediction_time` wins. Otherwise `hour` selects that hour
/// today with minutes and seconds zeroed. Without either, the result is one
/// hour after `now`.
fn resolve_prediction_time(
    prediction_time: Option<&str>,
    hour: Option<u32>,
    now: NaiveDateTime,
) -> Result<NaiveDateTime, ApiError> {
    if let Some(hour) = hour
        && hour > 23
    {
        return Err(ApiError::bad_request("hour must be between 0 and 23"));
    }

    if let Some(raw) = prediction_time {
        return parse_prediction_time(raw).ok_or_else(|| {
            ApiError::bad_request(format!(
                "prediction_time must be an ISO 8601 date-time, got {raw:?}"
            ))
        });
    }

    match hour {
        Some(hour) => now
            .date()
            .and_hms_opt(hour, 0, 0)
            .ok_or_else(|| ApiError::bad_request("hour must be between 0 and 23")),
        None => Ok(now + TimeDelta::hours(1)),
    }
}

/// Accepts a naive ISO 8601 date-time or an RFC 3339 timestamp. An offset,
/// if present, is dropped and the wall-clock time kept.
fn parse_prediction_time(raw: &str) -> Option<NaiveDateTime> {
    raw.parse::<NaiveDateTime>()
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|t| t.naive_local()))
}
