//! Database query functions for grid cells, features, and stations.
//!
//! All queries use `query_raw_params()`. Spatial predicates and distances
//! are computed by `PostGIS`.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use moosicbox_json_utils::database::ToValue as _;
use risk_map_database_models::{BoundingBox, PoliceStation};
use risk_map_risk_models::{CellFeatures, Feature, FeatureVector, GridCell};
use switchy_database::{Database, DatabaseValue, Row};

use crate::DbError;

/// Maximum bind parameters per `IN (...)` query.
pub const ID_CHUNK_SIZE: usize = 1_000;

/// `SELECT` list of every feature column, cast to double precision.
fn feature_columns() -> String {
    let mut sql = String::new();
    for (i, feature) in Feature::all().iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        let column = feature.as_ref();
        write!(sql, "{column}::DOUBLE PRECISION AS {column}").unwrap();
    }
    sql
}

/// `$start, $start+1, ...` for `count` parameters.
fn placeholders(start: usize, count: usize) -> String {
    let mut sql = String::new();
    for i in 0..count {
        if i > 0 {
            sql.push_str(", ");
        }
        write!(sql, "${}", start + i).unwrap();
    }
    sql
}

fn conversion_error(column: &str, err: impl std::fmt::Display) -> DbError {
    DbError::Conversion {
        message: format!("Failed to parse {column}: {err}"),
    }
}

fn real(row: &Row, column: &str) -> Result<f64, DbError> {
    row.to_value(column).map_err(|e| conversion_error(column, e))
}

fn optional_real(row: &Row, column: &str) -> Result<Option<f64>, DbError> {
    row.to_value(column).map_err(|e| conversion_error(column, e))
}

/// Reads the feature columns of a row. `NULL` columns are left out of the
/// vector and so count as zero.
fn feature_vector(row: &Row) -> Result<FeatureVector, DbError> {
    let mut features = FeatureVector::new();
    for &feature in Feature::all() {
        if let Some(value) = optional_real(row, feature.as_ref())? {
            features.set(feature, value);
        }
    }
    Ok(features)
}

fn cell_id(row: &Row) -> Result<String, DbError> {
    row.to_value("cell_id")
        .map_err(|e| conversion_error("cell_id", e))
}

fn grid_cell(row: &Row) -> Result<GridCell, DbError> {
    Ok(GridCell {
        cell_id: cell_id(row)?,
        center_lat: real(row, "center_lat")?,
        center_lon: real(row, "center_lon")?,
    })
}

fn police_station(row: &Row) -> Result<PoliceStation, DbError> {
    Ok(PoliceStation {
        station_id: row
            .to_value("station_id")
            .map_err(|e| conversion_error("station_id", e))?,
        name: row
            .to_value("name")
            .map_err(|e| conversion_error("name", e))?,
        address: row
            .to_value("address")
            .map_err(|e| conversion_error("address", e))?,
        latitude: real(row, "latitude")?,
        longitude: real(row, "longitude")?,
    })
}

/// Returns the features of every cell.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn all_features(db: &dyn Database) -> Result<Vec<CellFeatures>, DbError> {
    let sql = format!("SELECT cell_id, {} FROM grid_features", feature_columns());
    let rows = db.query_raw_params(&sql, &[]).await?;

    rows.iter()
        .map(|row| {
            Ok(CellFeatures {
                cell_id: cell_id(row)?,
                features: feature_vector(row)?,
            })
        })
        .collect()
}

/// Returns the features of one cell, or `None` if it has no row.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn features_for(
    db: &dyn Database,
    cell_id: &str,
) -> Result<Option<FeatureVector>, DbError> {
    let sql = format!(
        "SELECT {} FROM grid_features WHERE cell_id = $1",
        feature_columns()
    );
    let rows = db
        .query_raw_params(&sql, &[DatabaseValue::String(cell_id.to_string())])
        .await?;

    rows.first().map(feature_vector).transpose()
}

/// Returns the grid cells among `cell_ids`, in the order given. Unknown
/// ids are skipped.
///
/// Ids are sent in chunks of [`ID_CHUNK_SIZE`] to stay under the bind
/// parameter limit for large search radii.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn cells_by_ids(
    db: &dyn Database,
    cell_ids: &[String],
) -> Result<Vec<GridCell>, DbError> {
    let mut found: BTreeMap<String, GridCell> = BTreeMap::new();

    for chunk in cell_ids.chunks(ID_CHUNK_SIZE) {
        let sql = format!(
            "SELECT cell_id, center_lat, center_lon FROM grid_cells WHERE cell_id IN ({})",
            placeholders(1, chunk.len())
        );
        let params: Vec<DatabaseValue> = chunk
            .iter()
            .map(|id| DatabaseValue::String(id.clone()))
            .collect();

        for row in db.query_raw_params(&sql, &params).await? {
            let cell = grid_cell(&row)?;
            found.insert(cell.cell_id.clone(), cell);
        }
    }

    Ok(cell_ids.iter().filter_map(|id| found.remove(id)).collect())
}

/// Returns the cell whose center is geodesically closest to `(lat, lon)`
/// and the distance to it in meters.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn nearest_cell(
    db: &dyn Database,
    lat: f64,
    lon: f64,
) -> Result<Option<(GridCell, f64)>, DbError> {
    let rows = db
        .query_raw_params(
            "SELECT cell_id, center_lat, center_lon,
                    ST_Distance(
                        geom::geography,
                        ST_SetSRID(ST_Point($1, $2), 4326)::geography
                    ) AS distance_meters
             FROM grid_cells
             WHERE geom IS NOT NULL
             ORDER BY distance_meters
             LIMIT 1",
            &[DatabaseValue::Real64(lon), DatabaseValue::Real64(lat)],
        )
        .await?;

    let Some(row) = rows.first() else {
        return Ok(None);
    };

    Ok(Some((grid_cell(row)?, real(row, "distance_meters")?)))
}

/// Returns the police stations located inside `bbox`, by id.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn stations_in_bbox(
    db: &dyn Database,
    bbox: &BoundingBox,
) -> Result<Vec<PoliceStation>, DbError> {
    let rows = db
        .query_raw_params(
            "SELECT station_id, name, address,
                    ST_Y(geom) AS latitude,
                    ST_X(geom) AS longitude
             FROM police_stations
             WHERE ST_Contains(ST_MakeEnvelope($1, $2, $3, $4, 4326), geom)
             ORDER BY station_id",
            &[
                DatabaseValue::Real64(bbox.west),
                DatabaseValue::Real64(bbox.south),
                DatabaseValue::Real64(bbox.east),
                DatabaseValue::Real64(bbox.north),
            ],
        )
        .await?;

    rows.iter().map(police_station).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_columns_cover_every_feature() {
        let sql = feature_columns();
        assert!(sql.starts_with("bars_count::DOUBLE PRECISION AS bars_count, "));
        assert!(sql.ends_with("median_income::DOUBLE PRECISION AS median_income"));
        assert_eq!(sql.matches(" AS ").count(), Feature::COUNT);
    }

    fn row(columns: Vec<(&str, DatabaseValue)>) -> Row {
        Row {
            columns: columns
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        }
    }

    fn feature_row(median_income: DatabaseValue) -> Row {
        let mut columns: Vec<(&str, DatabaseValue)> = Feature::all()
            .iter()
            .map(|f| (f.as_ref(), DatabaseValue::Real64(1.0)))
            .collect();
        columns.retain(|(name, _)| *name != "median_income");
        columns.push(("median_income", median_income));
        row(columns)
    }

    #[test]
    fn null_feature_is_missing() {
        let features = feature_vector(&feature_row(DatabaseValue::Null)).unwrap();
        assert!(!features.contains(Feature::MedianIncome));
        assert!(features.contains(Feature::BarsCount));
        assert!(features.get(Feature::MedianIncome).abs() < f64::EPSILON);
    }

    #[test]
    fn mistyped_feature_is_an_error() {
        let err = feature_vector(&feature_row(DatabaseValue::String("n/a".to_string())))
            .unwrap_err();
        assert!(
            matches!(&err, DbError::Conversion { message } if message.contains("median_income")),
            "{err}"
        );
    }

    #[test]
    fn grid_cell_requires_its_center() {
        let cell = grid_cell(&row(vec![
            ("cell_id", DatabaseValue::String("892a100d2c3ffff".to_string())),
            ("center_lat", DatabaseValue::Real64(42.65)),
            ("center_lon", DatabaseValue::Real64(-73.75)),
        ]))
        .unwrap();
        assert!((cell.center_lon + 73.75).abs() < f64::EPSILON);

        let err = grid_cell(&row(vec![
            ("cell_id", DatabaseValue::String("892a100d2c3ffff".to_string())),
            ("center_lat", DatabaseValue::Null),
            ("center_lon", DatabaseValue::Real64(-73.75)),
        ]))
        .unwrap_err();
        assert!(matches!(err, DbError::Conversion { .. }));
    }

    #[test]
    fn placeholders_are_numbered_from_start() {
        assert_eq!(placeholders(1, 3), "$1, $2, $3");
        assert_eq!(placeholders(5, 1), "$5");
        assert_eq!(placeholders(1, 0), "");
    }
}
