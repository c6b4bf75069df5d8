//! Radius search over the resolution-9 H3 grid.
//!
//! The search gathers a hexagonal disk around the cell containing the query
//! point, then keeps only the cells whose center is within the radius by
//! great-circle distance. The disk is sized from the radius so that it
//! always covers every in-radius cell.

use std::collections::BTreeSet;

use geo::{Distance, Haversine, Point};
use h3o::{CellIndex, LatLng, Resolution};

use crate::SpatialError;

/// Grid resolution of every persisted cell.
pub const GRID_RESOLUTION: Resolution = Resolution::Nine;

/// Rings gathered per mile of search radius.
///
/// Adjacent resolution-9 centers are 0.19 to 0.22 miles apart, and a cell
/// `k + 1` rings out is at least `(k + 1) * s * sqrt(3) / 2` from the origin
/// center. At 8 rings per mile plus one extra ring that bound stays above
/// `radius + s / sqrt(3)` even for cells 20% smaller than average.
pub const RINGS_PER_MILE: f64 = 8.0;

/// Meters in a statute mile.
pub const METERS_PER_MILE: f64 = 1_609.344;

/// A cell whose center lies within the search radius.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// H3 cell index.
    pub cell: CellIndex,
    /// Cell center latitude.
    pub center_lat: f64,
    /// Cell center longitude.
    pub center_lon: f64,
    /// Great-circle distance from the query point, in miles.
    pub distance_miles: f64,
}

impl Candidate {
    /// The cell id in its canonical hex string form.
    #[must_use]
    pub fn cell_id(&self) -> String {
        self.cell.to_string()
    }
}

/// Number of rings to gather for `radius_miles`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn ring_count(radius_miles: f64) -> u32 {
    (radius_miles.max(0.0) * RINGS_PER_MILE).ceil() as u32 + 1
}

/// Great-circle distance between two points, in meters.
#[must_use]
pub fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    Haversine.distance(Point::new(lon1, lat1), Point::new(lon2, lat2))
}

/// Great-circle distance between two points, in miles.
#[must_use]
pub fn haversine_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    haversine_meters(lat1, lon1, lat2, lon2) / METERS_PER_MILE
}

/// Resolution-9 cell containing a point.
///
/// # Errors
///
/// Returns [`SpatialError::InvalidCoordinate`] for a non-finite coordinate.
pub fn cell_at(lat: f64, lon: f64) -> Result<CellIndex, SpatialError> {
    Ok(LatLng::new(lat, lon)?.to_cell(GRID_RESOLUTION))
}

/// Cells within `radius_miles` of `(lat, lon)`, nearest first.
///
/// # Errors
///
/// Returns [`SpatialError::InvalidCoordinate`] for a bad center and
/// [`SpatialError::InvalidRadius`] for a negative or non-finite radius.
pub fn candidate_cells(
    lat: f64,
    lon: f64,
    radius_miles: f64,
) -> Result<Vec<Candidate>, SpatialError> {
    if !radius_miles.is_finite() || radius_miles < 0.0 {
        return Err(SpatialError::InvalidRadius(radius_miles));
    }

    let origin = cell_at(lat, lon)?;
    let k = ring_count(radius_miles);
    let disk: BTreeSet<CellIndex> = origin.grid_disk(k);
    let disk_size = disk.len();

    let mut candidates: Vec<Candidate> = disk
        .into_iter()
        .filter_map(|cell| {
            let center = LatLng::from(cell);
            let distance_miles = haversine_miles(lat, lon, center.lat(), center.lng());
            (distance_miles <= radius_miles).then_some(Candidate {
                cell,
                center_lat: center.lat(),
                center_lon: center.lng(),
                distance_miles,
            })
        })
        .collect();

    candidates.sort_by(|a, b| a.distance_miles.total_cmp(&b.distance_miles));

    log::debug!(
        "candidate_cells: origin={origin} k={k} disk={disk_size} within {radius_miles}mi={}",
        candidates.len()
    );

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALBANY: (f64, f64) = (42.6526, -73.7562);

    fn brute_force(lat: f64, lon: f64, radius_miles: f64) -> BTreeSet<CellIndex> {
        let origin = cell_at(lat, lon).unwrap();
        let wide: Vec<CellIndex> = origin.grid_disk(ring_count(radius_miles) * 2 + 10);
        wide.into_iter()
            .filter(|&cell| {
                let center = LatLng::from(cell);
                haversine_miles(lat, lon, center.lat(), center.lng()) <= radius_miles
            })
            .collect()
    }

    #[test]
    fn ring_count_grows_with_radius() {
        assert_eq!(ring_count(0.5), 5);
        assert_eq!(ring_count(1.0), 9);
        assert_eq!(ring_count(2.5), 21);
        assert_eq!(ring_count(50.0), 401);
    }

    #[test]
    fn haversine_one_degree_of_latitude() {
        let miles = haversine_miles(42.0, -73.75, 43.0, -73.75);
        assert!((miles - 69.09).abs() < 0.1, "got {miles}");
    }

    #[test]
    fn every_candidate_is_within_radius() {
        for radius in [0.5, 1.0, 2.5] {
            let candidates = candidate_cells(ALBANY.0, ALBANY.1, radius).unwrap();
            assert!(!candidates.is_empty());
            for candidate in &candidates {
                assert!(candidate.distance_miles <= radius);
            }
        }
    }

    #[test]
    fn candidates_match_brute_force() {
        for (lat, lon) in [ALBANY, (42.8142, -73.9396), (42.7284, -73.6918)] {
            for radius in [0.5, 1.0, 2.5] {
                let found: BTreeSet<CellIndex> = candidate_cells(lat, lon, radius)
                    .unwrap()
                    .into_iter()
                    .map(|c| c.cell)
                    .collect();
                assert_eq!(
                    found,
                    brute_force(lat, lon, radius),
                    "mismatch at ({lat}, {lon}) r={radius}"
                );
            }
        }
    }

    #[test]
    fn candidates_match_brute_force_at_city_scale() {
        let radius = 10.0;
        let found: BTreeSet<CellIndex> = candidate_cells(ALBANY.0, ALBANY.1, radius)
            .unwrap()
            .into_iter()
            .map(|c| c.cell)
            .collect();
        assert_eq!(found, brute_force(ALBANY.0, ALBANY.1, radius));
    }

    #[test]
    fn candidates_are_sorted_and_unique() {
        let candidates = candidate_cells(ALBANY.0, ALBANY.1, 1.0).unwrap();
        for pair in candidates.windows(2) {
            assert!(pair[0].distance_miles <= pair[1].distance_miles);
        }
        let unique: BTreeSet<_> = candidates.iter().map(|c| c.cell).collect();
        assert_eq!(unique.len(), candidates.len());
    }

    #[test]
    fn origin_cell_is_included() {
        let origin = cell_at(ALBANY.0, ALBANY.1).unwrap();
        let candidates = candidate_cells(ALBANY.0, ALBANY.1, 0.5).unwrap();
        assert!(candidates.iter().any(|c| c.cell == origin));
        assert_eq!(candidates[0].cell_id().len(), 15);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            candidate_cells(ALBANY.0, ALBANY.1, -1.0),
            Err(SpatialError::InvalidRadius(_))
        ));
        assert!(matches!(
            candidate_cells(ALBANY.0, ALBANY.1, f64::NAN),
            Err(SpatialError::InvalidRadius(_))
        ));
        assert!(matches!(
            candidate_cells(f64::NAN, ALBANY.1, 1.0),
            Err(SpatialError::InvalidCoordinate(_))
        ));
    }
}
