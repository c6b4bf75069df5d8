use std::collections::BTreeMap;

use async_trait::async_trait;
use risk_map_database_models::{BoundingBox, PoliceStation};
use risk_map_risk_models::GridCell;
use rstar::{AABB, PointDistance, RTree, RTreeObject};

use crate::candidates::haversine_meters;
use crate::{NearestCell, SpatialError, SpatialStore};

/// A cell center on the unit sphere.
///
/// Chord length between unit vectors grows monotonically with great-circle
/// distance, so Euclidean nearest-neighbor search over these points finds
/// the geodesically nearest cell.
struct CellEntry {
    position: [f64; 3],
    index: usize,
}

impl RTreeObject for CellEntry {
    type Envelope = AABB<[f64; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

impl PointDistance for CellEntry {
    fn distance_2(&self, point: &[f64; 3]) -> f64 {
        let [x, y, z] = self.position;
        let [px, py, pz] = *point;
        (x - px).mul_add(x - px, (y - py).mul_add(y - py, (z - pz) * (z - pz)))
    }
}

/// A station location as `[lon, lat]`.
struct StationEntry {
    position: [f64; 2],
    index: usize,
}

impl RTreeObject for StationEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

fn unit_vector(lat: f64, lon: f64) -> [f64; 3] {
    let (lat, lon) = (lat.to_radians(), lon.to_radians());
    [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()]
}

/// A [`SpatialStore`] held in memory and indexed with R-trees.
#[derive(Default)]
pub struct InMemorySpatialStore {
    cells: Vec<GridCell>,
    cells_by_id: BTreeMap<String, usize>,
    cell_index: RTree<CellEntry>,
    stations: Vec<PoliceStation>,
    station_index: RTree<StationEntry>,
}

impl InMemorySpatialStore {
    /// Builds the indexes. A repeated cell id keeps its last occurrence.
    #[must_use]
    pub fn new(cells: Vec<GridCell>, stations: Vec<PoliceStation>) -> Self {
        let cells: Vec<GridCell> = cells
            .into_iter()
            .map(|cell| (cell.cell_id.clone(), cell))
            .collect::<BTreeMap<_, _>>()
            .into_values()
            .collect();

        let cells_by_id = cells
            .iter()
            .enumerate()
            .map(|(index, cell)| (cell.cell_id.clone(), index))
            .collect();

        let cell_index = RTree::bulk_load(
            cells
                .iter()
                .enumerate()
                .map(|(index, cell)| CellEntry {
                    position: unit_vector(cell.center_lat, cell.center_lon),
                    index,
                })
                .collect(),
        );

        let station_index = RTree::bulk_load(
            stations
                .iter()
                .enumerate()
                .map(|(index, station)| StationEntry {
                    position: [station.longitude, station.latitude],
                    index,
                })
                .collect(),
        );

        log::debug!(
            "Built in-memory spatial store with {} cells and {} stations",
            cells.len(),
            stations.len()
        );

        Self {
            cells,
            cells_by_id,
            cell_index,
            stations,
            station_index,
        }
    }

    /// Number of indexed cells.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }
}

#[async_trait]
impl SpatialStore for InMemorySpatialStore {
    async fn cells_by_ids(&self, cell_ids: &[String]) -> Result<Vec<GridCell>, SpatialError> {
        Ok(cell_ids
            .iter()
            .filter_map(|id| self.cells_by_id.get(id))
            .map(|&index| self.cells[index].clone())
            .collect())
    }

    async fn nearest_cell(&self, lat: f64, lon: f64) -> Result<Option<NearestCell>, SpatialError> {
        let query = unit_vector(lat, lon);
        Ok(self.cell_index.nearest_neighbor(&query).map(|entry| {
            let cell = self.cells[entry.index].clone();
            let distance_meters = haversine_meters(lat, lon, cell.center_lat, cell.center_lon);
            NearestCell {
                cell,
                distance_meters,
            }
        }))
    }

    async fn facilities_in_bbox(
        &self,
        bbox: &BoundingBox,
    ) -> Result<Vec<PoliceStation>, SpatialError> {
        let envelope = AABB::from_corners([bbox.west, bbox.south], [bbox.east, bbox.north]);
        let mut found: Vec<PoliceStation> = self
            .station_index
            .locate_in_envelope(&envelope)
            .map(|entry| self.stations[entry.index].clone())
            .collect();
        found.sort_by_key(|station| station.station_id);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates::candidate_cells;

    fn grid_around(lat: f64, lon: f64, radius_miles: f64) -> Vec<GridCell> {
        candidate_cells(lat, lon, radius_miles)
            .unwrap()
            .into_iter()
            .map(|c| GridCell {
                cell_id: c.cell_id(),
                center_lat: c.center_lat,
                center_lon: c.center_lon,
            })
            .collect()
    }

    fn station(station_id: i32, latitude: f64, longitude: f64) -> PoliceStation {
        PoliceStation {
            station_id,
            name: format!("Station {station_id}"),
            address: None,
            latitude,
            longitude,
        }
    }

    #[tokio::test]
    async fn cells_by_ids_skips_unknown_ids() {
        let cells = grid_around(42.6526, -73.7562, 0.5);
        let store = InMemorySpatialStore::new(cells.clone(), vec![]);
        let ids = vec![
            cells[1].cell_id.clone(),
            "not-a-cell".to_string(),
            cells[0].cell_id.clone(),
        ];
        let found = store.cells_by_ids(&ids).await.unwrap();
        assert_eq!(found, vec![cells[1].clone(), cells[0].clone()]);
    }

    #[tokio::test]
    async fn nearest_cell_matches_linear_scan() {
        let cells = grid_around(42.6526, -73.7562, 1.0);
        let store = InMemorySpatialStore::new(cells.clone(), vec![]);

        for (lat, lon) in [(42.6526, -73.7562), (42.66, -73.74), (42.70, -73.80)] {
            let nearest = store.nearest_cell(lat, lon).await.unwrap().unwrap();
            let expected = cells
                .iter()
                .map(|c| haversine_meters(lat, lon, c.center_lat, c.center_lon))
                .fold(f64::INFINITY, f64::min);
            assert!((nearest.distance_meters - expected).abs() < 1e-6);
        }
    }

    #[tokio::test]
    async fn nearest_cell_is_close_inside_grid() {
        let cells = grid_around(42.6526, -73.7562, 1.0);
        let store = InMemorySpatialStore::new(cells, vec![]);
        let nearest = store.nearest_cell(42.6526, -73.7562).await.unwrap().unwrap();
        // Resolution-9 cells are under 200 m from center to vertex.
        assert!(nearest.distance_meters < 300.0);
    }

    #[tokio::test]
    async fn empty_grid_has_no_nearest_cell() {
        let store = InMemorySpatialStore::default();
        assert!(store.nearest_cell(42.65, -73.75).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn facilities_in_bbox_filters_by_location() {
        let store = InMemorySpatialStore::new(
            vec![],
            vec![
                station(3, 42.65, -73.75),
                station(1, 42.60, -73.80),
                station(2, 43.10, -73.75),
            ],
        );
        let bbox = BoundingBox::new(-74.0, 42.5, -73.5, 42.9);
        let ids: Vec<i32> = store
            .facilities_in_bbox(&bbox)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.station_id)
            .collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn facilities_in_bbox_agree_with_box_containment() {
        let stations: Vec<PoliceStation> = (0..40)
            .map(|i| station(i, 42.5 + f64::from(i) * 0.01, -73.9 + f64::from(i % 7) * 0.05))
            .chain([station(100, 42.6, -73.8), station(101, 42.8, -73.6)])
            .collect();
        let store = InMemorySpatialStore::new(vec![], stations.clone());

        let bbox = BoundingBox::new(-73.8, 42.6, -73.6, 42.8);
        let found: Vec<i32> = store
            .facilities_in_bbox(&bbox)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.station_id)
            .collect();
        let mut expected: Vec<i32> = stations
            .iter()
            .filter(|s| bbox.contains(s.latitude, s.longitude))
            .map(|s| s.station_id)
            .collect();
        expected.sort_unstable();

        assert_eq!(found, expected);
        assert!(found.contains(&100) && found.contains(&101));
    }

    #[test]
    fn duplicate_cell_ids_are_collapsed() {
        let cell = GridCell {
            cell_id: "892a100d2c3ffff".to_string(),
            center_lat: 42.65,
            center_lon: -73.75,
        };
        let store = InMemorySpatialStore::new(vec![cell.clone(), cell], vec![]);
        assert_eq!(store.cell_count(), 1);
    }
}
