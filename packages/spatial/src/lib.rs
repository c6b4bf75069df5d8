#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Spatial side of risk scoring.
//!
//! [`candidates`] turns a center point and radius into the set of H3
//! resolution-9 cells to score. [`SpatialStore`] resolves those cells
//! against the persisted grid and answers nearest-cell and bounding-box
//! queries. [`InMemorySpatialStore`] is an R-tree backed implementation.

pub mod candidates;
mod memory;

use async_trait::async_trait;
use risk_map_database_models::{BoundingBox, PoliceStation};
use risk_map_risk_models::GridCell;

pub use memory::InMemorySpatialStore;

/// Errors from spatial lookups.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    /// A coordinate could not be mapped onto the grid.
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(#[from] h3o::error::InvalidLatLng),

    /// A search radius is negative or not finite.
    #[error("Invalid search radius: {0}")]
    InvalidRadius(f64),

    /// The backing store failed.
    #[error("Spatial store error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl SpatialError {
    /// Wraps a backend error.
    pub fn backend(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Backend(err.into())
    }
}

/// The grid cell closest to a query point.
#[derive(Debug, Clone, PartialEq)]
pub struct NearestCell {
    /// The cell.
    pub cell: GridCell,
    /// Great-circle distance from the query point to the cell center.
    pub distance_meters: f64,
}

/// Lookups against the persisted grid and facility layers.
#[async_trait]
pub trait SpatialStore: Send + Sync {
    /// Returns the cells among `cell_ids` that exist in the grid, in the
    /// order given. Unknown ids are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError`] if the backend fails.
    async fn cells_by_ids(&self, cell_ids: &[String]) -> Result<Vec<GridCell>, SpatialError>;

    /// Returns the cell whose center is closest to `(lat, lon)`, or `None`
    /// if the grid is empty.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError`] if the backend fails.
    async fn nearest_cell(&self, lat: f64, lon: f64) -> Result<Option<NearestCell>, SpatialError>;

    /// Returns every police station located inside `bbox`.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError`] if the backend fails.
    async fn facilities_in_bbox(
        &self,
        bbox: &BoundingBox,
    ) -> Result<Vec<PoliceStation>, SpatialError>;
}
