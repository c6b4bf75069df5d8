//! `PostGIS`-backed implementations of the feature and spatial stores.

use std::sync::Arc;

use async_trait::async_trait;
use risk_map_database_models::{BoundingBox, PoliceStation};
use risk_map_risk::{FeatureStore, StoreError};
use risk_map_risk_models::{CellFeatures, FeatureVector, GridCell};
use risk_map_spatial::{NearestCell, SpatialError, SpatialStore};
use switchy_database::Database;

use crate::queries;

/// Grid, feature, and station access over one shared connection.
#[derive(Clone)]
pub struct PgStore {
    db: Arc<dyn Database>,
}

impl PgStore {
    /// Wraps a connection.
    #[must_use]
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// The underlying connection.
    #[must_use]
    pub fn db(&self) -> &dyn Database {
        self.db.as_ref()
    }
}

#[async_trait]
impl FeatureStore for PgStore {
    async fn all_features(&self) -> Result<Vec<CellFeatures>, StoreError> {
        queries::all_features(self.db()).await.map_err(StoreError::new)
    }

    async fn features_for(&self, cell_id: &str) -> Result<Option<FeatureVector>, StoreError> {
        queries::features_for(self.db(), cell_id)
            .await
            .map_err(StoreError::new)
    }
}

#[async_trait]
impl SpatialStore for PgStore {
    async fn cells_by_ids(&self, cell_ids: &[String]) -> Result<Vec<GridCell>, SpatialError> {
        queries::cells_by_ids(self.db(), cell_ids)
            .await
            .map_err(SpatialError::backend)
    }

    async fn nearest_cell(&self, lat: f64, lon: f64) -> Result<Option<NearestCell>, SpatialError> {
        let nearest = queries::nearest_cell(self.db(), lat, lon)
            .await
            .map_err(SpatialError::backend)?;

        Ok(nearest.map(|(cell, distance_meters)| NearestCell {
            cell,
            distance_meters,
        }))
    }

    async fn facilities_in_bbox(
        &self,
        bbox: &BoundingBox,
    ) -> Result<Vec<PoliceStation>, SpatialError> {
        queries::stations_in_bbox(self.db(), bbox)
            .await
            .map_err(SpatialError::backend)
    }
}
