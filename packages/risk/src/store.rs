//! Read-only access to per-cell feature vectors.

use std::collections::BTreeMap;

use async_trait::async_trait;
use risk_map_risk_models::{CellFeatures, FeatureVector};

/// Error returned by a [`FeatureStore`] backend.
#[derive(Debug, thiserror::Error)]
#[error("Feature store error: {0}")]
pub struct StoreError(#[source] Box<dyn std::error::Error + Send + Sync>);

impl StoreError {
    /// Wraps a backend error.
    pub fn new(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(err.into())
    }
}

/// Source of feature vectors for the grid.
///
/// Implementations must be `Send + Sync` so a single store can be shared by
/// every request handler.
#[async_trait]
pub trait FeatureStore: Send + Sync {
    /// Returns the feature vector of every cell.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    async fn all_features(&self) -> Result<Vec<CellFeatures>, StoreError>;

    /// Returns the feature vector of one cell, or `None` if the cell has no
    /// features.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    async fn features_for(&self, cell_id: &str) -> Result<Option<FeatureVector>, StoreError>;
}

/// A [`FeatureStore`] held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFeatureStore {
    cells: BTreeMap<String, FeatureVector>,
}

impl InMemoryFeatureStore {
    /// Creates an empty store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cells: BTreeMap::new(),
        }
    }

    /// Adds or replaces the features of a cell.
    pub fn insert(&mut self, cell_id: impl Into<String>, features: FeatureVector) {
        self.cells.insert(cell_id.into(), features);
    }

    /// Number of cells with features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the store has no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl FromIterator<CellFeatures> for InMemoryFeatureStore {
    fn from_iter<T: IntoIterator<Item = CellFeatures>>(iter: T) -> Self {
        Self {
            cells: iter
                .into_iter()
                .map(|cell| (cell.cell_id, cell.features))
                .collect(),
        }
    }
}

#[async_trait]
impl FeatureStore for InMemoryFeatureStore {
    async fn all_features(&self) -> Result<Vec<CellFeatures>, StoreError> {
        Ok(self
            .cells
            .iter()
            .map(|(cell_id, features)| CellFeatures {
                cell_id: cell_id.clone(),
                features: features.clone(),
            })
            .collect())
    }

    async fn features_for(&self, cell_id: &str) -> Result<Option<FeatureVector>, StoreError> {
        Ok(self.cells.get(cell_id).cloned())
    }
}
