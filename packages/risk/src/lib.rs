#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Place-based crime risk scoring.
//!
//! A static linear model weighs nine normalized environmental features,
//! adjusts the result for the hour of day, and calibrates it against the
//! whole cell population into a `0..=100` score with three tiers.
//!
//! [`RiskEngine`] is the entry point. It owns the [`ModelConfig`], a
//! [`FeatureStore`], and the population [`Calibration`], which is computed
//! on first use and then reused for the rest of the process lifetime.

pub mod calibration;
pub mod model;
pub mod scorer;
pub mod store;

use std::sync::Arc;

use chrono::NaiveDateTime;
use risk_map_risk_models::{FeatureVector, RiskAssessment};
use tokio::sync::OnceCell;

pub use calibration::{Calibration, CalibrationError};
pub use model::{ModelConfig, ModelConfigError};
pub use scorer::NonFiniteScore;
pub use store::{FeatureStore, InMemoryFeatureStore, StoreError};

/// Errors from the risk engine.
#[derive(Debug, thiserror::Error)]
pub enum RiskError {
    /// The feature store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The population could not be calibrated.
    #[error("Calibration failed: {0}")]
    Calibration(#[from] CalibrationError),

    /// The cell's score overflowed.
    #[error(transparent)]
    Score(#[from] NonFiniteScore),
}

/// Shared scoring service.
///
/// The calibration is computed from a full feature-store scan the first
/// time any method needs it. Concurrent first callers wait on the same
/// computation, so the scan runs at most once per successful calibration.
/// A failed calibration is not cached and is retried by the next caller.
///
/// The cached calibration is never refreshed. Features written to the store
/// afterwards are scored against the ranges and percentiles observed at
/// calibration time until the process restarts.
pub struct RiskEngine {
    model: ModelConfig,
    store: Arc<dyn FeatureStore>,
    calibration: OnceCell<Calibration>,
}

impl RiskEngine {
    /// Creates an engine. Nothing is read from the store until the first
    /// call that needs the calibration.
    #[must_use]
    pub fn new(model: ModelConfig, store: Arc<dyn FeatureStore>) -> Self {
        Self {
            model,
            store,
            calibration: OnceCell::new(),
        }
    }

    /// The scoring model.
    #[must_use]
    pub const fn model(&self) -> &ModelConfig {
        &self.model
    }

    /// Returns the population calibration, computing it if this is the
    /// first call.
    ///
    /// # Errors
    ///
    /// Returns [`RiskError`] if the store scan fails or the population is
    /// empty.
    pub async fn calibration(&self) -> Result<&Calibration, RiskError> {
        self.calibration
            .get_or_try_init(|| async {
                log::info!("Calibrating risk model {}...", self.model.version);
                let population = self.store.all_features().await?;
                let calibration = Calibration::compute(&self.model, &population)?;
                let dist = &calibration.distribution;
                log::info!(
                    "Calibrated over {} cells: min={:.4} p33={:.4} p66={:.4} max={:.4}",
                    calibration.population_size,
                    dist.min,
                    dist.p33,
                    dist.p66,
                    dist.max
                );
                Ok(calibration)
            })
            .await
    }

    /// Computes the calibration ahead of the first request.
    ///
    /// # Errors
    ///
    /// Returns [`RiskError`] if calibration fails.
    pub async fn warm_up(&self) -> Result<(), RiskError> {
        self.calibration().await.map(|_| ())
    }

    /// Whether the calibration has been computed.
    #[must_use]
    pub fn is_calibrated(&self) -> bool {
        self.calibration.initialized()
    }

    /// Scores a feature vector that the caller already holds.
    ///
    /// # Errors
    ///
    /// Returns [`RiskError`] if the calibration is not available or the
    /// score overflows.
    pub async fn assess(
        &self,
        cell_id: &str,
        features: &FeatureVector,
        prediction_time: NaiveDateTime,
    ) -> Result<RiskAssessment, RiskError> {
        let calibration = self.calibration().await?;
        scorer::assess(
            &self.model,
            calibration,
            cell_id,
            features,
            prediction_time,
        )
        .map_err(RiskError::from)
    }

    /// Looks up a cell's features and scores them. Returns `None` if the
    /// store has no features for `cell_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RiskError`] if the store or the calibration fails, or the
    /// score overflows.
    pub async fn assess_cell(
        &self,
        cell_id: &str,
        prediction_time: NaiveDateTime,
    ) -> Result<Option<RiskAssessment>, RiskError> {
        let Some(features) = self.store.features_for(cell_id).await? else {
            return Ok(None);
        };
        self.assess(cell_id, &features, prediction_time)
            .await
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use risk_map_risk_models::{CellFeatures, Feature, RiskLevel};

    use super::*;

    /// Wraps a store and counts full scans.
    struct CountingStore {
        inner: InMemoryFeatureStore,
        scans: AtomicUsize,
    }

    #[async_trait]
    impl FeatureStore for CountingStore {
        async fn all_features(&self) -> Result<Vec<CellFeatures>, StoreError> {
            self.scans.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.inner.all_features().await
        }

        async fn features_for(&self, cell_id: &str) -> Result<Option<FeatureVector>, StoreError> {
            self.inner.features_for(cell_id).await
        }
    }

    struct FailingStore;

    #[async_trait]
    impl FeatureStore for FailingStore {
        async fn all_features(&self) -> Result<Vec<CellFeatures>, StoreError> {
            Err(StoreError::new("connection refused"))
        }

        async fn features_for(&self, _cell_id: &str) -> Result<Option<FeatureVector>, StoreError> {
            Err(StoreError::new("connection refused"))
        }
    }

    fn store() -> InMemoryFeatureStore {
        (0..9)
            .map(|i| CellFeatures {
                cell_id: format!("cell-{i}"),
                features: FeatureVector::new()
                    .with(Feature::BarsCount, f64::from(i))
                    .with(Feature::StreetLightsCount, f64::from(9 - i)),
            })
            .collect()
    }

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn calibration_is_lazy_and_computed_once() {
        let counting = Arc::new(CountingStore {
            inner: store(),
            scans: AtomicUsize::new(0),
        });
        let engine = RiskEngine::new(ModelConfig::builtin(), counting.clone());
        assert!(!engine.is_calibrated());
        assert_eq!(counting.scans.load(Ordering::SeqCst), 0);

        let (a, b, c, d) = tokio::join!(
            engine.calibration(),
            engine.calibration(),
            engine.assess_cell("cell-1", noon()),
            engine.assess_cell("cell-8", noon()),
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok() && d.is_ok());
        assert_eq!(counting.scans.load(Ordering::SeqCst), 1);

        engine.assess_cell("cell-4", noon()).await.unwrap();
        assert_eq!(counting.scans.load(Ordering::SeqCst), 1);
        assert!(engine.is_calibrated());
    }

    #[tokio::test]
    async fn calibration_is_shared_across_tasks() {
        let counting = Arc::new(CountingStore {
            inner: store(),
            scans: AtomicUsize::new(0),
        });
        let engine = Arc::new(RiskEngine::new(ModelConfig::builtin(), counting.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.warm_up().await.is_ok() })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert_eq!(counting.scans.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn outliers_clamp_against_cached_calibration() {
        let engine = RiskEngine::new(ModelConfig::builtin(), Arc::new(store()));
        let before = engine.calibration().await.unwrap().clone();
        // A vector far outside the calibrated range is clamped, not
        // recalibrated against.
        let outlier = FeatureVector::new().with(Feature::BarsCount, 1000.0);
        let assessment = engine.assess("new", &outlier, noon()).await.unwrap();
        assert!((assessment.score - 100.0).abs() < f64::EPSILON);
        assert_eq!(assessment.level, RiskLevel::High);
        assert_eq!(engine.calibration().await.unwrap(), &before);
    }

    #[tokio::test]
    async fn unknown_cell_is_none() {
        let engine = RiskEngine::new(ModelConfig::builtin(), Arc::new(store()));
        assert!(engine.assess_cell("missing", noon()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_store_fails_without_caching() {
        let engine = RiskEngine::new(
            ModelConfig::builtin(),
            Arc::new(InMemoryFeatureStore::new()),
        );
        assert!(matches!(
            engine.warm_up().await,
            Err(RiskError::Calibration(CalibrationError::EmptyPopulation))
        ));
        assert!(!engine.is_calibrated());
    }

    #[tokio::test]
    async fn store_errors_propagate() {
        let engine = RiskEngine::new(ModelConfig::builtin(), Arc::new(FailingStore));
        assert!(matches!(engine.warm_up().await, Err(RiskError::Store(_))));
        assert!(matches!(
            engine.assess_cell("cell-1", noon()).await,
            Err(RiskError::Store(_))
        ));
    }

    #[tokio::test]
    async fn overflowing_cell_is_an_error() {
        let mut store = InMemoryFeatureStore::new();
        assert!(store.is_empty());
        store.insert("flat", FeatureVector::new());
        store.insert(
            "sliver",
            FeatureVector::new()
                .with(Feature::BarsCount, 1e-300)
                .with(Feature::MedianIncome, 1e-300),
        );
        assert_eq!(store.len(), 2);

        let engine = RiskEngine::new(ModelConfig::builtin(), Arc::new(store));
        assert!(engine.assess_cell("sliver", noon()).await.unwrap().is_some());

        let overflow = FeatureVector::new()
            .with(Feature::BarsCount, 1e10)
            .with(Feature::MedianIncome, 1e10);
        assert!(matches!(
            engine.assess("new", &overflow, noon()).await,
            Err(RiskError::Score(NonFiniteScore { cell_id })) if cell_id == "new"
        ));
    }

    #[tokio::test]
    async fn assess_cell_scores_stored_features() {
        let engine = RiskEngine::new(ModelConfig::builtin(), Arc::new(store()));
        let top = engine.assess_cell("cell-8", noon()).await.unwrap().unwrap();
        let bottom = engine.assess_cell("cell-0", noon()).await.unwrap().unwrap();
        assert_eq!(top.cell_id, "cell-8");
        assert!(top.score > bottom.score);
        assert_eq!(top.level, RiskLevel::High);
        assert_eq!(bottom.level, RiskLevel::Low);
    }
}
