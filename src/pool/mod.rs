//! Rating pools
//!
//! A [`RatingPool`] bundles one pool's ratings and optional recent form behind
//! a single lock, so every update runs its load, mutate and save cycle without
//! interleaving. [`PoolRegistry`] opens the configured pools by name.

use crate::calibration::{CalibrationOutcome, WeightCalibrator};
use crate::config::{AppConfig, PoolSettings};
use crate::error::{RatingError, Result};
use crate::form::{FormState, FormTracker};
use crate::metrics::MetricsCollector;
use crate::prediction::PredictionModel;
use crate::rating::{EloEngine, FileSnapshot, RatingStore, SnapshotBackend};
use crate::types::{
    canonical_name, require_name, CompetitorId, FormEntry, MatchRecord, MatchResult, MatchUpdate,
    PredictionResult, RatingState, Standing,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Mutable state of a pool
#[derive(Debug)]
struct PoolState {
    ratings: RatingStore,
    form: Option<FormTracker>,
}

/// One independent competitor population with its own snapshots
pub struct RatingPool {
    name: String,
    engine: EloEngine,
    model: PredictionModel,
    state: Mutex<PoolState>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl std::fmt::Debug for RatingPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RatingPool")
            .field("name", &self.name)
            .field("k_factor", &self.engine.k_factor())
            .finish()
    }
}

impl RatingPool {
    /// Open a pool backed by the snapshot files in `settings`
    pub fn open(settings: &PoolSettings, config: &AppConfig) -> Result<Self> {
        let rating_backend: Box<dyn SnapshotBackend> =
            Box::new(FileSnapshot::new(&settings.ratings_path));
        let form_backend = settings
            .form_path
            .as_ref()
            .map(|path| Box::new(FileSnapshot::new(path)) as Box<dyn SnapshotBackend>);

        Self::with_backends(&settings.name, config, rating_backend, form_backend)
    }

    /// Open a pool over arbitrary backends. Form tracking is enabled only when
    /// a form backend is given.
    pub fn with_backends(
        name: impl Into<String>,
        config: &AppConfig,
        rating_backend: Box<dyn SnapshotBackend>,
        form_backend: Option<Box<dyn SnapshotBackend>>,
    ) -> Result<Self> {
        let name = name.into();
        let engine = EloEngine::new(config.rating.k_factor)?;
        let model = PredictionModel::new(engine.clone(), config.prediction.clone())?;

        let ratings = RatingStore::load(&name, rating_backend, config.rating.initial_rating)?;
        let form = form_backend
            .map(|backend| FormTracker::load(&name, config.form.clone(), backend))
            .transpose()?;

        info!(
            pool = %name,
            competitors = ratings.len(),
            form = form.is_some(),
            "Opened rating pool"
        );

        Ok(Self {
            name,
            engine,
            model,
            state: Mutex::new(PoolState { ratings, form }),
            metrics: None,
        })
    }

    /// Attach a metrics collector
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        if let Ok(state) = self.state.get_mut() {
            metrics.update_competitors(&self.name, state.ratings.len());
        }
        self.metrics = Some(metrics);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &PredictionModel {
        &self.model
    }

    pub fn metrics(&self) -> Option<&Arc<MetricsCollector>> {
        self.metrics.as_ref()
    }

    /// Whether this pool tracks recent form
    pub fn has_form(&self) -> Result<bool> {
        Ok(self.lock()?.form.is_some())
    }

    fn lock(&self) -> Result<MutexGuard<'_, PoolState>> {
        self.state.lock().map_err(|_| {
            RatingError::InternalError {
                message: format!("Pool {} lock poisoned", self.name),
            }
            .into()
        })
    }

    /// Apply one match result.
    ///
    /// Names are canonicalized first. Form is recorded from the pre-match
    /// ratings, then the Elo update runs and persists the ratings, then the
    /// form snapshot is persisted. On any failure both competitors' ratings
    /// and form windows are put back and the ratings snapshot is rewritten,
    /// so a retry applies the match exactly once.
    pub fn apply(&self, record: &MatchRecord) -> Result<MatchUpdate> {
        let record = record.canonical()?;
        if record.competitor_a == record.competitor_b {
            return Err(RatingError::MalformedRecord {
                line: 0,
                reason: format!("'{}' cannot play itself", record.competitor_a),
            }
            .into());
        }

        let timer = self.metrics.as_ref().map(|m| m.start_timer());
        let mut state = self.lock()?;
        let checkpoint = Checkpoint::capture(&state, &record);
        let PoolState { ratings, form } = &mut *state;

        let rating_a = ratings.rating_or_default(&record.competitor_a);
        let rating_b = ratings.rating_or_default(&record.competitor_b);

        let form_deltas = form.as_mut().map(|tracker| {
            tracker.record(
                &record.competitor_a,
                &record.competitor_b,
                record.result,
                rating_a,
                rating_b,
            )
        });

        let update = match self.engine.apply(ratings, &record) {
            Ok(update) => update,
            Err(e) => {
                checkpoint.restore(&mut state);
                return Err(e);
            }
        };
        if let Some(tracker) = form.as_ref() {
            if let Err(e) = tracker.save() {
                checkpoint.restore(&mut state);
                if let Err(rollback) = state.ratings.save() {
                    warn!(
                        pool = %self.name,
                        error = %rollback,
                        "Failed to roll back ratings snapshot"
                    );
                }
                return Err(e);
            }
        }

        debug!(
            pool = %self.name,
            competitor_a = %record.competitor_a,
            competitor_b = %record.competitor_b,
            result = %record.result,
            "Applied match"
        );

        if let (Some(metrics), Some(timer)) = (self.metrics.as_ref(), timer) {
            metrics.record_match_applied(&self.name, state.ratings.len(), timer.stop());
        }

        Ok(MatchUpdate {
            record,
            rating_a: update.competitor_a,
            rating_b: update.competitor_b,
            form_delta_a: form_deltas.map(|(a, _)| a),
            form_delta_b: form_deltas.map(|(_, b)| b),
        })
    }

    /// Apply a result given as a label; an unknown label changes nothing
    pub fn apply_labeled(
        &self,
        competitor_a: &str,
        competitor_b: &str,
        label: &str,
    ) -> Result<MatchUpdate> {
        let result: MatchResult = label.parse()?;
        self.apply(&MatchRecord::new(competitor_a, competitor_b, result))
    }

    /// Predict a fixture with the configured weights
    pub fn predict(&self, competitor_a: &str, competitor_b: &str) -> Result<PredictionResult> {
        let competitor_a = require_name(competitor_a)?;
        let competitor_b = require_name(competitor_b)?;
        let mut state = self.lock()?;
        let PoolState { ratings, form } = &mut *state;

        let prediction = self
            .model
            .predict(ratings, form.as_ref(), &competitor_a, &competitor_b);

        if let Some(metrics) = &self.metrics {
            metrics.record_prediction(&self.name, prediction.is_ok());
            metrics.update_competitors(&self.name, ratings.len());
        }

        prediction
    }

    /// Search for the best blend weights against `labeled` matches
    pub fn calibrate(&self, labeled: &[MatchRecord], step: f64) -> Result<CalibrationOutcome> {
        let calibrator = WeightCalibrator::new(step)?;
        let state = self.lock()?;

        let form = state
            .form
            .as_ref()
            .ok_or_else(|| RatingError::ConfigurationError {
                message: format!("Pool {} does not track recent form", self.name),
            })?;

        let labeled = labeled
            .iter()
            .map(MatchRecord::canonical)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let outcome = calibrator.search(&self.model, &state.ratings, form, &labeled)?;

        if let Some(metrics) = &self.metrics {
            metrics.record_calibration(&self.name, outcome.accuracy);
        }

        Ok(outcome)
    }

    /// Ratings table, highest first
    pub fn standings(&self) -> Result<Vec<Standing>> {
        Ok(self.lock()?.ratings.standings())
    }

    /// Form table, best first; empty when form is not tracked
    pub fn form_table(&self) -> Result<Vec<FormEntry>> {
        Ok(self
            .lock()?
            .form
            .as_ref()
            .map(|form| form.form_table())
            .unwrap_or_default())
    }

    /// Current state of a competitor, without creating it
    pub fn rating_of(&self, competitor: &str) -> Result<Option<RatingState>> {
        let Some(competitor) = canonical_name(competitor) else {
            return Ok(None);
        };
        Ok(self.lock()?.ratings.peek(&competitor))
    }

    /// Current form score of a competitor
    pub fn form_of(&self, competitor: &str) -> Result<Option<f64>> {
        let competitor = canonical_name(competitor).unwrap_or_default();
        Ok(self
            .lock()?
            .form
            .as_ref()
            .map(|form| form.form_of(&competitor)))
    }

    /// Number of competitors in the pool
    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.ratings.len())
    }
}

/// Both competitors' state before an update
struct Checkpoint {
    ratings: [(CompetitorId, Option<RatingState>); 2],
    form: [(CompetitorId, Option<FormState>); 2],
}

impl Checkpoint {
    fn capture(state: &PoolState, record: &MatchRecord) -> Self {
        let form_state = |competitor: &str| {
            state
                .form
                .as_ref()
                .and_then(|form| form.state(competitor).cloned())
        };
        let a = &record.competitor_a;
        let b = &record.competitor_b;

        Self {
            ratings: [
                (a.clone(), state.ratings.peek(a)),
                (b.clone(), state.ratings.peek(b)),
            ],
            form: [(a.clone(), form_state(a)), (b.clone(), form_state(b))],
        }
    }

    fn restore(self, state: &mut PoolState) {
        for (competitor, rating) in self.ratings {
            state.ratings.restore(&competitor, rating);
        }
        if let Some(form) = state.form.as_mut() {
            for (competitor, window) in self.form {
                form.restore(&competitor, window);
            }
        }
    }
}

/// Named pools opened from configuration
#[derive(Debug, Default)]
pub struct PoolRegistry {
    pools: HashMap<String, Arc<RatingPool>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open every configured pool
    pub fn from_config(config: &AppConfig, metrics: Option<Arc<MetricsCollector>>) -> Result<Self> {
        let mut registry = Self::new();
        for settings in &config.pools {
            let mut pool = RatingPool::open(settings, config)?;
            if let Some(metrics) = &metrics {
                pool = pool.with_metrics(metrics.clone());
            }
            registry.insert(pool);
        }
        Ok(registry)
    }

    /// Add a pool, replacing any pool of the same name
    pub fn insert(&mut self, pool: RatingPool) -> Arc<RatingPool> {
        let pool = Arc::new(pool);
        self.pools.insert(pool.name().to_string(), pool.clone());
        pool
    }

    pub fn get(&self, name: &str) -> Result<Arc<RatingPool>> {
        self.pools.get(name).cloned().ok_or_else(|| {
            RatingError::PoolNotFound {
                pool: name.to_string(),
            }
            .into()
        })
    }

    /// Pool names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.pools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rating::storage::MockSnapshotBackend;
    use crate::rating::InMemorySnapshot;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory snapshot whose next `failures` writes fail
    struct FlakySnapshot {
        inner: InMemorySnapshot,
        failures: AtomicUsize,
    }

    impl FlakySnapshot {
        fn failing(failures: usize) -> Self {
            Self {
                inner: InMemorySnapshot::new(),
                failures: AtomicUsize::new(failures),
            }
        }
    }

    impl SnapshotBackend for FlakySnapshot {
        fn read(&self) -> Result<Option<String>> {
            self.inner.read()
        }

        fn write(&self, contents: &str) -> Result<()> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(RatingError::PersistenceFailed {
                    location: self.describe(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
                }
                .into());
            }
            self.inner.write(contents)
        }

        fn describe(&self) -> String {
            "flaky".to_string()
        }
    }

    struct Snapshots {
        ratings: Arc<InMemorySnapshot>,
        form: Arc<InMemorySnapshot>,
    }

    fn memory_pool(config: &AppConfig) -> (RatingPool, Snapshots) {
        let snapshots = Snapshots {
            ratings: Arc::new(InMemorySnapshot::new()),
            form: Arc::new(InMemorySnapshot::new()),
        };
        let pool = RatingPool::with_backends(
            "domestic",
            config,
            Box::new(snapshots.ratings.clone()),
            Some(Box::new(snapshots.form.clone())),
        )
        .unwrap();
        (pool, snapshots)
    }

    #[test]
    fn test_apply_updates_ratings_and_form() {
        let (pool, snapshots) = memory_pool(&AppConfig::default());

        let update = pool
            .apply(&MatchRecord::new("Arsenal", "Chelsea", MatchResult::WinA))
            .unwrap();

        assert_eq!(update.rating_a.new.rating, 1515.0);
        assert_eq!(update.rating_b.new.rating, 1485.0);
        assert_eq!(update.form_delta_a, Some(10.0));
        assert_eq!(update.form_delta_b, Some(-10.0));

        assert_eq!(
            snapshots.ratings.contents().unwrap(),
            "Arsenal 1515 1\nChelsea 1485 1\n"
        );
        assert_eq!(
            snapshots.form.contents().unwrap(),
            "10.00 Arsenal 10\n-10.00 Chelsea -10\n"
        );
    }

    #[test]
    fn test_form_uses_pre_match_ratings() {
        let (pool, _snapshots) = memory_pool(&AppConfig::default());
        pool.apply(&MatchRecord::new("Arsenal", "Chelsea", MatchResult::WinA))
            .unwrap();

        // Chelsea sit 30 below Arsenal before the rematch
        let update = pool
            .apply(&MatchRecord::new("Chelsea", "Arsenal", MatchResult::WinA))
            .unwrap();
        assert!((update.form_delta_a.unwrap() - 10.3).abs() < 1e-9);
        assert!((update.form_delta_b.unwrap() + 10.3).abs() < 1e-9);
    }

    #[test]
    fn test_pool_without_form() {
        let pool = RatingPool::with_backends(
            "international",
            &AppConfig::default(),
            Box::new(InMemorySnapshot::new()),
            None,
        )
        .unwrap();

        let update = pool.apply_labeled("Brazil", "Peru", "draw").unwrap();
        assert_eq!(update.form_delta_a, None);
        assert!(!pool.has_form().unwrap());
        assert!(pool.form_table().unwrap().is_empty());
        assert_eq!(pool.form_of("Brazil").unwrap(), None);

        let err = pool
            .calibrate(&[MatchRecord::new("Brazil", "Peru", MatchResult::Draw)], 0.1)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RatingError>(),
            Some(RatingError::ConfigurationError { .. })
        ));
    }

    #[test]
    fn test_invalid_label_leaves_pool_untouched() {
        let (pool, snapshots) = memory_pool(&AppConfig::default());

        let err = pool.apply_labeled("Arsenal", "Chelsea", "home_win").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RatingError>(),
            Some(RatingError::InvalidResult { .. })
        ));
        assert_eq!(pool.len().unwrap(), 0);
        assert!(snapshots.ratings.contents().is_none());
        assert!(snapshots.form.contents().is_none());
    }

    #[test]
    fn test_self_match_rejected_before_form() {
        let (pool, snapshots) = memory_pool(&AppConfig::default());

        assert!(pool
            .apply(&MatchRecord::new("Arsenal", "Arsenal", MatchResult::Draw))
            .is_err());
        assert_eq!(pool.form_of("Arsenal").unwrap(), Some(0.0));
        assert!(snapshots.form.contents().is_none());
    }

    #[test]
    fn test_persistence_failure_propagates() {
        let mut backend = MockSnapshotBackend::new();
        backend.expect_read().returning(|| Ok(None));
        backend.expect_describe().returning(|| "mock".to_string());
        backend.expect_write().returning(|_| {
            Err(RatingError::PersistenceFailed {
                location: "mock".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            }
            .into())
        });

        let pool =
            RatingPool::with_backends("domestic", &AppConfig::default(), Box::new(backend), None)
                .unwrap();

        let err = pool.apply_labeled("Arsenal", "Chelsea", "win_a").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RatingError>(),
            Some(RatingError::PersistenceFailed { .. })
        ));
    }

    #[test]
    fn test_blank_names_rejected() {
        let (pool, snapshots) = memory_pool(&AppConfig::default());

        for (a, b) in [("  ", "Chelsea"), ("Chelsea", ""), ("\t", " ")] {
            let err = pool.apply_labeled(a, b, "win_a").unwrap_err();
            assert!(matches!(
                err.downcast_ref::<RatingError>(),
                Some(RatingError::MalformedRecord { .. })
            ));
        }
        let err = pool.predict("Chelsea", "   ").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RatingError>(),
            Some(RatingError::MalformedRecord { .. })
        ));

        assert_eq!(pool.len().unwrap(), 0);
        assert!(pool.form_table().unwrap().is_empty());
        assert!(snapshots.ratings.contents().is_none());
        assert!(snapshots.form.contents().is_none());
    }

    #[test]
    fn test_names_are_canonicalized() {
        let (pool, snapshots) = memory_pool(&AppConfig::default());

        let update = pool.apply_labeled(" Man  City ", "Arsenal", "win_a").unwrap();
        assert_eq!(update.record.competitor_a, "Man City");
        assert_eq!(update.rating_a.competitor, "Man City");
        assert_eq!(
            snapshots.ratings.contents().unwrap(),
            "Arsenal 1485 1\nMan City 1515 1\n"
        );

        // Every spelling reaches the same entry
        assert_eq!(pool.rating_of("Man City").unwrap().unwrap().rating, 1515.0);
        assert_eq!(pool.rating_of("Man  City").unwrap().unwrap().rating, 1515.0);
        assert_eq!(pool.form_of("Man\tCity").unwrap(), Some(10.0));

        // Names that differ only in spacing are one competitor
        assert!(pool.apply_labeled("Arsenal ", " Arsenal", "draw").is_err());
        assert_eq!(pool.len().unwrap(), 2);
    }

    #[test]
    fn test_failed_rating_save_rolls_back() {
        let ratings = Arc::new(FlakySnapshot::failing(1));
        let form = Arc::new(InMemorySnapshot::new());
        let pool = RatingPool::with_backends(
            "domestic",
            &AppConfig::default(),
            Box::new(ratings.clone()),
            Some(Box::new(form.clone())),
        )
        .unwrap();

        let err = pool.apply_labeled("Arsenal", "Chelsea", "win_a").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RatingError>(),
            Some(RatingError::PersistenceFailed { .. })
        ));
        assert_eq!(pool.rating_of("Arsenal").unwrap(), None);
        assert_eq!(pool.form_of("Arsenal").unwrap(), Some(0.0));
        assert!(pool.form_table().unwrap().is_empty());
        assert!(form.contents().is_none());

        // The retry counts the match once
        pool.apply_labeled("Arsenal", "Chelsea", "win_a").unwrap();
        let arsenal = pool.rating_of("Arsenal").unwrap().unwrap();
        assert_eq!(arsenal.rating, 1515.0);
        assert_eq!(arsenal.matches_played, 1);
        assert_eq!(pool.form_of("Arsenal").unwrap(), Some(10.0));
        assert_eq!(
            ratings.inner.contents().unwrap(),
            "Arsenal 1515 1\nChelsea 1485 1\n"
        );
    }

    #[test]
    fn test_failed_form_save_rolls_back_ratings() {
        let ratings = Arc::new(InMemorySnapshot::with_contents("Arsenal 1600 4\n"));
        let form = Arc::new(FlakySnapshot::failing(1));
        let pool = RatingPool::with_backends(
            "domestic",
            &AppConfig::default(),
            Box::new(ratings.clone()),
            Some(Box::new(form.clone())),
        )
        .unwrap();

        assert!(pool.apply_labeled("Arsenal", "Chelsea", "win_a").is_err());

        let arsenal = pool.rating_of("Arsenal").unwrap().unwrap();
        assert_eq!(arsenal.rating, 1600.0);
        assert_eq!(arsenal.matches_played, 4);
        assert_eq!(pool.rating_of("Chelsea").unwrap(), None);
        assert_eq!(pool.form_of("Arsenal").unwrap(), Some(0.0));
        // The ratings snapshot written by the update is replaced again
        assert_eq!(ratings.contents().unwrap(), "Arsenal 1600 4\n");
        assert!(form.inner.contents().is_none());

        let update = pool.apply_labeled("Arsenal", "Chelsea", "win_a").unwrap();
        assert_eq!(update.rating_a.old.matches_played, 4);
        assert_eq!(update.rating_a.new.matches_played, 5);
        assert!(form.inner.contents().is_some());
    }

    #[test]
    fn test_predict_and_unknown_policy() {
        let (pool, _snapshots) = memory_pool(&AppConfig::default());
        let prediction = pool.predict("Arsenal", "Chelsea").unwrap();
        assert!((prediction.draw - 0.30).abs() < 1e-12);
        assert_eq!(pool.rating_of("Arsenal").unwrap().unwrap().rating, 1500.0);

        let mut config = AppConfig::default();
        config.prediction.auto_create_unknown = false;
        let (strict, _snapshots) = memory_pool(&config);
        let err = strict.predict("Arsenal", "Chelsea").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RatingError>(),
            Some(RatingError::UnknownCompetitor { .. })
        ));
        assert_eq!(strict.rating_of("Arsenal").unwrap(), None);
    }

    #[test]
    fn test_metrics_recorded() {
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let (pool, _snapshots) = memory_pool(&AppConfig::default());
        let pool = pool.with_metrics(metrics.clone());

        pool.apply_labeled("Arsenal", "Chelsea", "win_b").unwrap();
        pool.predict("Arsenal", "Chelsea").unwrap();
        pool.calibrate(&[MatchRecord::new("Arsenal", "Chelsea", MatchResult::WinB)], 0.5)
            .unwrap();

        assert_eq!(
            metrics
                .ingest()
                .matches_applied_total
                .with_label_values(&["domestic"])
                .get(),
            1
        );
        assert_eq!(
            metrics
                .prediction()
                .predictions_total
                .with_label_values(&["domestic"])
                .get(),
            1
        );
        assert_eq!(
            metrics
                .prediction()
                .calibration_accuracy
                .with_label_values(&["domestic"])
                .get(),
            1.0
        );
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = PoolRegistry::new();
        let config = AppConfig::default();
        for name in ["international", "domestic"] {
            registry.insert(
                RatingPool::with_backends(name, &config, Box::new(InMemorySnapshot::new()), None)
                    .unwrap(),
            );
        }

        assert_eq!(registry.names(), vec!["domestic", "international"]);
        assert_eq!(registry.get("domestic").unwrap().name(), "domestic");

        let err = registry.get("friendlies").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RatingError>(),
            Some(RatingError::PoolNotFound { .. })
        ));
    }
}
