//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the rating engine: match
//! ingestion, predictions, calibration and rating update latency, labelled by
//! pool.

use anyhow::Result;
use prometheus::{
    Encoder, GaugeVec, Histogram, HistogramOpts, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the rating engine
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Match ingestion metrics
    ingest_metrics: IngestMetrics,

    /// Prediction and calibration metrics
    prediction_metrics: PredictionMetrics,

    /// Performance metrics
    performance_metrics: PerformanceMetrics,
}

/// Match ingestion metrics
#[derive(Clone)]
pub struct IngestMetrics {
    /// Matches applied to a pool
    pub matches_applied_total: IntCounterVec,

    /// Records skipped during ingestion, by reason
    pub records_skipped_total: IntCounterVec,

    /// Competitors currently held by a pool
    pub competitors: IntGaugeVec,
}

/// Prediction and calibration metrics
#[derive(Clone)]
pub struct PredictionMetrics {
    /// Predictions served
    pub predictions_total: IntCounterVec,

    /// Predictions refused for an unknown competitor
    pub unknown_competitor_total: IntCounterVec,

    /// Best accuracy found by the last calibration
    pub calibration_accuracy: GaugeVec,
}

/// Performance metrics
#[derive(Clone)]
pub struct PerformanceMetrics {
    /// Time to apply one match, persistence included
    pub update_duration: Histogram,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let ingest_metrics = IngestMetrics::new(&registry)?;
        let prediction_metrics = PredictionMetrics::new(&registry)?;
        let performance_metrics = PerformanceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            ingest_metrics,
            prediction_metrics,
            performance_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Get ingestion metrics
    pub fn ingest(&self) -> &IngestMetrics {
        &self.ingest_metrics
    }

    /// Get prediction metrics
    pub fn prediction(&self) -> &PredictionMetrics {
        &self.prediction_metrics
    }

    /// Get performance metrics
    pub fn performance(&self) -> &PerformanceMetrics {
        &self.performance_metrics
    }

    /// Record a match applied to `pool`
    pub fn record_match_applied(&self, pool: &str, competitors: usize, duration: Duration) {
        self.ingest_metrics
            .matches_applied_total
            .with_label_values(&[pool])
            .inc();

        self.ingest_metrics
            .competitors
            .with_label_values(&[pool])
            .set(competitors as i64);

        self.performance_metrics
            .update_duration
            .observe(duration.as_secs_f64());
    }

    /// Record a skipped ingestion record
    pub fn record_skipped(&self, pool: &str, reason: &str) {
        self.ingest_metrics
            .records_skipped_total
            .with_label_values(&[pool, reason])
            .inc();
    }

    /// Record a prediction, successful or refused
    pub fn record_prediction(&self, pool: &str, success: bool) {
        if success {
            self.prediction_metrics
                .predictions_total
                .with_label_values(&[pool])
                .inc();
        } else {
            self.prediction_metrics
                .unknown_competitor_total
                .with_label_values(&[pool])
                .inc();
        }
    }

    /// Record the competitor count of a pool
    pub fn update_competitors(&self, pool: &str, competitors: usize) {
        self.ingest_metrics
            .competitors
            .with_label_values(&[pool])
            .set(competitors as i64);
    }

    /// Record the best accuracy from a calibration run
    pub fn record_calibration(&self, pool: &str, accuracy: f64) {
        self.prediction_metrics
            .calibration_accuracy
            .with_label_values(&[pool])
            .set(accuracy);
    }

    /// Render every registered metric in the Prometheus text format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl IngestMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let matches_applied_total = IntCounterVec::new(
            Opts::new("team_elo_matches_applied_total", "Total matches applied"),
            &["pool"],
        )?;
        registry.register(Box::new(matches_applied_total.clone()))?;

        let records_skipped_total = IntCounterVec::new(
            Opts::new(
                "team_elo_records_skipped_total",
                "Total ingestion records skipped",
            ),
            &["pool", "reason"],
        )?;
        registry.register(Box::new(records_skipped_total.clone()))?;

        let competitors = IntGaugeVec::new(
            Opts::new("team_elo_competitors", "Competitors held by a pool"),
            &["pool"],
        )?;
        registry.register(Box::new(competitors.clone()))?;

        Ok(Self {
            matches_applied_total,
            records_skipped_total,
            competitors,
        })
    }
}

impl PredictionMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let predictions_total = IntCounterVec::new(
            Opts::new("team_elo_predictions_total", "Total predictions served"),
            &["pool"],
        )?;
        registry.register(Box::new(predictions_total.clone()))?;

        let unknown_competitor_total = IntCounterVec::new(
            Opts::new(
                "team_elo_unknown_competitor_total",
                "Predictions refused for an unknown competitor",
            ),
            &["pool"],
        )?;
        registry.register(Box::new(unknown_competitor_total.clone()))?;

        let calibration_accuracy = GaugeVec::new(
            Opts::new(
                "team_elo_calibration_accuracy",
                "Best accuracy from the last calibration (0.0 to 1.0)",
            ),
            &["pool"],
        )?;
        registry.register(Box::new(calibration_accuracy.clone()))?;

        Ok(Self {
            predictions_total,
            unknown_competitor_total,
            calibration_accuracy,
        })
    }
}

impl PerformanceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let update_duration = Histogram::with_opts(
            HistogramOpts::new(
                "team_elo_update_duration_seconds",
                "Match update time including persistence",
            )
            .buckets(vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        )?;
        registry.register(Box::new(update_duration.clone()))?;

        Ok(Self { update_duration })
    }
}
