//! Metrics for the rating engine
//!
//! Prometheus counters, gauges and histograms covering ingestion, prediction
//! and calibration. Rendered as text on request.

pub mod collector;

pub use collector::{
    IngestMetrics, MetricsCollector, MetricsTimer, PerformanceMetrics, PredictionMetrics,
};
