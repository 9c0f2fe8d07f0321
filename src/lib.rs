//! team-elo - Team ratings, recent form and match outcome prediction
//!
//! This crate maintains Elo ratings for competitors across independent pools,
//! tracks short-horizon recent form, predicts win/draw/loss probabilities for
//! fixtures and calibrates how much prediction weight form should get.

pub mod calibration;
pub mod config;
pub mod error;
pub mod form;
pub mod ingest;
pub mod metrics;
pub mod pool;
pub mod prediction;
pub mod rating;
pub mod types;

// Re-export commonly used types and traits
pub use error::{RatingError, Result};
pub use types::*;

// Re-export key components
pub use calibration::{CalibrationOutcome, WeightCalibrator};
pub use form::{FormConfig, FormReduction, FormTracker};
pub use pool::{PoolRegistry, RatingPool};
pub use prediction::{BlendWeights, PredictionConfig, PredictionModel};
pub use rating::{EloEngine, FileSnapshot, InMemorySnapshot, RatingStore, SnapshotBackend};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
