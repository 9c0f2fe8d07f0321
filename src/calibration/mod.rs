//! Offline calibration of the Elo/form blend

pub mod search;

pub use search::{CalibrationOutcome, WeightCalibrator, WeightScore, DEFAULT_STEP};
