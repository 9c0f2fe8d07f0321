//! Match outcome prediction from ratings and recent form

pub mod model;

pub use model::{BlendWeights, PredictionConfig, PredictionModel};
