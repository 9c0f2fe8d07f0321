//! Rating system configuration

use crate::rating::elo::DEFAULT_K_FACTOR;
use crate::types::DEFAULT_RATING;
use serde::{Deserialize, Serialize};

/// Elo parameters shared by every pool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingSettings {
    /// Update step scale
    pub k_factor: f64,
    /// Rating given to a competitor on first reference
    pub initial_rating: f64,
}

impl Default for RatingSettings {
    fn default() -> Self {
        Self {
            k_factor: DEFAULT_K_FACTOR,
            initial_rating: DEFAULT_RATING,
        }
    }
}
