//! Outcome prediction
//!
//! Converts expected scores into a win/draw/loss distribution. The draw
//! probability is a linear interpolation on the skill gap between
//! `max_draw_prob` (even match) and `min_draw_prob` (total mismatch). It is a
//! heuristic, not a calibrated probability.

use crate::error::{RatingError, Result};
use crate::form::FormTracker;
use crate::rating::{EloEngine, RatingStore};
use crate::types::PredictionResult;
use serde::{Deserialize, Serialize};
use tracing::debug;

const WEIGHT_TOLERANCE: f64 = 1e-9;

/// Relative weight of Elo and form in a blended expectation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendWeights {
    pub weight_elo: f64,
    pub weight_form: f64,
}

impl BlendWeights {
    pub fn new(weight_elo: f64, weight_form: f64) -> Result<Self> {
        let weights = Self {
            weight_elo,
            weight_form,
        };
        weights.validate()?;
        Ok(weights)
    }

    /// Pure Elo weighting
    pub fn elo_only() -> Self {
        Self {
            weight_elo: 1.0,
            weight_form: 0.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("weight_elo", self.weight_elo), ("weight_form", self.weight_form)] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(RatingError::ConfigurationError {
                    message: format!("{} must be within [0, 1], got {}", name, value),
                }
                .into());
            }
        }

        if (self.weight_elo + self.weight_form - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(RatingError::ConfigurationError {
                message: format!(
                    "Blend weights must sum to 1, got {} + {}",
                    self.weight_elo, self.weight_form
                ),
            }
            .into());
        }

        Ok(())
    }
}

impl Default for BlendWeights {
    fn default() -> Self {
        Self::elo_only()
    }
}

/// Prediction parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Draw probability for evenly matched sides
    pub max_draw_prob: f64,
    /// Draw probability for a complete mismatch
    pub min_draw_prob: f64,
    pub weight_elo: f64,
    pub weight_form: f64,
    /// Create unseen competitors at the default rating instead of failing
    pub auto_create_unknown: bool,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            max_draw_prob: 0.30,
            min_draw_prob: 0.05,
            weight_elo: 1.0,
            weight_form: 0.0,
            auto_create_unknown: true,
        }
    }
}

impl PredictionConfig {
    pub fn weights(&self) -> BlendWeights {
        BlendWeights {
            weight_elo: self.weight_elo,
            weight_form: self.weight_form,
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if !self.min_draw_prob.is_finite() || self.min_draw_prob < 0.0 {
            return Err(RatingError::ConfigurationError {
                message: "Minimum draw probability must be non-negative".to_string(),
            }
            .into());
        }

        if !self.max_draw_prob.is_finite() || self.max_draw_prob >= 1.0 {
            return Err(RatingError::ConfigurationError {
                message: "Maximum draw probability must be below 1".to_string(),
            }
            .into());
        }

        if self.min_draw_prob > self.max_draw_prob {
            return Err(RatingError::ConfigurationError {
                message: format!(
                    "Minimum draw probability {} exceeds maximum {}",
                    self.min_draw_prob, self.max_draw_prob
                ),
            }
            .into());
        }

        self.weights().validate()
    }
}

/// Turns ratings (and optionally form) into outcome probabilities
#[derive(Debug, Clone)]
pub struct PredictionModel {
    engine: EloEngine,
    config: PredictionConfig,
}

impl PredictionModel {
    pub fn new(engine: EloEngine, config: PredictionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { engine, config })
    }

    pub fn config(&self) -> &PredictionConfig {
        &self.config
    }

    pub fn weights(&self) -> BlendWeights {
        self.config.weights()
    }

    /// Draw probability for a skill gap in `[0, 1]`
    pub fn draw_probability(&self, skill_gap: f64) -> f64 {
        let gap = skill_gap.clamp(0.0, 1.0);
        self.config.max_draw_prob - gap * (self.config.max_draw_prob - self.config.min_draw_prob)
    }

    /// Spread expected scores over win/draw/loss
    pub fn distribution(&self, expected_a: f64, expected_b: f64) -> PredictionResult {
        let draw = self.draw_probability((expected_a - expected_b).abs());
        PredictionResult {
            win_a: expected_a * (1.0 - draw),
            draw,
            win_b: expected_b * (1.0 - draw),
        }
    }

    /// Split two form scores into a share each. Negative form counts as zero,
    /// and a zero total is an even split.
    pub fn form_expectation(form_a: f64, form_b: f64) -> (f64, f64) {
        let magnitude_a = form_a.max(0.0);
        let magnitude_b = form_b.max(0.0);
        let total = magnitude_a + magnitude_b;
        if total == 0.0 {
            return (0.5, 0.5);
        }
        let share_a = magnitude_a / total;
        (share_a, 1.0 - share_a)
    }

    /// Expected scores using the given weights. Never creates competitors:
    /// unseen ones count as the initial rating and neutral form.
    pub fn blended_expectation(
        &self,
        ratings: &RatingStore,
        form: Option<&FormTracker>,
        competitor_a: &str,
        competitor_b: &str,
        weights: BlendWeights,
    ) -> (f64, f64) {
        let (elo_a, elo_b) = self.engine.expected(
            ratings.rating_or_default(competitor_a),
            ratings.rating_or_default(competitor_b),
        );

        let Some(form) = form else {
            return (elo_a, elo_b);
        };

        let (form_a, form_b) =
            Self::form_expectation(form.form_of(competitor_a), form.form_of(competitor_b));

        (
            weights.weight_elo * elo_a + weights.weight_form * form_a,
            weights.weight_elo * elo_b + weights.weight_form * form_b,
        )
    }

    /// Predict a fixture between two competitors
    pub fn predict(
        &self,
        ratings: &mut RatingStore,
        form: Option<&FormTracker>,
        competitor_a: &str,
        competitor_b: &str,
    ) -> Result<PredictionResult> {
        if self.config.auto_create_unknown {
            ratings.get(competitor_a);
            ratings.get(competitor_b);
        } else {
            for competitor in [competitor_a, competitor_b] {
                if !ratings.contains(competitor) {
                    return Err(RatingError::UnknownCompetitor {
                        competitor: competitor.to_string(),
                    }
                    .into());
                }
            }
        }

        let (expected_a, expected_b) =
            self.blended_expectation(ratings, form, competitor_a, competitor_b, self.weights());
        let prediction = self.distribution(expected_a, expected_b);

        debug!(
            pool = %ratings.pool(),
            competitor_a,
            competitor_b,
            win_a = prediction.win_a,
            draw = prediction.draw,
            win_b = prediction.win_b,
            "Predicted fixture"
        );

        Ok(prediction)
    }
}
