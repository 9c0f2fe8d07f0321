//! Blend weight calibration
//!
//! Exhaustive grid search over `(weight_elo, weight_form)` pairs on the simplex,
//! scoring each pair by hard win/draw/loss classification accuracy against a
//! labeled match set. Deterministic for identical inputs.

use crate::error::{RatingError, Result};
use crate::form::FormTracker;
use crate::prediction::{BlendWeights, PredictionModel};
use crate::rating::RatingStore;
use crate::types::{MatchRecord, MatchResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Default grid spacing
pub const DEFAULT_STEP: f64 = 0.1;

const STEP_TOLERANCE: f64 = 1e-9;

/// Accuracy of one grid point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightScore {
    pub weight_elo: f64,
    pub weight_form: f64,
    pub accuracy: f64,
}

/// Best weighting found by a search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationOutcome {
    pub weight_elo: f64,
    pub weight_form: f64,
    pub accuracy: f64,
    /// Number of labeled matches scored
    pub evaluated: usize,
    /// Every grid point in search order
    pub grid: Vec<WeightScore>,
}

impl CalibrationOutcome {
    pub fn weights(&self) -> BlendWeights {
        BlendWeights {
            weight_elo: self.weight_elo,
            weight_form: self.weight_form,
        }
    }
}

/// Grid search over blend weights
#[derive(Debug, Clone)]
pub struct WeightCalibrator {
    steps: usize,
}

impl Default for WeightCalibrator {
    fn default() -> Self {
        Self { steps: 10 }
    }
}

impl WeightCalibrator {
    /// Create a calibrator. `step` must be in `(0, 1]` and divide 1 evenly.
    pub fn new(step: f64) -> Result<Self> {
        if !step.is_finite() || step <= 0.0 || step > 1.0 {
            return Err(RatingError::ConfigurationError {
                message: format!("Calibration step must be within (0, 1], got {}", step),
            }
            .into());
        }

        let steps = (1.0 / step).round();
        if (steps * step - 1.0).abs() > STEP_TOLERANCE {
            return Err(RatingError::ConfigurationError {
                message: format!("Calibration step {} does not divide 1 evenly", step),
            }
            .into());
        }

        Ok(Self {
            steps: steps as usize,
        })
    }

    pub fn step(&self) -> f64 {
        1.0 / self.steps as f64
    }

    /// Grid points from Elo-only down to form-only
    pub fn grid(&self) -> impl Iterator<Item = BlendWeights> + '_ {
        (0..=self.steps).rev().map(move |i| {
            let weight_elo = i as f64 / self.steps as f64;
            BlendWeights {
                weight_elo,
                weight_form: 1.0 - weight_elo,
            }
        })
    }

    /// Fraction of `matches` classified correctly under `weights`
    pub fn accuracy(
        &self,
        model: &PredictionModel,
        ratings: &RatingStore,
        form: &FormTracker,
        matches: &[MatchRecord],
        weights: BlendWeights,
    ) -> f64 {
        if matches.is_empty() {
            return 0.0;
        }

        let correct = matches
            .iter()
            .filter(|record| {
                let (expected_a, expected_b) = model.blended_expectation(
                    ratings,
                    Some(form),
                    &record.competitor_a,
                    &record.competitor_b,
                    weights,
                );
                MatchResult::from_expectation(expected_a, expected_b) == record.result
            })
            .count();

        correct as f64 / matches.len() as f64
    }

    /// Find the most accurate weighting. Earlier grid points win ties, so
    /// Elo-only is preferred when it is as good as any blend.
    pub fn search(
        &self,
        model: &PredictionModel,
        ratings: &RatingStore,
        form: &FormTracker,
        labeled_matches: &[MatchRecord],
    ) -> Result<CalibrationOutcome> {
        if labeled_matches.is_empty() {
            return Err(RatingError::CalibrationFailed {
                reason: "no labeled matches to score".to_string(),
            }
            .into());
        }

        let mut grid = Vec::with_capacity(self.steps + 1);
        let mut best: Option<WeightScore> = None;

        for weights in self.grid() {
            let accuracy = self.accuracy(model, ratings, form, labeled_matches, weights);
            let score = WeightScore {
                weight_elo: weights.weight_elo,
                weight_form: weights.weight_form,
                accuracy,
            };
            debug!(
                weight_elo = score.weight_elo,
                weight_form = score.weight_form,
                accuracy,
                "Scored weighting"
            );

            if best.map_or(true, |b| accuracy > b.accuracy) {
                best = Some(score);
            }
            grid.push(score);
        }

        let best = best.ok_or_else(|| RatingError::CalibrationFailed {
            reason: "empty weight grid".to_string(),
        })?;

        info!(
            pool = %ratings.pool(),
            weight_elo = best.weight_elo,
            weight_form = best.weight_form,
            accuracy = best.accuracy,
            matches = labeled_matches.len(),
            "Calibration complete"
        );

        Ok(CalibrationOutcome {
            weight_elo: best.weight_elo,
            weight_form: best.weight_form,
            accuracy: best.accuracy,
            evaluated: labeled_matches.len(),
            grid,
        })
    }
}
