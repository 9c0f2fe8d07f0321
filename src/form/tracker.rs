//! Recent form tracking
//!
//! Each competitor keeps a sliding window of its last [`FORM_WINDOW`] form
//! deltas. A delta combines a base magnitude for the result with a rating-gap
//! term, so upsets move form further than expected results.

use crate::error::{RatingError, Result};
use crate::form::storage::{decode_form, encode_form};
use crate::rating::storage::SnapshotBackend;
use crate::types::{CompetitorId, FormEntry, MatchResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Number of recent matches kept per competitor
pub const FORM_WINDOW: usize = 6;

/// How a form window is reduced to a single score.
///
/// Fixed for a deployment; a tracker never mixes policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormReduction {
    /// Plain sum of the window
    Sum,
    /// Average with linear weights 1..N, newest entry weighted N
    WeightedAverage,
}

impl FormReduction {
    /// Reduce a window ordered oldest first
    pub fn reduce<'a>(self, history: impl IntoIterator<Item = &'a f64>) -> f64 {
        match self {
            FormReduction::Sum => history.into_iter().sum(),
            FormReduction::WeightedAverage => {
                let (weighted, total_weight) = history.into_iter().enumerate().fold(
                    (0.0, 0.0),
                    |(weighted, total_weight), (index, value)| {
                        let weight = (index + 1) as f64;
                        (weighted + weight * value, total_weight + weight)
                    },
                );
                if total_weight == 0.0 {
                    0.0
                } else {
                    weighted / total_weight
                }
            }
        }
    }
}

impl FromStr for FormReduction {
    type Err = RatingError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sum" => Ok(FormReduction::Sum),
            "weighted_average" | "weighted" => Ok(FormReduction::WeightedAverage),
            other => Err(RatingError::ConfigurationError {
                message: format!("Unknown form reduction policy: {}", other),
            }),
        }
    }
}

impl std::fmt::Display for FormReduction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormReduction::Sum => write!(f, "sum"),
            FormReduction::WeightedAverage => write!(f, "weighted_average"),
        }
    }
}

/// Constants for computing per-match form deltas
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormConfig {
    /// Reduction policy for the whole deployment
    pub reduction: FormReduction,
    /// Base delta for a win (and negated for a loss)
    pub win_delta: f64,
    /// Base delta for a draw, positive for the lower-rated side
    pub draw_delta: f64,
    /// Rating points per unit of gap bonus
    pub gap_scale: f64,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            reduction: FormReduction::Sum,
            win_delta: 10.0,
            draw_delta: 5.0,
            gap_scale: 100.0,
        }
    }
}

impl FormConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if !self.win_delta.is_finite() || self.win_delta < 0.0 {
            return Err(RatingError::ConfigurationError {
                message: "Form win delta must be non-negative".to_string(),
            }
            .into());
        }

        if !self.draw_delta.is_finite() || self.draw_delta < 0.0 {
            return Err(RatingError::ConfigurationError {
                message: "Form draw delta must be non-negative".to_string(),
            }
            .into());
        }

        if !self.gap_scale.is_finite() || self.gap_scale <= 0.0 {
            return Err(RatingError::ConfigurationError {
                message: "Form gap scale must be positive".to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Form deltas `(delta_a, delta_b)` for a result between two pre-match ratings
    pub fn deltas(&self, result: MatchResult, rating_a: f64, rating_b: f64) -> (f64, f64) {
        let (base_a, base_b) = match result {
            MatchResult::WinA => (self.win_delta, -self.win_delta),
            MatchResult::WinB => (-self.win_delta, self.win_delta),
            MatchResult::Draw => {
                if rating_a < rating_b {
                    (self.draw_delta, -self.draw_delta)
                } else if rating_a > rating_b {
                    (-self.draw_delta, self.draw_delta)
                } else {
                    (0.0, 0.0)
                }
            }
        };

        // Positive for the lower-rated side, negative for the favourite
        let gap_a = (rating_b - rating_a) / self.gap_scale;
        (base_a + gap_a, base_b - gap_a)
    }
}

/// Recent form window for one competitor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormState {
    history: VecDeque<f64>,
}

impl FormState {
    /// Build a state from a window ordered oldest first, keeping the newest entries
    pub fn from_history(history: impl IntoIterator<Item = f64>) -> Self {
        let mut state = Self::default();
        for delta in history {
            state.push(delta);
        }
        state
    }

    /// Push a delta, evicting the oldest beyond the window
    pub fn push(&mut self, delta: f64) {
        self.history.push_back(delta);
        while self.history.len() > FORM_WINDOW {
            self.history.pop_front();
        }
    }

    pub fn history(&self) -> impl Iterator<Item = &f64> {
        self.history.iter()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn aggregate(&self, reduction: FormReduction) -> f64 {
        reduction.reduce(self.history.iter())
    }
}

/// Per-pool recent form tracker
pub struct FormTracker {
    pool: String,
    config: FormConfig,
    states: BTreeMap<CompetitorId, FormState>,
    backend: Box<dyn SnapshotBackend>,
}

impl std::fmt::Debug for FormTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormTracker")
            .field("pool", &self.pool)
            .field("reduction", &self.config.reduction)
            .field("competitors", &self.states.len())
            .field("backend", &self.backend.describe())
            .finish()
    }
}

impl FormTracker {
    /// Load a pool's form snapshot; a missing snapshot starts empty
    pub fn load(
        pool: impl Into<String>,
        config: FormConfig,
        backend: Box<dyn SnapshotBackend>,
    ) -> Result<Self> {
        config.validate()?;
        let pool = pool.into();

        let states = match backend.read()? {
            Some(contents) => {
                let mut states = BTreeMap::new();
                for line in decode_form(&contents)? {
                    let state = FormState::from_history(line.history);
                    let aggregate = state.aggregate(config.reduction);
                    if (aggregate - line.aggregate).abs() > 0.01 {
                        warn!(
                            pool = %pool,
                            competitor = %line.competitor,
                            persisted = line.aggregate,
                            recomputed = aggregate,
                            "Persisted form score disagrees with its window, recomputing"
                        );
                    }
                    states.insert(line.competitor, state);
                }
                info!(
                    pool = %pool,
                    competitors = states.len(),
                    reduction = %config.reduction,
                    "Loaded recent form from {}",
                    backend.describe()
                );
                states
            }
            None => {
                let missing = RatingError::MissingStore {
                    location: backend.describe(),
                };
                warn!(pool = %pool, "{}; starting with empty form", missing);
                BTreeMap::new()
            }
        };

        Ok(Self {
            pool,
            config,
            states,
            backend,
        })
    }

    pub fn reduction(&self) -> FormReduction {
        self.config.reduction
    }

    pub fn config(&self) -> &FormConfig {
        &self.config
    }

    /// Record a result using both sides' pre-match ratings.
    ///
    /// Returns the deltas pushed for `(competitor_a, competitor_b)`.
    pub fn record(
        &mut self,
        competitor_a: &str,
        competitor_b: &str,
        result: MatchResult,
        rating_a: f64,
        rating_b: f64,
    ) -> (f64, f64) {
        let (delta_a, delta_b) = self.config.deltas(result, rating_a, rating_b);

        self.states
            .entry(competitor_a.to_string())
            .or_default()
            .push(delta_a);
        self.states
            .entry(competitor_b.to_string())
            .or_default()
            .push(delta_b);

        debug!(
            pool = %self.pool,
            competitor_a,
            competitor_b,
            delta_a,
            delta_b,
            "Recorded form"
        );

        (delta_a, delta_b)
    }

    /// Current form score, `0.0` for a competitor with no history
    pub fn form_of(&self, competitor: &str) -> f64 {
        self.states
            .get(competitor)
            .map(|state| state.aggregate(self.config.reduction))
            .unwrap_or(0.0)
    }

    pub fn state(&self, competitor: &str) -> Option<&FormState> {
        self.states.get(competitor)
    }

    /// Put back a window captured with [`state`](Self::state); `None` removes it
    pub fn restore(&mut self, competitor: &str, state: Option<FormState>) {
        match state {
            Some(state) => {
                self.states.insert(competitor.to_string(), state);
            }
            None => {
                self.states.remove(competitor);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Write all windows to the backend, replacing the previous snapshot
    pub fn save(&self) -> Result<()> {
        let reduction = self.config.reduction;
        let contents = encode_form(
            self.states
                .iter()
                .map(|(competitor, state)| (competitor, state.aggregate(reduction), state)),
        );
        self.backend.write(&contents)?;
        debug!(
            pool = %self.pool,
            competitors = self.states.len(),
            "Saved recent form to {}",
            self.backend.describe()
        );
        Ok(())
    }

    /// Competitors ordered by form score (descending), ties broken by name
    pub fn form_table(&self) -> Vec<FormEntry> {
        let mut entries: Vec<FormEntry> = self
            .states
            .iter()
            .map(|(competitor, state)| FormEntry {
                competitor: competitor.clone(),
                aggregate: state.aggregate(self.config.reduction),
                history: state.history().copied().collect(),
            })
            .collect();

        entries.sort_by(|a, b| {
            b.aggregate
                .partial_cmp(&a.aggregate)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.competitor.cmp(&b.competitor))
        });
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rating::storage::InMemorySnapshot;
    use proptest::prelude::*;

    fn tracker(reduction: FormReduction) -> FormTracker {
        FormTracker::load(
            "test",
            FormConfig {
                reduction,
                ..FormConfig::default()
            },
            Box::new(InMemorySnapshot::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_unknown_competitor_has_neutral_form() {
        let tracker = tracker(FormReduction::Sum);
        assert_eq!(tracker.form_of("West Ham"), 0.0);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_win_deltas_include_rating_gap() {
        let config = FormConfig::default();

        // Underdog wins: bigger swing than the base magnitude
        let (a, b) = config.deltas(MatchResult::WinA, 1400.0, 1600.0);
        assert!((a - 12.0).abs() < 1e-12);
        assert!((b + 12.0).abs() < 1e-12);

        // Favourite wins: smaller swing
        let (a, b) = config.deltas(MatchResult::WinA, 1600.0, 1400.0);
        assert!((a - 8.0).abs() < 1e-12);
        assert!((b + 8.0).abs() < 1e-12);

        let (a, b) = config.deltas(MatchResult::WinB, 1500.0, 1500.0);
        assert_eq!((a, b), (-10.0, 10.0));
    }

    #[test]
    fn test_draw_favours_lower_rated_side() {
        let config = FormConfig::default();

        let (a, b) = config.deltas(MatchResult::Draw, 1400.0, 1600.0);
        assert!((a - 7.0).abs() < 1e-12);
        assert!((b + 7.0).abs() < 1e-12);

        let (a, b) = config.deltas(MatchResult::Draw, 1600.0, 1400.0);
        assert!((a + 7.0).abs() < 1e-12);
        assert!((b - 7.0).abs() < 1e-12);

        assert_eq!(config.deltas(MatchResult::Draw, 1500.0, 1500.0), (0.0, 0.0));
    }

    #[test]
    fn test_window_evicts_oldest_first() {
        let mut tracker = tracker(FormReduction::Sum);

        for _ in 0..6 {
            tracker.record("Chelsea", "West Ham", MatchResult::WinA, 1500.0, 1500.0);
        }
        assert_eq!(tracker.form_of("Chelsea"), 60.0);

        tracker.record("Chelsea", "West Ham", MatchResult::WinB, 1500.0, 1500.0);
        let state = tracker.state("Chelsea").unwrap();
        assert_eq!(state.len(), FORM_WINDOW);
        let history: Vec<f64> = state.history().copied().collect();
        assert_eq!(history, vec![10.0, 10.0, 10.0, 10.0, 10.0, -10.0]);
        assert_eq!(tracker.form_of("Chelsea"), 40.0);
        assert_eq!(tracker.form_of("West Ham"), -40.0);
    }

    #[test]
    fn test_weighted_average_favours_recent_results() {
        let reduction = FormReduction::WeightedAverage;
        // weights 1, 2, 3 -> (1*-10 + 2*0 + 3*10) / 6
        let value = reduction.reduce(&[-10.0, 0.0, 10.0]);
        assert!((value - 20.0 / 6.0).abs() < 1e-12);

        let recent_loss = reduction.reduce(&[10.0, 0.0, -10.0]);
        assert!(recent_loss < value);

        assert_eq!(reduction.reduce(&[]), 0.0);
    }

    #[test]
    fn test_reduction_parsing() {
        assert_eq!("sum".parse::<FormReduction>().unwrap(), FormReduction::Sum);
        assert_eq!(
            "weighted_average".parse::<FormReduction>().unwrap(),
            FormReduction::WeightedAverage
        );
        assert!("median".parse::<FormReduction>().is_err());
    }

    #[test]
    fn test_form_table_sorted() {
        let mut tracker = tracker(FormReduction::Sum);
        tracker.record("Arsenal", "Southampton", MatchResult::WinA, 1500.0, 1500.0);
        tracker.record("Everton", "Newcastle", MatchResult::Draw, 1500.0, 1500.0);

        let table = tracker.form_table();
        let names: Vec<&str> = table.iter().map(|e| e.competitor.as_str()).collect();
        assert_eq!(names, vec!["Arsenal", "Everton", "Newcastle", "Southampton"]);
        assert_eq!(table[0].history, vec![10.0]);
    }

    #[test]
    fn test_save_and_reload() {
        let snapshot = std::sync::Arc::new(InMemorySnapshot::new());

        let mut tracker = FormTracker::load(
            "test",
            FormConfig::default(),
            Box::new(snapshot.clone()),
        )
        .unwrap();
        tracker.record("Crystal Palace", "Liverpool", MatchResult::WinB, 1480.0, 1620.0);
        tracker.save().unwrap();

        let reloaded = FormTracker::load(
            "test",
            FormConfig::default(),
            Box::new(InMemorySnapshot::with_contents(snapshot.contents().unwrap())),
        )
        .unwrap();

        let palace = tracker.form_of("Crystal Palace");
        assert!((reloaded.form_of("Crystal Palace") - palace).abs() < 1e-9);
        assert!((reloaded.form_of("Liverpool") - tracker.form_of("Liverpool")).abs() < 1e-9);
    }

    #[test]
    fn test_restore_puts_back_window() {
        let mut tracker = tracker(FormReduction::Sum);
        tracker.record("Arsenal", "Chelsea", MatchResult::WinA, 1500.0, 1500.0);
        let arsenal = tracker.state("Arsenal").cloned();
        let fulham = tracker.state("Fulham").cloned();

        tracker.record("Arsenal", "Fulham", MatchResult::WinB, 1500.0, 1500.0);
        tracker.restore("Arsenal", arsenal);
        tracker.restore("Fulham", fulham);

        assert_eq!(tracker.form_of("Arsenal"), 10.0);
        assert_eq!(tracker.state("Arsenal").map(|s| s.len()), Some(1));
        assert!(tracker.state("Fulham").is_none());
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_invalid_config() {
        let config = FormConfig {
            gap_scale: 0.0,
            ..FormConfig::default()
        };
        assert!(config.validate().is_err());

        let config = FormConfig {
            win_delta: -1.0,
            ..FormConfig::default()
        };
        assert!(config.validate().is_err());
    }

    proptest! {
        #[test]
        fn prop_window_never_exceeds_limit(outcomes in proptest::collection::vec(0u8..3, 0..40)) {
            let mut tracker = tracker(FormReduction::Sum);
            for outcome in &outcomes {
                let result = match outcome {
                    0 => MatchResult::WinA,
                    1 => MatchResult::WinB,
                    _ => MatchResult::Draw,
                };
                tracker.record("A", "B", result, 1500.0, 1520.0);
            }

            let len = tracker.state("A").map(|s| s.len()).unwrap_or(0);
            prop_assert!(len <= FORM_WINDOW);
            prop_assert_eq!(len, outcomes.len().min(FORM_WINDOW));
        }

        #[test]
        fn prop_aggregate_is_function_of_window(
            values in proptest::collection::vec(-30.0f64..30.0, 0..12),
        ) {
            let state = FormState::from_history(values.iter().copied());
            let skip = values.len().saturating_sub(FORM_WINDOW);
            let kept: Vec<f64> = values.iter().copied().skip(skip).collect();
            let expected: f64 = kept.iter().sum();
            prop_assert!((state.aggregate(FormReduction::Sum) - expected).abs() < 1e-9);
        }

        #[test]
        fn prop_deltas_are_zero_sum(
            ra in 1000.0f64..2000.0,
            rb in 1000.0f64..2000.0,
            outcome in 0u8..3,
        ) {
            let config = FormConfig::default();
            let result = match outcome {
                0 => MatchResult::WinA,
                1 => MatchResult::WinB,
                _ => MatchResult::Draw,
            };
            let (a, b) = config.deltas(result, ra, rb);
            prop_assert!((a + b).abs() < 1e-9);
        }
    }
}
