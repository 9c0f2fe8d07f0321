//! Elo rating engine
//!
//! This module wraps the logistic Elo model from the skillratings crate and
//! applies bounded, zero-sum updates to a [`RatingStore`].

use crate::error::{RatingError, Result};
use crate::rating::storage::RatingStore;
use crate::types::{require_name, MatchRecord, MatchResult, RatingChange, RatingState};
use skillratings::elo::{elo, expected_score, EloConfig, EloRating};
use tracing::debug;

/// Default K-factor
pub const DEFAULT_K_FACTOR: f64 = 30.0;

/// Rating changes produced by a single update
#[derive(Debug, Clone, PartialEq)]
pub struct EloUpdate {
    pub competitor_a: RatingChange,
    pub competitor_b: RatingChange,
}

/// Elo expectation and update rules with a single shared K-factor
#[derive(Debug, Clone)]
pub struct EloEngine {
    config: EloConfig,
}

impl Default for EloEngine {
    fn default() -> Self {
        Self {
            config: EloConfig {
                k: DEFAULT_K_FACTOR,
            },
        }
    }
}

impl EloEngine {
    /// Create an engine with the given K-factor
    pub fn new(k_factor: f64) -> Result<Self> {
        if !k_factor.is_finite() || k_factor <= 0.0 {
            return Err(RatingError::ConfigurationError {
                message: format!("K-factor must be positive, got {}", k_factor),
            }
            .into());
        }

        Ok(Self {
            config: EloConfig { k: k_factor },
        })
    }

    pub fn k_factor(&self) -> f64 {
        self.config.k
    }

    /// Expected scores `(e_a, e_b)` for two ratings; always sums to 1
    pub fn expected(&self, rating_a: f64, rating_b: f64) -> (f64, f64) {
        expected_score(
            &EloRating { rating: rating_a },
            &EloRating { rating: rating_b },
        )
    }

    /// Apply a match result to both competitors and persist the store.
    ///
    /// Unseen competitors are created at the store's initial rating. Names
    /// must be canonical (see [`crate::types::canonical_name`]). If the save
    /// fails the store is left as it was before the call.
    pub fn update(
        &self,
        store: &mut RatingStore,
        competitor_a: &str,
        competitor_b: &str,
        result: MatchResult,
    ) -> Result<EloUpdate> {
        if competitor_a == competitor_b {
            return Err(RatingError::MalformedRecord {
                line: 0,
                reason: format!("{} cannot play against itself", competitor_a),
            }
            .into());
        }
        for competitor in [competitor_a, competitor_b] {
            if require_name(competitor)? != competitor {
                return Err(RatingError::MalformedRecord {
                    line: 0,
                    reason: format!("competitor name '{}' has irregular whitespace", competitor),
                }
                .into());
            }
        }

        let before_a = store.peek(competitor_a);
        let before_b = store.peek(competitor_b);
        let old_a = store.get(competitor_a);
        let old_b = store.get(competitor_b);

        let (new_a, new_b) = elo(
            &EloRating {
                rating: old_a.rating,
            },
            &EloRating {
                rating: old_b.rating,
            },
            &result.into(),
            &self.config,
        );

        let state_a = RatingState {
            rating: new_a.rating,
            matches_played: old_a.matches_played + 1,
        };
        let state_b = RatingState {
            rating: new_b.rating,
            matches_played: old_b.matches_played + 1,
        };

        store.set(competitor_a, state_a);
        store.set(competitor_b, state_b);

        debug!(
            pool = %store.pool(),
            competitor_a,
            competitor_b,
            result = %result,
            rating_a = state_a.rating,
            rating_b = state_b.rating,
            "Applied Elo update"
        );

        if let Err(e) = store.save() {
            store.restore(competitor_a, before_a);
            store.restore(competitor_b, before_b);
            return Err(e);
        }

        Ok(EloUpdate {
            competitor_a: RatingChange {
                competitor: competitor_a.to_string(),
                old: old_a,
                new: state_a,
            },
            competitor_b: RatingChange {
                competitor: competitor_b.to_string(),
                old: old_b,
                new: state_b,
            },
        })
    }

    /// Apply a match given its textual result label.
    ///
    /// Unknown labels are rejected before the store is touched.
    pub fn update_labeled(
        &self,
        store: &mut RatingStore,
        competitor_a: &str,
        competitor_b: &str,
        label: &str,
    ) -> Result<EloUpdate> {
        let result: MatchResult = label.parse()?;
        self.update(store, competitor_a, competitor_b, result)
    }

    /// Apply a [`MatchRecord`]
    pub fn apply(&self, store: &mut RatingStore, record: &MatchRecord) -> Result<EloUpdate> {
        self.update(
            store,
            &record.competitor_a,
            &record.competitor_b,
            record.result,
        )
    }
}
