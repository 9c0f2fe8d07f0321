//! Common types used throughout the rating engine

use crate::error::RatingError;
use serde::{Deserialize, Serialize};
use skillratings::Outcomes;
use std::str::FromStr;

/// Competitor identity. The name is the only key.
pub type CompetitorId = String;

/// Rating assigned to a competitor on first reference
pub const DEFAULT_RATING: f64 = 1500.0;

/// Outcome of a match from the point of view of competitor A
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchResult {
    WinA,
    WinB,
    Draw,
}

impl MatchResult {
    /// Actual scores `(s_a, s_b)` for this result
    pub fn scores(self) -> (f64, f64) {
        match self {
            MatchResult::WinA => (1.0, 0.0),
            MatchResult::WinB => (0.0, 1.0),
            MatchResult::Draw => (0.5, 0.5),
        }
    }

    /// Label used in match files and on the command line
    pub fn label(self) -> &'static str {
        match self {
            MatchResult::WinA => "win_a",
            MatchResult::WinB => "win_b",
            MatchResult::Draw => "draw",
        }
    }

    /// Classify a pair of expected scores, calling it a draw only on an exact tie
    pub fn from_expectation(expected_a: f64, expected_b: f64) -> Self {
        if expected_a > expected_b {
            MatchResult::WinA
        } else if expected_b > expected_a {
            MatchResult::WinB
        } else {
            MatchResult::Draw
        }
    }
}

impl From<MatchResult> for Outcomes {
    fn from(result: MatchResult) -> Self {
        match result {
            MatchResult::WinA => Outcomes::WIN,
            MatchResult::WinB => Outcomes::LOSS,
            MatchResult::Draw => Outcomes::DRAW,
        }
    }
}

impl FromStr for MatchResult {
    type Err = RatingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "win_a" => Ok(MatchResult::WinA),
            "win_b" => Ok(MatchResult::WinB),
            "draw" => Ok(MatchResult::Draw),
            other => Err(RatingError::InvalidResult {
                label: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for MatchResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A single observed match, the unit of work the engine consumes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub competitor_a: CompetitorId,
    pub competitor_b: CompetitorId,
    pub result: MatchResult,
}

impl MatchRecord {
    pub fn new(
        competitor_a: impl Into<CompetitorId>,
        competitor_b: impl Into<CompetitorId>,
        result: MatchResult,
    ) -> Self {
        Self {
            competitor_a: competitor_a.into(),
            competitor_b: competitor_b.into(),
            result,
        }
    }

    /// Same record with both names in canonical form.
    ///
    /// Fails with `MalformedRecord` when either name is blank.
    pub fn canonical(&self) -> Result<Self, RatingError> {
        Ok(Self {
            competitor_a: require_name(&self.competitor_a)?,
            competitor_b: require_name(&self.competitor_b)?,
            result: self.result,
        })
    }
}

/// Canonical form of a competitor name: trimmed, with inner whitespace runs
/// collapsed to a single space. `None` when nothing is left.
///
/// Snapshots split on whitespace, so only canonical names survive a reload.
pub fn canonical_name(name: &str) -> Option<CompetitorId> {
    let canonical = name.split_whitespace().collect::<Vec<_>>().join(" ");
    (!canonical.is_empty()).then_some(canonical)
}

/// Canonical name, or `MalformedRecord` for a blank one
pub fn require_name(name: &str) -> Result<CompetitorId, RatingError> {
    canonical_name(name).ok_or_else(|| RatingError::MalformedRecord {
        line: 0,
        reason: format!("blank competitor name '{}'", name),
    })
}

/// Rating information for a competitor within one pool
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingState {
    pub rating: f64,
    pub matches_played: u32,
}

impl RatingState {
    pub fn new(rating: f64) -> Self {
        Self {
            rating,
            matches_played: 0,
        }
    }
}

impl Default for RatingState {
    fn default() -> Self {
        Self::new(DEFAULT_RATING)
    }
}

/// Rating change for one side of a match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingChange {
    pub competitor: CompetitorId,
    pub old: RatingState,
    pub new: RatingState,
}

impl RatingChange {
    /// Signed rating movement
    pub fn delta(&self) -> f64 {
        self.new.rating - self.old.rating
    }
}

/// Everything that changed when a match was applied to a pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchUpdate {
    pub record: MatchRecord,
    pub rating_a: RatingChange,
    pub rating_b: RatingChange,
    /// Form deltas pushed for each side, absent when the pool has no form tracking
    pub form_delta_a: Option<f64>,
    pub form_delta_b: Option<f64>,
}

/// Three-way outcome distribution for a fixture
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub win_a: f64,
    pub draw: f64,
    pub win_b: f64,
}

impl PredictionResult {
    pub fn total(&self) -> f64 {
        self.win_a + self.draw + self.win_b
    }

    /// Most likely outcome, ties resolved toward the draw
    pub fn most_likely(&self) -> MatchResult {
        if self.win_a > self.draw && self.win_a > self.win_b {
            MatchResult::WinA
        } else if self.win_b > self.draw && self.win_b > self.win_a {
            MatchResult::WinB
        } else {
            MatchResult::Draw
        }
    }
}

/// One row of the standings table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    pub rank: usize,
    pub competitor: CompetitorId,
    pub rating: f64,
    pub matches_played: u32,
}

/// One row of the recent form table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormEntry {
    pub competitor: CompetitorId,
    pub aggregate: f64,
    pub history: Vec<f64>,
}
