//! Recent form: bounded per-competitor windows of form deltas
//!
//! Form is a short-horizon signal kept alongside the cumulative Elo rating and
//! optionally blended into predictions.

pub mod storage;
pub mod tracker;

pub use tracker::{FormConfig, FormReduction, FormState, FormTracker, FORM_WINDOW};
