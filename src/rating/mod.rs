//! Elo rating storage and update rules
//!
//! This module provides the per-pool rating store, its snapshot backends, and
//! the Elo engine built on the skillratings crate.

pub mod elo;
pub mod storage;

// Re-export commonly used types
pub use elo::{EloEngine, EloUpdate, DEFAULT_K_FACTOR};
pub use storage::{FileSnapshot, InMemorySnapshot, RatingStore, SnapshotBackend};
