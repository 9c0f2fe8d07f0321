//! Error types for the rating engine
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application. Typed failures are raised as [`RatingError`] and
//! callers classify them with `downcast_ref`.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific rating scenarios
#[derive(Debug, thiserror::Error)]
pub enum RatingError {
    #[error("Snapshot not found: {location}")]
    MissingStore { location: String },

    #[error("Malformed record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("Invalid match result: {label} (expected win_a, win_b or draw)")]
    InvalidResult { label: String },

    #[error("Unknown competitor: {competitor}")]
    UnknownCompetitor { competitor: String },

    #[error("Pool not found: {pool}")]
    PoolNotFound { pool: String },

    #[error("Failed to persist snapshot to {location}: {source}")]
    PersistenceFailed {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Calibration failed: {reason}")]
    CalibrationFailed { reason: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl RatingError {
    /// Whether this error only affects a single input record.
    ///
    /// Batch ingestion skips these and carries on; anything else aborts.
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            RatingError::MalformedRecord { .. } | RatingError::InvalidResult { .. }
        )
    }
}

/// Check whether an `anyhow` error wraps a record-level [`RatingError`]
pub fn is_record_level(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<RatingError>()
        .map(RatingError::is_record_level)
        .unwrap_or(false)
}
