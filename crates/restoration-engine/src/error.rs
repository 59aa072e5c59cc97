//! Error types for the restoration engine

use thiserror::Error;

/// Errors that can occur in the restoration engine
#[derive(Error, Debug)]
pub enum RestorationError {
    /// Time-of-day string could not be parsed
    #[error("Invalid time format: {0}")]
    InvalidTimeFormat(String),

    /// Time slot whose start lies after its end
    #[error("Invalid time slot: start {start} is after end {end}")]
    InvalidTimeSlot { start: String, end: String },

    /// Rule configuration rejected at setup
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No rule registered under this entry id
    #[error("Rule not found: {0}")]
    RuleNotFound(String),

    /// External restore/turn-off call failed
    #[error("Action failed: {0}")]
    ActionFailed(String),

    /// IO error (persistence)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RestorationError {
    /// Whether this error was caused by invalid caller input
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidTimeFormat(_) | Self::InvalidTimeSlot { .. } | Self::InvalidConfig(_)
        )
    }
}
