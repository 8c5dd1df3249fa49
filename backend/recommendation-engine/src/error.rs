use thiserror::Error;

use crate::models::SignalSource;

pub type Result<T> = std::result::Result<T, RecommendError>;

/// Error taxonomy of the recommendation engine.
///
/// Only `InputError` ever escapes `recommend`; the other variants are
/// resolved locally (zero weight, empty signal, fallback config, old model).
#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("Invalid input: {0}")]
    InputError(String),

    #[error("Signal source {signal} unavailable: {reason}")]
    SourceUnavailable {
        signal: SignalSource,
        reason: String,
    },

    #[error("Learner {0} has no interaction history")]
    ColdStart(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Training failed: {0}")]
    TrainingError(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RecommendError {
    /// Whether the error must be surfaced to the caller of `recommend`
    pub fn is_fatal(&self) -> bool {
        matches!(self, RecommendError::InputError(_))
    }
}

impl From<serde_json::Error> for RecommendError {
    fn from(err: serde_json::Error) -> Self {
        RecommendError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for RecommendError {
    fn from(err: config::ConfigError) -> Self {
        RecommendError::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_input_errors_are_fatal() {
        assert!(RecommendError::InputError("bad".into()).is_fatal());
        assert!(!RecommendError::ColdStart("u1".into()).is_fatal());
        assert!(!RecommendError::SourceUnavailable {
            signal: SignalSource::Advisory,
            reason: "timeout".into(),
        }
        .is_fatal());
        assert!(!RecommendError::TrainingError("nan".into()).is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = RecommendError::SourceUnavailable {
            signal: SignalSource::ContentBased,
            reason: "timed out after 50ms".into(),
        };
        assert_eq!(
            err.to_string(),
            "Signal source content_based unavailable: timed out after 50ms"
        );
    }
}
