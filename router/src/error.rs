//! Error taxonomy for the routing engine.
//!
//! ```text
//! input         EmptyTask, TaskTooLong, UnsafeContent   → returned to caller
//! collaborator  RegistryUnavailable, AvailabilityCheck  → degraded to 0.5 defaults
//! pipeline      Pipeline, InvalidTierTransition         → breaker failure + fallback
//! feedback      UnknownRequest, FeedbackUnavailable     → returned to reporter
//! ```
//!
//! Cache lock failures never appear here; the cache treats them as misses.

use crate::classifier::Tier;
use crate::config::ConfigError;
use crate::otel::Stage;
use thiserror::Error;
use uuid::Uuid;

pub type RoutingResult<T> = Result<T, RoutingError>;

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("task description is empty")]
    EmptyTask,

    #[error("task description too long: {len} chars (max {max})")]
    TaskTooLong { len: usize, max: usize },

    #[error("task description contains disallowed content: {pattern}")]
    UnsafeContent { pattern: String },

    #[error("capability registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("availability check failed for {worker}: {message}")]
    AvailabilityCheck { worker: String, message: String },

    #[error("{stage} stage failed: {message}")]
    Pipeline { stage: Stage, message: String },

    #[error("invalid tier transition {from} -> {to}")]
    InvalidTierTransition { from: Tier, to: Tier },

    #[error("unknown request id: {0}")]
    UnknownRequest(Uuid),

    #[error("feedback channel unavailable")]
    FeedbackUnavailable,

    #[error("lock poisoned: {0}")]
    LockPoisoned(&'static str),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl RoutingError {
    pub fn pipeline(stage: Stage, message: impl Into<String>) -> Self {
        Self::Pipeline {
            stage,
            message: message.into(),
        }
    }

    /// Input errors fail fast and never count against the circuit breaker.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyTask | Self::TaskTooLong { .. } | Self::UnsafeContent { .. }
        )
    }

    /// Collaborator errors degrade scores instead of aborting the request.
    pub fn is_collaborator_error(&self) -> bool {
        matches!(
            self,
            Self::RegistryUnavailable(_) | Self::AvailabilityCheck { .. }
        )
    }

    /// The stage an error is attributed to when recorded by the breaker.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Pipeline { stage, .. } => Some(*stage),
            Self::InvalidTierTransition { .. } => Some(Stage::Refine),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_errors_classified() {
        assert!(RoutingError::EmptyTask.is_input_error());
        assert!(RoutingError::TaskTooLong { len: 3000, max: 2000 }.is_input_error());
        assert!(!RoutingError::pipeline(Stage::Detect, "boom").is_input_error());
        assert!(!RoutingError::RegistryUnavailable("down".into()).is_input_error());
    }

    #[test]
    fn test_collaborator_errors_classified() {
        assert!(RoutingError::RegistryUnavailable("x".into()).is_collaborator_error());
        assert!(RoutingError::AvailabilityCheck {
            worker: "w".into(),
            message: "timeout".into()
        }
        .is_collaborator_error());
        assert!(!RoutingError::EmptyTask.is_collaborator_error());
    }

    #[test]
    fn test_pipeline_display_names_stage() {
        let err = RoutingError::pipeline(Stage::Confidence, "non-finite total");
        assert_eq!(err.to_string(), "confidence stage failed: non-finite total");
        assert_eq!(err.stage(), Some(Stage::Confidence));
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = RoutingError::InvalidTierTransition {
            from: Tier::StandardConfirmed,
            to: Tier::ComplexRefined,
        };
        assert_eq!(
            err.to_string(),
            "invalid tier transition STANDARD_CONFIRMED -> COMPLEX_REFINED"
        );
    }
}
