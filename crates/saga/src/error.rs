//! Saga error types.
//!
//! Step-level errors ([`StepError`], [`TerminalStepError`], [`CompensationError`])
//! are absorbed by the engine and turned into saga state. Only [`SagaError`]
//! ever reaches the caller, and only for mistakes in how the engine is used.

use std::time::Duration;

use common::SagaId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single failed attempt of a step action or compensation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum StepError {
    /// The action itself rejected.
    #[error("step execution failed: {0}")]
    Execution(String),

    /// The action did not resolve before its deadline.
    #[error("step timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

impl StepError {
    /// Creates an execution error from any displayable reason.
    pub fn execution(reason: impl Into<String>) -> Self {
        StepError::Execution(reason.into())
    }

    /// Returns true if this error came from an expired deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, StepError::Timeout(_))
    }
}

/// A step that exhausted its attempts. Triggers compensation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("step '{step_id}' failed after {attempts} attempt(s): {source}")]
pub struct TerminalStepError {
    /// The step that failed.
    pub step_id: String,
    /// How many attempts were made before giving up.
    pub attempts: u32,
    /// The last observed attempt error.
    #[source]
    pub source: StepError,
}

/// A compensation that failed. Logged and alerted, never fatal to the rollback.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("compensation for step '{step_id}' failed: {source}")]
pub struct CompensationError {
    /// The step whose compensation failed.
    pub step_id: String,
    /// The underlying failure.
    #[source]
    pub source: StepError,
}

/// Errors returned to callers of the orchestrator.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Two steps in one definition share an id.
    #[error("Duplicate step id in saga definition: {0}")]
    DuplicateStepId(String),

    /// The definition is malformed.
    #[error("Invalid saga definition: {0}")]
    InvalidDefinition(String),

    /// No saga with this id is held by the orchestrator.
    #[error("Saga not found: {0}")]
    NotFound(SagaId),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_error_display() {
        assert_eq!(
            StepError::execution("card declined").to_string(),
            "step execution failed: card declined"
        );
        assert_eq!(
            StepError::Timeout(Duration::from_millis(50)).to_string(),
            "step timed out after 50ms"
        );
    }

    #[test]
    fn test_terminal_error_keeps_source() {
        let err = TerminalStepError {
            step_id: "take-payment".to_string(),
            attempts: 3,
            source: StepError::Timeout(Duration::from_millis(250)),
        };
        assert_eq!(
            err.to_string(),
            "step 'take-payment' failed after 3 attempt(s): step timed out after 250ms"
        );
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "step timed out after 250ms");
    }

    #[test]
    fn test_step_error_serialization() {
        let err = StepError::execution("boom");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "execution");
        assert_eq!(json["detail"], "boom");
        let back: StepError = serde_json::from_value(json).unwrap();
        assert_eq!(back, err);
    }
}
