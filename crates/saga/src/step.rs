//! Step capability trait and execution policy.

use std::time::Duration;

use async_trait::async_trait;
use common::{Metadata, SagaId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StepError;

/// Retry and deadline policy for a single step.
///
/// The default is one attempt with no deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StepPolicy {
    /// Whether failed attempts may be retried.
    pub retryable: bool,
    /// Extra attempts allowed after the first one. Ignored unless `retryable`.
    pub max_retries: u32,
    /// Per-attempt deadline. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl StepPolicy {
    /// A policy that retries up to `max_retries` times after the first attempt.
    pub fn retrying(max_retries: u32) -> Self {
        Self {
            retryable: true,
            max_retries,
            timeout: None,
        }
    }

    /// Adds a per-attempt deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Total number of attempts this policy permits.
    pub fn attempts(&self) -> u32 {
        if self.retryable {
            self.max_retries.saturating_add(1)
        } else {
            1
        }
    }
}

/// Input handed to a step's forward action.
#[derive(Debug, Clone)]
pub struct StepContext {
    /// The saga this step belongs to.
    pub saga_id: SagaId,
    /// Name of the saga definition.
    pub saga_name: String,
    /// The step being executed.
    pub step_id: String,
    /// Zero-indexed attempt number.
    pub attempt: u32,
    /// Result of the previous step, or the run input for the first step.
    pub input: Value,
    /// Caller-supplied metadata for the saga.
    pub metadata: Metadata,
}

/// Input handed to a step's compensation.
#[derive(Debug, Clone)]
pub struct CompensationContext {
    /// The saga being rolled back.
    pub saga_id: SagaId,
    /// The step being compensated.
    pub step_id: String,
    /// What the step's forward action produced, if it ever ran to completion.
    pub result: Option<Value>,
    /// Description of the failure that triggered the rollback.
    pub error: String,
    /// Caller-supplied metadata for the saga.
    pub metadata: Metadata,
}

/// A unit of work with a forward action and a compensating action.
///
/// Implementations are supplied by the caller and are opaque to the engine.
/// Results flow between steps explicitly through [`StepContext::input`]
/// rather than through shared state.
#[async_trait]
pub trait SagaStep: Send + Sync {
    /// Identifier, unique within one saga definition.
    fn id(&self) -> &str;

    /// Human-readable name for logs. Defaults to the id.
    fn name(&self) -> &str {
        self.id()
    }

    /// Retry and timeout policy for both execution and compensation.
    fn policy(&self) -> StepPolicy {
        StepPolicy::default()
    }

    /// Runs the forward action.
    async fn execute(&self, ctx: &StepContext) -> Result<Value, StepError>;

    /// Undoes the forward action's effects.
    ///
    /// The default implementation is a no-op, suitable for read-only steps.
    async fn compensate(&self, ctx: &CompensationContext) -> Result<(), StepError> {
        let _ = ctx;
        Ok(())
    }
}
