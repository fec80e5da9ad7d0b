//! Run-time record of one saga execution.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{Metadata, SagaId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::compensator::CompensationOutcome;
use crate::error::{CompensationError, TerminalStepError};
use crate::state::SagaStatus;
use crate::step::SagaStep;

/// Identity of a step as recorded on an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDescriptor {
    pub id: String,
    pub name: String,
}

/// A saga execution.
///
/// Tracks status, step progress and outcome. Mutated only by the
/// orchestrator while running; immutable once terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaInstance {
    id: SagaId,
    name: String,
    status: SagaStatus,
    steps: Vec<StepDescriptor>,
    completed_steps: Vec<String>,
    current_step: Option<String>,
    /// Output of each completed step, by step id.
    step_results: BTreeMap<String, Value>,
    /// Final output; set only when the saga completes.
    result: Option<Value>,
    /// The failure that triggered compensation.
    error: Option<TerminalStepError>,
    compensated_steps: Vec<String>,
    compensation_failures: Vec<CompensationError>,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    metadata: Metadata,
}

impl SagaInstance {
    /// Allocates a pending instance for the given steps.
    pub fn new(name: impl Into<String>, steps: &[Arc<dyn SagaStep>], metadata: Metadata) -> Self {
        Self {
            id: SagaId::new(),
            name: name.into(),
            status: SagaStatus::Pending,
            steps: steps
                .iter()
                .map(|s| StepDescriptor {
                    id: s.id().to_string(),
                    name: s.name().to_string(),
                })
                .collect(),
            completed_steps: Vec::new(),
            current_step: None,
            step_results: BTreeMap::new(),
            result: None,
            error: None,
            compensated_steps: Vec::new(),
            compensation_failures: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
            metadata,
        }
    }

    fn transition(&mut self, next: SagaStatus) {
        debug_assert!(
            self.status.can_transition_to(next),
            "illegal saga transition {} -> {}",
            self.status,
            next
        );
        self.status = next;
    }

    pub(crate) fn start(&mut self) {
        self.transition(SagaStatus::Running);
    }

    pub(crate) fn begin_step(&mut self, step_id: &str) {
        self.current_step = Some(step_id.to_string());
    }

    pub(crate) fn record_step(&mut self, step_id: &str, result: Value) {
        self.completed_steps.push(step_id.to_string());
        self.step_results.insert(step_id.to_string(), result);
    }

    pub(crate) fn fail(&mut self, error: TerminalStepError) {
        self.error = Some(error);
        self.transition(SagaStatus::Compensating);
    }

    pub(crate) fn complete(&mut self, result: Value) {
        self.result = Some(result);
        self.current_step = None;
        self.completed_at = Some(Utc::now());
        self.transition(SagaStatus::Completed);
    }

    /// Finalizes after rollback: COMPENSATED only if every completed step was undone.
    pub(crate) fn finish_compensation(&mut self, outcome: CompensationOutcome) {
        let next = if outcome.is_complete(self.completed_steps.len()) {
            SagaStatus::Compensated
        } else {
            SagaStatus::Failed
        };
        self.compensated_steps = outcome.compensated;
        self.compensation_failures = outcome.failures;
        self.completed_at = Some(Utc::now());
        self.transition(next);
    }

    pub(crate) fn step_results(&self) -> &BTreeMap<String, Value> {
        &self.step_results
    }
}

// Query methods
impl SagaInstance {
    pub fn id(&self) -> SagaId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> SagaStatus {
        self.status
    }

    /// Returns true once the saga can no longer change.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns the step descriptors in definition order.
    pub fn steps(&self) -> &[StepDescriptor] {
        &self.steps
    }

    /// Returns the ids of successfully completed steps, in completion order.
    pub fn completed_steps(&self) -> &[String] {
        &self.completed_steps
    }

    /// Returns the step that was executing most recently.
    ///
    /// After a failure this is the step that failed.
    pub fn current_step(&self) -> Option<&str> {
        self.current_step.as_deref()
    }

    /// Returns the output a completed step produced.
    pub fn step_result(&self, step_id: &str) -> Option<&Value> {
        self.step_results.get(step_id)
    }

    /// Returns the final output; present only when COMPLETED.
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Returns the failure that triggered compensation, if any.
    pub fn error(&self) -> Option<&TerminalStepError> {
        self.error.as_ref()
    }

    /// Returns the id of the step whose failure triggered compensation.
    pub fn failed_step(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.step_id.as_str())
    }

    /// Returns the steps whose compensation succeeded, in rollback order.
    pub fn compensated_steps(&self) -> &[String] {
        &self.compensated_steps
    }

    pub fn compensation_failures(&self) -> &[CompensationError] {
        &self.compensation_failures
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Returns how long the saga ran, once it has finished.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|end| end - self.started_at)
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::error::StepError;
    use crate::step::StepContext;

    struct Noop(&'static str);

    #[async_trait]
    impl SagaStep for Noop {
        fn id(&self) -> &str {
            self.0
        }

        fn name(&self) -> &str {
            "No-op"
        }

        async fn execute(&self, _ctx: &StepContext) -> Result<Value, StepError> {
            Ok(Value::Null)
        }
    }

    fn steps() -> Vec<Arc<dyn SagaStep>> {
        vec![Arc::new(Noop("s1")), Arc::new(Noop("s2"))]
    }

    fn failure(step_id: &str) -> TerminalStepError {
        TerminalStepError {
            step_id: step_id.to_string(),
            attempts: 1,
            source: StepError::execution("declined"),
        }
    }

    #[test]
    fn test_new_instance_is_pending() {
        let mut metadata = Metadata::new();
        metadata.insert("course_id".to_string(), json!("c-42"));
        let saga = SagaInstance::new("booking", &steps(), metadata);

        assert_eq!(saga.status(), SagaStatus::Pending);
        assert_eq!(saga.name(), "booking");
        assert_eq!(saga.steps().len(), 2);
        assert_eq!(saga.steps()[0].name, "No-op");
        assert!(saga.completed_steps().is_empty());
        assert!(saga.completed_at().is_none());
        assert_eq!(saga.metadata()["course_id"], json!("c-42"));
    }

    #[test]
    fn test_happy_lifecycle() {
        let mut saga = SagaInstance::new("booking", &steps(), Metadata::new());
        saga.start();
        saga.begin_step("s1");
        saga.record_step("s1", json!(1));
        assert!(saga.result().is_none());

        saga.begin_step("s2");
        saga.record_step("s2", json!(2));
        saga.complete(json!(2));

        assert_eq!(saga.status(), SagaStatus::Completed);
        assert_eq!(saga.completed_steps(), ["s1", "s2"]);
        assert_eq!(saga.result(), Some(&json!(2)));
        assert_eq!(saga.step_result("s1"), Some(&json!(1)));
        assert!(saga.current_step().is_none());
        assert!(saga.duration().is_some());
        assert!(saga.is_terminal());
    }

    #[test]
    fn test_full_compensation_is_compensated() {
        let mut saga = SagaInstance::new("booking", &steps(), Metadata::new());
        saga.start();
        saga.begin_step("s1");
        saga.record_step("s1", json!(1));
        saga.begin_step("s2");
        saga.fail(failure("s2"));
        assert_eq!(saga.status(), SagaStatus::Compensating);
        assert_eq!(saga.current_step(), Some("s2"));

        saga.finish_compensation(CompensationOutcome {
            compensated: vec!["s1".to_string()],
            failures: vec![],
        });
        assert_eq!(saga.status(), SagaStatus::Compensated);
        assert_eq!(saga.failed_step(), Some("s2"));
        assert!(saga.result().is_none());
    }

    #[test]
    fn test_partial_compensation_is_failed() {
        let mut saga = SagaInstance::new("booking", &steps(), Metadata::new());
        saga.start();
        saga.record_step("s1", json!(1));
        saga.fail(failure("s2"));
        saga.finish_compensation(CompensationOutcome {
            compensated: vec![],
            failures: vec![CompensationError {
                step_id: "s1".to_string(),
                source: StepError::execution("refund failed"),
            }],
        });

        assert_eq!(saga.status(), SagaStatus::Failed);
        assert_eq!(saga.compensation_failures().len(), 1);
        assert!(saga.completed_at().is_some());
    }

    #[test]
    fn test_serialization() {
        let mut saga = SagaInstance::new("booking", &steps(), Metadata::new());
        saga.start();
        saga.record_step("s1", json!({"lock": "L-1"}));

        let json = serde_json::to_string(&saga).unwrap();
        let deserialized: SagaInstance = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.id(), saga.id());
        assert_eq!(deserialized.status(), SagaStatus::Running);
        assert_eq!(deserialized.step_result("s1"), Some(&json!({"lock": "L-1"})));
    }
}
