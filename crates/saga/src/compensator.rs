//! Reverse-order rollback of completed steps.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Value, json};

use crate::audit::{AuditAction, AuditLog, AuditLogEntry};
use crate::error::{CompensationError, StepError, TerminalStepError};
use crate::executor::{ExecutionScope, with_deadline};
use crate::monitoring::{ALERT_COMPENSATION_FAILED, Alert, AlertSeverity, AlertSink};
use crate::step::{CompensationContext, SagaStep};

/// What a rollback achieved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompensationOutcome {
    /// Steps whose compensation succeeded, in the order they were compensated.
    pub compensated: Vec<String>,
    /// Compensations that failed, in the order they were attempted.
    pub failures: Vec<CompensationError>,
}

impl CompensationOutcome {
    /// True when every completed step was compensated.
    pub fn is_complete(&self, completed: usize) -> bool {
        self.failures.is_empty() && self.compensated.len() == completed
    }
}

/// Invokes compensations for completed steps, most recent first.
///
/// A failing compensation is logged and alerted but never stops the
/// rollback of earlier steps. Compensations are never retried; a step's
/// timeout still applies.
#[derive(Clone)]
pub struct Compensator {
    audit: AuditLog,
    alerts: Option<Arc<dyn AlertSink>>,
}

impl Compensator {
    pub fn new(audit: AuditLog, alerts: Option<Arc<dyn AlertSink>>) -> Self {
        Self { audit, alerts }
    }

    #[tracing::instrument(
        skip_all,
        fields(saga_id = %scope.saga_id, failed_step = %error.step_id, completed = completed.len())
    )]
    pub async fn compensate(
        &self,
        scope: &ExecutionScope,
        steps: &[Arc<dyn SagaStep>],
        completed: &[String],
        results: &BTreeMap<String, Value>,
        error: &TerminalStepError,
    ) -> CompensationOutcome {
        let mut outcome = CompensationOutcome::default();

        for step_id in completed.iter().rev() {
            self.audit
                .append(AuditLogEntry::new(
                    scope.saga_id,
                    step_id,
                    AuditAction::CompensateStart,
                ))
                .await;

            let result = match steps.iter().find(|s| s.id() == step_id.as_str()) {
                Some(step) => self.run_one(scope, step, results.get(step_id), error).await,
                None => Err(StepError::execution("step is not part of the definition")),
            };

            match result {
                Ok(()) => {
                    self.audit
                        .append(AuditLogEntry::new(
                            scope.saga_id,
                            step_id,
                            AuditAction::CompensateComplete,
                        ))
                        .await;
                    tracing::info!(step_id = %step_id, "step compensated");
                    outcome.compensated.push(step_id.clone());
                }
                Err(source) => {
                    let failure = CompensationError {
                        step_id: step_id.clone(),
                        source,
                    };
                    self.audit
                        .append(
                            AuditLogEntry::new(scope.saga_id, step_id, AuditAction::Fail)
                                .with_error(&failure),
                        )
                        .await;
                    tracing::error!(step_id = %step_id, error = %failure, "compensation failed, continuing rollback");
                    self.raise_alert(scope, &failure).await;
                    outcome.failures.push(failure);
                }
            }
        }

        outcome
    }

    async fn run_one(
        &self,
        scope: &ExecutionScope,
        step: &Arc<dyn SagaStep>,
        result: Option<&Value>,
        error: &TerminalStepError,
    ) -> Result<(), StepError> {
        let ctx = CompensationContext {
            saga_id: scope.saga_id,
            step_id: step.id().to_string(),
            result: result.cloned(),
            error: error.to_string(),
            metadata: scope.metadata.clone(),
        };
        let runner = Arc::clone(step);
        with_deadline(
            async move { runner.compensate(&ctx).await },
            step.policy().timeout,
        )
        .await
    }

    async fn raise_alert(&self, scope: &ExecutionScope, failure: &CompensationError) {
        let Some(alerts) = &self.alerts else {
            return;
        };
        alerts
            .create_alert(Alert {
                alert_type: ALERT_COMPENSATION_FAILED.to_string(),
                severity: AlertSeverity::Critical,
                message: format!(
                    "Saga '{}' ({}) could not compensate step '{}'",
                    scope.saga_name, scope.saga_id, failure.step_id
                ),
                details: json!({
                    "saga_id": scope.saga_id,
                    "saga_name": scope.saga_name,
                    "step_id": failure.step_id,
                    "error": failure.source.to_string(),
                    "metadata": scope.metadata,
                }),
            })
            .await;
    }
}
