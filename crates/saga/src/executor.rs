//! Retry/timeout executor for a single step.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use common::{Metadata, SagaId};
use serde_json::{Value, json};

use crate::audit::{AuditAction, AuditLog, AuditLogEntry};
use crate::error::{StepError, TerminalStepError};
use crate::step::{SagaStep, StepContext};

/// Default base interval for exponential backoff between attempts.
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Runs `fut` on its own task, giving up after `timeout` if one is set.
///
/// A panic inside the task becomes an execution error. When the deadline
/// passes the engine stops waiting but the task is left to finish on its
/// own; its eventual result is discarded.
pub(crate) async fn with_deadline<T, F>(fut: F, timeout: Option<Duration>) -> Result<T, StepError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, StepError>> + Send + 'static,
{
    let handle = tokio::spawn(fut);
    let joined = match timeout {
        Some(limit) => tokio::time::timeout(limit, handle)
            .await
            .map_err(|_| StepError::Timeout(limit))?,
        None => handle.await,
    };

    joined.unwrap_or_else(|join_err| {
        Err(StepError::execution(format!(
            "step task did not complete: {join_err}"
        )))
    })
}

/// Identity of the saga a step runs under.
#[derive(Debug, Clone)]
pub struct ExecutionScope {
    pub saga_id: SagaId,
    pub saga_name: String,
    pub metadata: Metadata,
}

/// Runs one step's forward action with bounded retries and an optional deadline.
#[derive(Debug, Clone)]
pub struct StepExecutor {
    audit: AuditLog,
    base_delay: Duration,
}

impl StepExecutor {
    pub fn new(audit: AuditLog, base_delay: Duration) -> Self {
        Self { audit, base_delay }
    }

    /// Backoff before the retry that follows zero-indexed `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Executes `step` until it succeeds or its attempts are exhausted.
    ///
    /// Emits `start` before every attempt, then `complete` or `fail`.
    /// On exhaustion the last attempt's error is returned as terminal and
    /// nothing further is logged here.
    #[tracing::instrument(
        skip_all,
        fields(saga_id = %scope.saga_id, step_id = %step.id())
    )]
    pub async fn execute_step(
        &self,
        scope: &ExecutionScope,
        step: &Arc<dyn SagaStep>,
        input: &Value,
    ) -> Result<Value, TerminalStepError> {
        let policy = step.policy();
        let attempts = policy.attempts();
        let mut last_error = StepError::execution("step was never attempted");

        for attempt in 0..attempts {
            self.audit
                .append(
                    AuditLogEntry::new(scope.saga_id, step.id(), AuditAction::Start)
                        .with_data(json!({ "attempt": attempt + 1 })),
                )
                .await;
            tracing::debug!(attempt = attempt + 1, attempts, "step attempt started");

            let ctx = StepContext {
                saga_id: scope.saga_id,
                saga_name: scope.saga_name.clone(),
                step_id: step.id().to_string(),
                attempt,
                input: input.clone(),
                metadata: scope.metadata.clone(),
            };
            let runner = Arc::clone(step);
            let outcome =
                with_deadline(async move { runner.execute(&ctx).await }, policy.timeout).await;

            match outcome {
                Ok(result) => {
                    self.audit
                        .append(
                            AuditLogEntry::new(scope.saga_id, step.id(), AuditAction::Complete)
                                .with_data(result.clone()),
                        )
                        .await;
                    tracing::debug!(attempt = attempt + 1, "step attempt succeeded");
                    return Ok(result);
                }
                Err(err) => {
                    self.audit
                        .append(
                            AuditLogEntry::new(scope.saga_id, step.id(), AuditAction::Fail)
                                .with_error(&err),
                        )
                        .await;
                    tracing::warn!(attempt = attempt + 1, attempts, error = %err, "step attempt failed");
                    last_error = err;

                    if attempt + 1 < attempts {
                        let delay = self.backoff(attempt);
                        tracing::info!(delay_ms = delay.as_millis() as u64, "retrying step after backoff");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(TerminalStepError {
            step_id: step.id().to_string(),
            attempts,
            source: last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use tokio::time::Instant;

    use super::*;
    use crate::step::StepPolicy;

    /// Fails the first `failures` attempts, then echoes its input.
    struct Flaky {
        failures: u32,
        policy: StepPolicy,
        calls: AtomicU32,
    }

    impl Flaky {
        fn new(failures: u32, policy: StepPolicy) -> Arc<Self> {
            Arc::new(Self {
                failures,
                policy,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl SagaStep for Flaky {
        fn id(&self) -> &str {
            "flaky"
        }

        fn policy(&self) -> StepPolicy {
            self.policy
        }

        async fn execute(&self, ctx: &StepContext) -> Result<Value, StepError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(call, ctx.attempt);
            if call < self.failures {
                Err(StepError::execution(format!("failure #{call}")))
            } else {
                Ok(ctx.input.clone())
            }
        }
    }

    fn scope() -> ExecutionScope {
        ExecutionScope {
            saga_id: SagaId::new(),
            saga_name: "test".to_string(),
            metadata: Metadata::new(),
        }
    }

    fn executor(audit: &AuditLog) -> StepExecutor {
        StepExecutor::new(audit.clone(), DEFAULT_RETRY_BASE_DELAY)
    }

    #[test]
    fn test_backoff_doubles() {
        let exec = executor(&AuditLog::new());
        assert_eq!(exec.backoff(0), Duration::from_millis(100));
        assert_eq!(exec.backoff(1), Duration::from_millis(200));
        assert_eq!(exec.backoff(2), Duration::from_millis(400));
        assert_eq!(exec.backoff(40), Duration::from_millis(100).saturating_mul(u32::MAX));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_logs_start_and_complete() {
        let audit = AuditLog::new();
        let scope = scope();
        let step: Arc<dyn SagaStep> = Flaky::new(0, StepPolicy::default());

        let result = executor(&audit)
            .execute_step(&scope, &step, &json!({"seat": 4}))
            .await
            .unwrap();
        assert_eq!(result, json!({"seat": 4}));

        let actions: Vec<_> = audit.query(scope.saga_id).await.iter().map(|e| e.action).collect();
        assert_eq!(actions, [AuditAction::Start, AuditAction::Complete]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_fails_once() {
        let audit = AuditLog::new();
        let scope = scope();
        let flaky = Flaky::new(5, StepPolicy::default());
        let step: Arc<dyn SagaStep> = flaky.clone();

        let err = executor(&audit)
            .execute_step(&scope, &step, &Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 1);
        assert_eq!(err.source, StepError::execution("failure #0"));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);

        let actions: Vec<_> = audit.query(scope.saga_id).await.iter().map(|e| e.action).collect();
        assert_eq!(actions, [AuditAction::Start, AuditAction::Fail]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_with_zero_retries_is_single_attempt() {
        let audit = AuditLog::new();
        let flaky = Flaky::new(5, StepPolicy::retrying(0));
        let step: Arc<dyn SagaStep> = flaky.clone();

        let err = executor(&audit)
            .execute_step(&scope(), &step, &Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 1);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_with_exponential_backoff() {
        let audit = AuditLog::new();
        let scope = scope();
        let flaky = Flaky::new(u32::MAX, StepPolicy::retrying(2));
        let step: Arc<dyn SagaStep> = flaky.clone();

        let started = Instant::now();
        let err = executor(&audit)
            .execute_step(&scope, &step, &Value::Null)
            .await
            .unwrap_err();

        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.attempts, 3);
        assert_eq!(err.source, StepError::execution("failure #2"));
        // 100ms + 200ms of backoff, no sleep after the final attempt.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(400), "{elapsed:?}");

        let entries = audit.query(scope.saga_id).await;
        let starts = entries.iter().filter(|e| e.action == AuditAction::Start).count();
        let fails = entries.iter().filter(|e| e.action == AuditAction::Fail).count();
        assert_eq!((starts, fails), (3, 3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_on_later_attempt() {
        let audit = AuditLog::new();
        let flaky = Flaky::new(1, StepPolicy::retrying(3));
        let step: Arc<dyn SagaStep> = flaky.clone();

        let result = executor(&audit)
            .execute_step(&scope(), &step, &json!("ok"))
            .await
            .unwrap();
        assert_eq!(result, json!("ok"));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_stops_waiting() {
        let started = Instant::now();
        let outcome: Result<(), StepError> = with_deadline(
            std::future::pending(),
            Some(Duration::from_millis(50)),
        )
        .await;
        assert_eq!(outcome, Err(StepError::Timeout(Duration::from_millis(50))));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(50), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(60), "{elapsed:?}");
    }

    #[tokio::test]
    async fn test_deadline_passes_through_fast_results() {
        let outcome = with_deadline(async { Ok(7) }, Some(Duration::from_secs(5))).await;
        assert_eq!(outcome, Ok(7));
        let outcome = with_deadline(async { Ok::<_, StepError>(8) }, None).await;
        assert_eq!(outcome, Ok(8));
    }

    #[tokio::test]
    async fn test_panicking_task_becomes_execution_error() {
        let outcome: Result<(), StepError> = with_deadline(
            async {
                if true {
                    panic!("collaborator bug");
                }
                Ok(())
            },
            Some(Duration::from_secs(1)),
        )
        .await;
        assert!(matches!(outcome, Err(StepError::Execution(_))));
    }

    #[tokio::test]
    async fn test_panicking_task_without_deadline_becomes_execution_error() {
        let outcome: Result<(), StepError> = with_deadline(
            async {
                if true {
                    panic!("collaborator bug");
                }
                Ok(())
            },
            None,
        )
        .await;
        assert!(matches!(outcome, Err(StepError::Execution(_))));
    }
}
