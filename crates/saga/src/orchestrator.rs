//! Saga orchestrator: drives instances step by step and rolls back on failure.

use std::collections::HashMap;
use std::sync::Arc;

use common::{Metadata, SagaId};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::audit::{AuditLog, AuditLogEntry};
use crate::compensator::Compensator;
use crate::config::OrchestratorConfig;
use crate::definition::SagaDefinition;
use crate::error::{Result, SagaError};
use crate::events::{EventPublisher, SagaEvent, SagaEventType};
use crate::executor::{ExecutionScope, StepExecutor};
use crate::instance::SagaInstance;
use crate::monitoring::{
    AlertSink, METRIC_SAGA_COMPLETED, METRIC_SAGA_DURATION_MS, METRIC_SAGA_FAILED, MetricsSink,
};
use crate::step::SagaStep;

/// Creates and drives saga instances.
///
/// Each call to [`run`](Self::run) executes one saga to a terminal status on
/// the calling task. Clones share the live registry and the audit log, so
/// independent sagas may run concurrently from spawned tasks.
#[derive(Clone)]
pub struct SagaOrchestrator {
    config: OrchestratorConfig,
    audit: AuditLog,
    registry: Arc<RwLock<HashMap<SagaId, SagaInstance>>>,
    executor: StepExecutor,
    events: Option<Arc<dyn EventPublisher>>,
    metrics: Option<Arc<dyn MetricsSink>>,
    alerts: Option<Arc<dyn AlertSink>>,
}

impl Default for SagaOrchestrator {
    fn default() -> Self {
        Self::new(OrchestratorConfig::default())
    }
}

impl SagaOrchestrator {
    /// Creates an orchestrator with no optional collaborators attached.
    pub fn new(config: OrchestratorConfig) -> Self {
        let audit = AuditLog::with_capacity(config.audit_log_capacity);
        Self::with_audit_log(config, audit)
    }

    /// Creates an orchestrator that appends to an existing audit log.
    pub fn with_audit_log(config: OrchestratorConfig, audit: AuditLog) -> Self {
        let executor = StepExecutor::new(audit.clone(), config.retry_base_delay);
        Self {
            config,
            audit,
            registry: Arc::new(RwLock::new(HashMap::new())),
            executor,
            events: None,
            metrics: None,
            alerts: None,
        }
    }

    pub fn with_event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(publisher);
        self
    }

    pub fn with_metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    pub fn with_alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some(sink);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    /// Runs `steps` in order with a null initial context.
    pub async fn run(
        &self,
        name: &str,
        steps: Vec<Arc<dyn SagaStep>>,
        metadata: Metadata,
    ) -> Result<SagaInstance> {
        self.run_with_input(name, steps, Value::Null, metadata)
            .await
    }

    /// Runs `steps` in order, handing `input` to the first step.
    pub async fn run_with_input(
        &self,
        name: &str,
        steps: Vec<Arc<dyn SagaStep>>,
        input: Value,
        metadata: Metadata,
    ) -> Result<SagaInstance> {
        let definition = SagaDefinition::from_steps(name, steps);
        self.run_definition(&definition, input, metadata).await
    }

    /// Executes a saga to a terminal status and returns the final instance.
    ///
    /// Step and compensation failures never surface as `Err`; they are
    /// reflected in the returned instance's status and error. `Err` is
    /// only returned for an invalid definition, before anything runs.
    #[tracing::instrument(
        skip_all,
        fields(saga_name = %definition.name(), saga_id = tracing::field::Empty)
    )]
    pub async fn run_definition(
        &self,
        definition: &SagaDefinition,
        input: Value,
        metadata: Metadata,
    ) -> Result<SagaInstance> {
        definition.validate()?;

        let saga_start = std::time::Instant::now();
        let mut saga = SagaInstance::new(definition.name(), definition.steps(), metadata);
        tracing::Span::current().record("saga_id", tracing::field::display(saga.id()));

        saga.start();
        self.store(&saga).await;
        self.publish(SagaEvent::from_instance(SagaEventType::SagaStarted, &saga))
            .await;
        tracing::info!(steps = definition.len(), "saga started");

        let scope = ExecutionScope {
            saga_id: saga.id(),
            saga_name: saga.name().to_string(),
            metadata: saga.metadata().clone(),
        };

        let mut context = input;
        let mut failure = None;
        for step in definition.steps() {
            saga.begin_step(step.id());
            self.store(&saga).await;
            tracing::info!(step_id = step.id(), step_name = step.name(), "saga step started");

            match self.executor.execute_step(&scope, step, &context).await {
                Ok(result) => {
                    saga.record_step(step.id(), result.clone());
                    context = result;
                    self.store(&saga).await;
                    self.publish(
                        SagaEvent::from_instance(SagaEventType::StepCompleted, &saga)
                            .with_step(step.id()),
                    )
                    .await;
                }
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        match failure {
            None => {
                saga.complete(context);
                let duration_ms = saga_start.elapsed().as_secs_f64() * 1000.0;
                self.store(&saga).await;
                self.publish(SagaEvent::from_instance(SagaEventType::SagaCompleted, &saga))
                    .await;
                self.record_metric(METRIC_SAGA_COMPLETED, 1.0, &[("saga", saga.name())]);
                self.record_metric(
                    METRIC_SAGA_DURATION_MS,
                    duration_ms,
                    &[("saga", saga.name()), ("outcome", "completed")],
                );
                tracing::info!(duration_ms, "saga completed successfully");
            }
            Some(err) => {
                tracing::warn!(failed_step = %err.step_id, error = %err, "saga step failed, compensating");
                saga.fail(err.clone());
                self.store(&saga).await;
                self.publish(
                    SagaEvent::from_instance(SagaEventType::SagaFailed, &saga)
                        .with_step(err.step_id.clone()),
                )
                .await;

                let compensator = Compensator::new(self.audit.clone(), self.alerts.clone());
                let outcome = compensator
                    .compensate(
                        &scope,
                        definition.steps(),
                        saga.completed_steps(),
                        saga.step_results(),
                        &err,
                    )
                    .await;
                saga.finish_compensation(outcome);
                self.store(&saga).await;
                self.publish(
                    SagaEvent::from_instance(SagaEventType::SagaCompensated, &saga)
                        .with_step(err.step_id.clone()),
                )
                .await;

                let duration_ms = saga_start.elapsed().as_secs_f64() * 1000.0;
                self.record_metric(
                    METRIC_SAGA_FAILED,
                    1.0,
                    &[("saga", saga.name()), ("failed_step", err.step_id.as_str())],
                );
                self.record_metric(
                    METRIC_SAGA_DURATION_MS,
                    duration_ms,
                    &[("saga", saga.name()), ("outcome", saga.status().as_str())],
                );
                tracing::warn!(
                    status = %saga.status(),
                    compensated = saga.compensated_steps().len(),
                    compensation_failures = saga.compensation_failures().len(),
                    duration_ms,
                    "saga rolled back"
                );
            }
        }

        if !self.config.retain_terminal_sagas {
            self.registry.write().await.remove(&saga.id());
        }

        Ok(saga)
    }

    /// Looks up a saga in the live registry.
    pub async fn get_saga(&self, saga_id: SagaId) -> Option<SagaInstance> {
        self.registry.read().await.get(&saga_id).cloned()
    }

    /// Like [`get_saga`](Self::get_saga) but reports a missing saga as an error.
    pub async fn require_saga(&self, saga_id: SagaId) -> Result<SagaInstance> {
        self.get_saga(saga_id)
            .await
            .ok_or(SagaError::NotFound(saga_id))
    }

    /// Returns the retained audit entries for a saga, in emission order.
    ///
    /// Entries outlive registry removal but are subject to the audit log's
    /// retention limit.
    pub async fn get_saga_logs(&self, saga_id: SagaId) -> Vec<AuditLogEntry> {
        self.audit.query(saga_id).await
    }

    /// Returns a snapshot of every saga in the live registry.
    pub async fn list_sagas(&self) -> Vec<SagaInstance> {
        let mut sagas: Vec<_> = self.registry.read().await.values().cloned().collect();
        sagas.sort_by_key(|s| s.started_at());
        sagas
    }

    /// Removes a saga from the live registry. Its audit entries are kept.
    pub async fn remove_saga(&self, saga_id: SagaId) -> Option<SagaInstance> {
        self.registry.write().await.remove(&saga_id)
    }

    /// Removes every terminal saga from the live registry.
    pub async fn prune_terminal(&self) -> usize {
        let mut registry = self.registry.write().await;
        let before = registry.len();
        registry.retain(|_, saga| !saga.is_terminal());
        let pruned = before - registry.len();
        if pruned > 0 {
            tracing::debug!(pruned, "pruned terminal sagas from registry");
        }
        pruned
    }

    async fn store(&self, saga: &SagaInstance) {
        self.registry
            .write()
            .await
            .insert(saga.id(), saga.clone());
    }

    async fn publish(&self, event: SagaEvent) {
        if let Some(events) = &self.events {
            events.publish(event).await;
        }
    }

    fn record_metric(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        if let Some(metrics) = &self.metrics {
            metrics.record_metric(name, value, tags);
        }
    }
}
