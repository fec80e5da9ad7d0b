//! Saga lifecycle events and the optional publisher they are sent to.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Metadata, SagaId};
use serde::{Deserialize, Serialize};

use crate::instance::SagaInstance;
use crate::state::SagaStatus;

/// Kinds of saga-level transitions that are published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SagaEventType {
    #[serde(rename = "saga.started")]
    SagaStarted,
    #[serde(rename = "step.completed")]
    StepCompleted,
    #[serde(rename = "saga.completed")]
    SagaCompleted,
    #[serde(rename = "saga.failed")]
    SagaFailed,
    #[serde(rename = "saga.compensated")]
    SagaCompensated,
}

impl SagaEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaEventType::SagaStarted => "saga.started",
            SagaEventType::StepCompleted => "step.completed",
            SagaEventType::SagaCompleted => "saga.completed",
            SagaEventType::SagaFailed => "saga.failed",
            SagaEventType::SagaCompensated => "saga.compensated",
        }
    }
}

impl std::fmt::Display for SagaEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A published saga transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaEvent {
    pub event_type: SagaEventType,
    pub saga_id: SagaId,
    pub saga_name: String,
    pub status: SagaStatus,
    /// The step involved, for step-level events and failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    pub metadata: Metadata,
    pub timestamp: DateTime<Utc>,
}

impl SagaEvent {
    /// Snapshots `saga` into an event of the given type.
    pub fn from_instance(event_type: SagaEventType, saga: &SagaInstance) -> Self {
        SagaEvent {
            event_type,
            saga_id: saga.id(),
            saga_name: saga.name().to_string(),
            status: saga.status(),
            step_id: None,
            metadata: saga.metadata().clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_step(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }
}

/// Receives saga lifecycle events.
///
/// Publishing is best-effort: implementations swallow their own failures.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: SagaEvent);
}

/// In-memory publisher for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventPublisher {
    events: Arc<RwLock<Vec<SagaEvent>>>,
}

impl InMemoryEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every event published so far.
    pub fn events(&self) -> Vec<SagaEvent> {
        self.events.read().unwrap().clone()
    }

    /// Returns the events published for one saga, in order.
    pub fn events_for(&self, saga_id: SagaId) -> Vec<SagaEvent> {
        self.events
            .read()
            .unwrap()
            .iter()
            .filter(|e| e.saga_id == saga_id)
            .cloned()
            .collect()
    }

    /// Returns the event types published for one saga, in order.
    pub fn event_types_for(&self, saga_id: SagaId) -> Vec<SagaEventType> {
        self.events_for(saga_id)
            .into_iter()
            .map(|e| e.event_type)
            .collect()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventPublisher {
    async fn publish(&self, event: SagaEvent) {
        self.events.write().unwrap().push(event);
    }
}
