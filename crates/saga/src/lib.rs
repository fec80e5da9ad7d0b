//! In-process saga orchestration engine.
//!
//! A saga is an ordered list of steps, each pairing a forward action with a
//! compensating action. The orchestrator runs steps strictly in order,
//! retrying transient failures with exponential backoff and enforcing
//! per-step deadlines. When a step fails terminally, the steps that already
//! completed are compensated in reverse order.
//!
//! Every saga ends in one of three terminal statuses:
//! - `COMPLETED`: every step succeeded
//! - `COMPENSATED`: a step failed and every completed step was rolled back
//! - `FAILED`: a step failed and at least one compensation failed too
//!
//! Step lifecycle events are kept in a bounded, process-wide audit log.

pub mod audit;
pub mod compensator;
pub mod config;
pub mod definition;
pub mod error;
pub mod events;
pub mod executor;
pub mod instance;
pub mod monitoring;
pub mod orchestrator;
pub mod state;
pub mod step;

pub use audit::{AuditAction, AuditLog, AuditLogEntry};
pub use compensator::{CompensationOutcome, Compensator};
pub use config::OrchestratorConfig;
pub use definition::SagaDefinition;
pub use error::{CompensationError, Result, SagaError, StepError, TerminalStepError};
pub use events::{EventPublisher, InMemoryEventPublisher, SagaEvent, SagaEventType};
pub use executor::{ExecutionScope, StepExecutor};
pub use instance::{SagaInstance, StepDescriptor};
pub use monitoring::{
    Alert, AlertSeverity, AlertSink, InMemoryMonitor, MetricsSink, PrometheusMetricsSink,
    RecordedMetric,
};
pub use orchestrator::SagaOrchestrator;
pub use state::SagaStatus;
pub use step::{CompensationContext, SagaStep, StepContext, StepPolicy};

pub use common::{Metadata, SagaId};
