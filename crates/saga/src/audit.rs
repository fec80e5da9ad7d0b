//! Bounded, process-wide audit log of step lifecycle events.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::SagaId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

/// Default number of entries kept before the oldest half is discarded.
pub const DEFAULT_AUDIT_LOG_CAPACITY: usize = 10_000;

/// Lifecycle action recorded for a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Start,
    Complete,
    Fail,
    CompensateStart,
    CompensateComplete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Start => "start",
            AuditAction::Complete => "complete",
            AuditAction::Fail => "fail",
            AuditAction::CompensateStart => "compensate_start",
            AuditAction::CompensateComplete => "compensate_complete",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub saga_id: SagaId,
    pub step_id: String,
    pub action: AuditAction,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditLogEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(saga_id: SagaId, step_id: impl Into<String>, action: AuditAction) -> Self {
        Self {
            saga_id,
            step_id: step_id.into(),
            action,
            timestamp: Utc::now(),
            data: None,
            error: None,
        }
    }

    /// Attaches a payload (usually the step result).
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Attaches an error description.
    pub fn with_error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// Size-bounded audit buffer shared by every saga in the process.
///
/// When an append pushes the buffer past its capacity, the oldest half is
/// discarded in a single drain. Entries outlive the saga instances they
/// describe, subject to that retention limit.
#[derive(Debug, Clone)]
pub struct AuditLog {
    entries: Arc<RwLock<VecDeque<AuditLogEntry>>>,
    capacity: usize,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_AUDIT_LOG_CAPACITY)
    }
}

impl AuditLog {
    /// Creates a log with the default capacity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a log that holds at most `capacity` entries (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Arc::new(RwLock::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends an entry, halving the buffer if it grew past capacity.
    pub async fn append(&self, entry: AuditLogEntry) {
        let mut entries = self.entries.write().await;
        entries.push_back(entry);

        if entries.len() > self.capacity {
            let dropped = entries.len() / 2;
            entries.drain(..dropped);
            tracing::debug!(
                dropped,
                retained = entries.len(),
                "audit log truncated"
            );
        }
    }

    /// Returns every retained entry for a saga, in insertion order.
    pub async fn query(&self, saga_id: SagaId) -> Vec<AuditLogEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.saga_id == saga_id)
            .cloned()
            .collect()
    }

    /// Returns the number of retained entries across all sagas.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_query_filters_by_saga_in_insertion_order() {
        let log = AuditLog::new();
        let a = SagaId::new();
        let b = SagaId::new();

        log.append(AuditLogEntry::new(a, "s1", AuditAction::Start)).await;
        log.append(AuditLogEntry::new(b, "s1", AuditAction::Start)).await;
        log.append(
            AuditLogEntry::new(a, "s1", AuditAction::Complete).with_data(serde_json::json!(1)),
        )
        .await;

        let entries = log.query(a).await;
        let actions: Vec<_> = entries.iter().map(|e| e.action).collect();
        assert_eq!(actions, [AuditAction::Start, AuditAction::Complete]);
        assert_eq!(entries[1].data, Some(serde_json::json!(1)));
        assert_eq!(log.query(b).await.len(), 1);
        assert!(log.query(SagaId::new()).await.is_empty());
    }

    #[tokio::test]
    async fn test_no_truncation_at_capacity() {
        let log = AuditLog::with_capacity(4);
        let id = SagaId::new();
        for i in 0..4 {
            log.append(AuditLogEntry::new(id, format!("s{i}"), AuditAction::Start))
                .await;
        }
        assert_eq!(log.len().await, 4);
    }

    #[tokio::test]
    async fn test_exceeding_capacity_drops_oldest_half() {
        let log = AuditLog::with_capacity(4);
        let id = SagaId::new();
        for i in 0..5 {
            log.append(AuditLogEntry::new(id, format!("s{i}"), AuditAction::Start))
                .await;
        }

        let entries = log.query(id).await;
        let steps: Vec<_> = entries.iter().map(|e| e.step_id.as_str()).collect();
        assert_eq!(steps, ["s2", "s3", "s4"]);
    }

    #[tokio::test]
    async fn test_busy_log_never_exceeds_capacity() {
        let log = AuditLog::with_capacity(100);
        let id = SagaId::new();
        for i in 0..1_000 {
            log.append(AuditLogEntry::new(id, format!("s{i}"), AuditAction::Start))
                .await;
            assert!(log.len().await <= 100);
        }
        let entries = log.query(id).await;
        assert!(entries.len() <= 100);
        assert_eq!(entries.last().unwrap().step_id, "s999");
    }

    #[tokio::test]
    async fn test_zero_capacity_is_clamped() {
        let log = AuditLog::with_capacity(0);
        assert_eq!(log.capacity(), 1);
        log.append(AuditLogEntry::new(SagaId::new(), "s", AuditAction::Start))
            .await;
        assert_eq!(log.len().await, 1);
    }

    #[tokio::test]
    async fn test_clones_share_the_buffer() {
        let log = AuditLog::new();
        let clone = log.clone();
        clone
            .append(AuditLogEntry::new(SagaId::new(), "s", AuditAction::Fail).with_error("x"))
            .await;
        assert!(!log.is_empty().await);
    }

    #[test]
    fn test_action_serialization() {
        assert_eq!(
            serde_json::to_string(&AuditAction::CompensateComplete).unwrap(),
            "\"compensate_complete\""
        );
        assert_eq!(AuditAction::CompensateStart.to_string(), "compensate_start");
    }
}
