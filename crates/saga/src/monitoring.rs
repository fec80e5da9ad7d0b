//! Optional monitoring collaborators: metrics and alerting.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metric recorded when a saga completes.
pub const METRIC_SAGA_COMPLETED: &str = "saga.completed";
/// Metric recorded when a saga fails and is rolled back.
pub const METRIC_SAGA_FAILED: &str = "saga.failed";
/// Wall-clock duration of a saga run, in milliseconds.
pub const METRIC_SAGA_DURATION_MS: &str = "saga.duration_ms";
/// Alert raised when a compensation fails.
pub const ALERT_COMPENSATION_FAILED: &str = "saga.compensation_failed";

/// Receives saga outcome metrics.
pub trait MetricsSink: Send + Sync {
    fn record_metric(&self, name: &str, value: f64, tags: &[(&str, &str)]);
}

/// How urgently an alert needs attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

/// An operator-facing alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_type: String,
    pub severity: AlertSeverity,
    pub message: String,
    pub details: Value,
}

/// Receives operator alerts.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn create_alert(&self, alert: Alert);
}

/// Forwards saga metrics to the global `metrics` recorder.
///
/// `saga.completed` and `saga.failed` become counters with a `_total`
/// suffix, everything else a histogram.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusMetricsSink;

impl PrometheusMetricsSink {
    fn labels(tags: &[(&str, &str)]) -> Vec<metrics::Label> {
        tags.iter()
            .map(|(k, v)| metrics::Label::new(k.to_string(), v.to_string()))
            .collect()
    }
}

impl MetricsSink for PrometheusMetricsSink {
    fn record_metric(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        let metric = name.replace('.', "_");
        let labels = Self::labels(tags);
        match name {
            METRIC_SAGA_COMPLETED | METRIC_SAGA_FAILED => {
                metrics::counter!(format!("{metric}_total"), labels).increment(value as u64);
            }
            _ => {
                metrics::histogram!(metric, labels).record(value);
            }
        }
    }
}

/// A metric captured by [`InMemoryMonitor`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedMetric {
    pub name: String,
    pub value: f64,
    pub tags: Vec<(String, String)>,
}

impl RecordedMetric {
    /// Returns the value of a tag, if present.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Default)]
struct InMemoryMonitorState {
    metrics: Vec<RecordedMetric>,
    alerts: Vec<Alert>,
}

/// In-memory metrics and alert sink for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMonitor {
    state: Arc<Mutex<InMemoryMonitorState>>,
}

impl InMemoryMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every metric recorded so far.
    pub fn metrics(&self) -> Vec<RecordedMetric> {
        self.state.lock().unwrap().metrics.clone()
    }

    /// Returns the metrics recorded under `name`.
    pub fn metrics_named(&self, name: &str) -> Vec<RecordedMetric> {
        self.state
            .lock()
            .unwrap()
            .metrics
            .iter()
            .filter(|m| m.name == name)
            .cloned()
            .collect()
    }

    /// Returns every alert raised so far.
    pub fn alerts(&self) -> Vec<Alert> {
        self.state.lock().unwrap().alerts.clone()
    }
}

impl MetricsSink for InMemoryMonitor {
    fn record_metric(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        self.state.lock().unwrap().metrics.push(RecordedMetric {
            name: name.to_string(),
            value,
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
    }
}

#[async_trait]
impl AlertSink for InMemoryMonitor {
    async fn create_alert(&self, alert: Alert) {
        self.state.lock().unwrap().alerts.push(alert);
    }
}
