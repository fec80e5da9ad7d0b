//! Orchestrator configuration loaded from environment variables.

use std::time::Duration;

use crate::audit::DEFAULT_AUDIT_LOG_CAPACITY;
use crate::executor::DEFAULT_RETRY_BASE_DELAY;

/// Orchestrator settings with sensible defaults.
///
/// Reads from environment variables:
/// - `SAGA_RETRY_BASE_MS`: base backoff between retries (default: `100`)
/// - `SAGA_AUDIT_LOG_CAPACITY`: audit entries kept before halving (default: `10000`)
/// - `SAGA_RETAIN_TERMINAL`: keep finished sagas queryable by id (default: `true`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub retry_base_delay: Duration,
    pub audit_log_capacity: usize,
    pub retain_terminal_sagas: bool,
}

impl OrchestratorConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            retry_base_delay: lookup("SAGA_RETRY_BASE_MS")
                .and_then(|v| v.trim().parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_base_delay),
            audit_log_capacity: lookup("SAGA_AUDIT_LOG_CAPACITY")
                .and_then(|v| v.trim().parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.audit_log_capacity),
            retain_terminal_sagas: lookup("SAGA_RETAIN_TERMINAL")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.retain_terminal_sagas),
        }
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn with_audit_log_capacity(mut self, capacity: usize) -> Self {
        self.audit_log_capacity = capacity;
        self
    }

    pub fn with_retain_terminal_sagas(mut self, retain: bool) -> Self {
        self.retain_terminal_sagas = retain;
        self
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            audit_log_capacity: DEFAULT_AUDIT_LOG_CAPACITY,
            retain_terminal_sagas: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.retry_base_delay, Duration::from_millis(100));
        assert_eq!(config.audit_log_capacity, 10_000);
        assert!(config.retain_terminal_sagas);
    }

    #[test]
    fn test_reads_overrides() {
        let config = OrchestratorConfig::from_lookup(lookup(&[
            ("SAGA_RETRY_BASE_MS", "25"),
            ("SAGA_AUDIT_LOG_CAPACITY", "500"),
            ("SAGA_RETAIN_TERMINAL", "off"),
        ]));
        assert_eq!(config.retry_base_delay, Duration::from_millis(25));
        assert_eq!(config.audit_log_capacity, 500);
        assert!(!config.retain_terminal_sagas);
    }

    #[test]
    fn test_invalid_values_fall_back_to_defaults() {
        let config = OrchestratorConfig::from_lookup(lookup(&[
            ("SAGA_RETRY_BASE_MS", "soon"),
            ("SAGA_AUDIT_LOG_CAPACITY", "0"),
            ("SAGA_RETAIN_TERMINAL", "maybe"),
        ]));
        assert_eq!(config, OrchestratorConfig::default());
    }

    #[test]
    fn test_builder_setters() {
        let config = OrchestratorConfig::default()
            .with_retry_base_delay(Duration::from_millis(1))
            .with_audit_log_capacity(8)
            .with_retain_terminal_sagas(false);
        assert_eq!(config.retry_base_delay, Duration::from_millis(1));
        assert_eq!(config.audit_log_capacity, 8);
        assert!(!config.retain_terminal_sagas);
    }
}
