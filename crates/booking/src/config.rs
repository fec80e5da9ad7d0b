//! Demo configuration loaded from environment variables.

use saga::OrchestratorConfig;

/// Demo binary settings with sensible defaults.
///
/// Reads from environment variables:
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DEMO_FAIL_PAYMENT`: decline every charge so the saga rolls back (default: `false`)
/// - `DEMO_COURSE_SEATS`: seats on the demo course (default: `20`)
///
/// Orchestrator settings come from [`OrchestratorConfig::from_env`].
#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub log_level: String,
    pub fail_payment: bool,
    pub course_seats: u32,
    pub orchestrator: OrchestratorConfig,
}

impl DemoConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::from_lookup(|key| std::env::var(key).ok());
        config.orchestrator = OrchestratorConfig::from_env();
        config
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            fail_payment: lookup("DEMO_FAIL_PAYMENT")
                .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
                .unwrap_or(defaults.fail_payment),
            course_seats: lookup("DEMO_COURSE_SEATS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.course_seats),
            orchestrator: defaults.orchestrator,
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            fail_payment: false,
            course_seats: 20,
            orchestrator: OrchestratorConfig::default(),
        }
    }
}
