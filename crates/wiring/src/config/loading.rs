use std::path::Path;

use crate::error::WiringError;

use super::scheduler_config::TaskSchedulerConfiguration;
use super::types::WiringConfig;

impl WiringConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, WiringError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, WiringError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Settings for one scheduler, or the empty configuration.
    pub fn scheduler(&self, name: &str) -> TaskSchedulerConfiguration {
        self.schedulers.get(name).cloned().unwrap_or_default()
    }

    /// Override model settings from `WIRING_*` environment variables.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    pub(crate) fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let model = &mut self.model;
        if let Some(v) = lookup("WIRING_DEFAULT_POOL_SIZE").and_then(|v| v.parse().ok()) {
            model.default_pool_size = v;
        }
        if let Some(v) = lookup("WIRING_HEALTH_MONITOR_ENABLED").and_then(|v| v.parse().ok()) {
            model.health_monitor_enabled = v;
        }
        if let Some(v) = lookup("WIRING_HEALTH_MONITOR_CAPACITY").and_then(|v| v.parse().ok()) {
            model.health_monitor_capacity = v;
        }
        if let Some(v) = lookup("WIRING_HEALTH_MONITOR_PERIOD_MS").and_then(|v| v.parse().ok()) {
            model.health_monitor_period_ms = v;
        }
        if let Some(v) = lookup("WIRING_HEALTH_LOG_THRESHOLD_MS").and_then(|v| v.parse().ok()) {
            model.health_log_threshold_ms = v;
        }
        if let Some(v) = lookup("WIRING_HEALTH_LOG_PERIOD_MS").and_then(|v| v.parse().ok()) {
            model.health_log_period_ms = v;
        }
        if let Some(v) = lookup("WIRING_HEALTHY_REPORT_THRESHOLD_MS").and_then(|v| v.parse().ok()) {
            model.healthy_report_threshold_ms = v;
        }
    }
}
