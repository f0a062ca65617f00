use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::HealthMonitorSettings;

use super::scheduler_config::TaskSchedulerConfiguration;

// ── Top-level config ────────────────────────────────────────────────

/// Configuration of a wiring model and its schedulers.
///
/// Parsed from TOML, with `WIRING_*` environment variable overrides for the
/// model section:
///
/// ```toml
/// [model]
/// default_pool_size = 4
/// health_monitor_period_ms = 100
///
/// [schedulers]
/// hasher = "SEQUENTIAL CAPACITY(500) FLUSHABLE"
/// writer = "SEQUENTIAL_THREAD CAPACITY(100) UNHANDLED_TASK_METRIC"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WiringConfig {
    #[serde(default)]
    pub model: ModelConfig,

    /// Per-scheduler settings keyed by scheduler name.
    #[serde(default)]
    pub schedulers: BTreeMap<String, TaskSchedulerConfiguration>,
}

// ── Model section ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Threads in the default worker pool; `0` means one per core.
    #[serde(default)]
    pub default_pool_size: usize,

    #[serde(default = "default_true")]
    pub health_monitor_enabled: bool,

    #[serde(default = "default_health_monitor_capacity")]
    pub health_monitor_capacity: u64,

    #[serde(default = "default_health_monitor_period_ms")]
    pub health_monitor_period_ms: u64,

    #[serde(default = "default_health_log_threshold_ms")]
    pub health_log_threshold_ms: u64,

    #[serde(default = "default_health_log_period_ms")]
    pub health_log_period_ms: u64,

    #[serde(default = "default_healthy_report_threshold_ms")]
    pub healthy_report_threshold_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_health_monitor_capacity() -> u64 {
    500
}

fn default_health_monitor_period_ms() -> u64 {
    100
}

fn default_health_log_threshold_ms() -> u64 {
    5_000
}

fn default_health_log_period_ms() -> u64 {
    600_000
}

fn default_healthy_report_threshold_ms() -> u64 {
    1_000
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            default_pool_size: 0,
            health_monitor_enabled: true,
            health_monitor_capacity: default_health_monitor_capacity(),
            health_monitor_period_ms: default_health_monitor_period_ms(),
            health_log_threshold_ms: default_health_log_threshold_ms(),
            health_log_period_ms: default_health_log_period_ms(),
            healthy_report_threshold_ms: default_healthy_report_threshold_ms(),
        }
    }
}

impl ModelConfig {
    pub fn health_monitor_settings(&self) -> HealthMonitorSettings {
        HealthMonitorSettings {
            enabled: self.health_monitor_enabled,
            capacity: self.health_monitor_capacity,
            period: Duration::from_millis(self.health_monitor_period_ms),
            log_threshold: Duration::from_millis(self.health_log_threshold_ms),
            log_period: Duration::from_millis(self.health_log_period_ms),
            healthy_report_threshold: Duration::from_millis(self.healthy_report_threshold_ms),
        }
    }
}
