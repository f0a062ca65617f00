use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::info;

use crate::config::ModelConfig;
use crate::error::{TaskFailure, WiringError};
use crate::metrics::{MetricsSink, NoOpMetrics};
use crate::schedulers::{UncaughtExceptionHandler, WorkerPool};

use super::deterministic::CycleDriver;
use super::graph::WiringGraph;
use super::health::HealthMonitorSettings;
use super::heartbeat::HeartbeatScheduler;
use super::lifecycle::Lifecycle;
use super::{ModelShared, WiringModel};

/// Configures and builds a [`WiringModel`].
pub struct WiringModelBuilder {
    default_pool_size: usize,
    default_pool: Option<Arc<WorkerPool>>,
    metrics: Arc<dyn MetricsSink>,
    exception_handler: Option<UncaughtExceptionHandler>,
    health: HealthMonitorSettings,
    deterministic: bool,
}

impl Default for WiringModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WiringModelBuilder {
    pub fn new() -> Self {
        Self {
            default_pool_size: 0,
            default_pool: None,
            metrics: Arc::new(NoOpMetrics),
            exception_handler: None,
            health: HealthMonitorSettings::default(),
            deterministic: false,
        }
    }

    /// Threads in the default worker pool. `0` means one per available core.
    pub fn with_default_pool_size(mut self, threads: usize) -> Self {
        self.default_pool_size = threads;
        self
    }

    /// Use an existing pool as the default worker pool.
    pub fn with_default_pool(mut self, pool: Arc<WorkerPool>) -> Self {
        self.default_pool = Some(pool);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Exception handler for every scheduler that does not set its own.
    pub fn with_uncaught_exception_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&TaskFailure) + Send + Sync + 'static,
    {
        self.exception_handler = Some(Arc::new(handler));
        self
    }

    pub fn with_health_monitor_enabled(mut self, enabled: bool) -> Self {
        self.health.enabled = enabled;
        self
    }

    pub fn with_health_monitor_capacity(mut self, capacity: u64) -> Self {
        self.health.capacity = capacity;
        self
    }

    pub fn with_health_monitor_period(mut self, period: Duration) -> Self {
        self.health.period = period;
        self
    }

    pub fn with_health_log_threshold(mut self, threshold: Duration) -> Self {
        self.health.log_threshold = threshold;
        self
    }

    pub fn with_health_log_period(mut self, period: Duration) -> Self {
        self.health.log_period = period;
        self
    }

    pub fn with_healthy_report_threshold(mut self, threshold: Duration) -> Self {
        self.health.healthy_report_threshold = threshold;
        self
    }

    /// Run every scheduler in [`WiringModel::tick`]s on the calling thread
    /// instead of on worker threads, with heartbeats driven by a logical
    /// clock. Handling order then depends only on the order of calls into
    /// the model, so a run can be replayed exactly.
    ///
    /// A deterministic model has no health monitor, and `put` never blocks
    /// since only a tick can make room.
    pub fn with_deterministic_execution(mut self, enabled: bool) -> Self {
        self.deterministic = enabled;
        self
    }

    /// Apply a `[model]` config section.
    pub fn with_config(mut self, config: &ModelConfig) -> Self {
        self.default_pool_size = config.default_pool_size;
        self.health = config.health_monitor_settings();
        self
    }

    pub fn build(self) -> Result<WiringModel, WiringError> {
        let default_pool = match self.default_pool {
            Some(pool) => pool,
            None => {
                // A deterministic model never submits to it.
                let threads = if self.deterministic {
                    1
                } else if self.default_pool_size == 0 {
                    std::thread::available_parallelism()
                        .map(|n| n.get())
                        .unwrap_or(4)
                } else {
                    self.default_pool_size
                };
                info!(threads, "building default worker pool");
                Arc::new(WorkerPool::new(threads)?)
            }
        };

        let shared = Arc::new(ModelShared {
            lifecycle: Arc::new(Lifecycle::new()),
            metrics: self.metrics,
            default_pool,
            exception_handler: self.exception_handler,
            cycles: self
                .deterministic
                .then(|| Arc::new(CycleDriver::new(Instant::now()))),
            schedulers: Mutex::new(Vec::new()),
            input_wires: Mutex::new(Vec::new()),
            graph: Mutex::new(WiringGraph::default()),
            heartbeats: HeartbeatScheduler::default(),
        });

        WiringModel::from_parts(shared, self.health)
    }
}
