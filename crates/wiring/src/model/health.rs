//! Health monitor: watches every capacity-bounded scheduler and reports how
//! long the system has been unhealthy.
//!
//! A scheduler is unhealthy while its unprocessed task count exceeds its
//! capacity, which only injection can cause. The monitor runs as an ordinary
//! scheduler fed by a heartbeat; each check yields a duration only when there
//! is something new to say.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::metrics::MetricsSink;
use crate::schedulers::Capacity;

/// Name of the scheduler running health checks.
pub const HEALTH_MONITOR_NAME: &str = "HealthMonitor";

/// What the health monitor needs to know about a scheduler.
pub trait MonitoredScheduler: Send + Sync {
    fn name(&self) -> &str;
    fn capacity(&self) -> Capacity;
    fn unprocessed_task_count(&self) -> i64;
}

/// Tuning for the health monitor.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthMonitorSettings {
    pub enabled: bool,
    /// Capacity of the health monitor scheduler itself.
    pub capacity: u64,
    /// Interval between two health checks.
    pub period: Duration,
    /// An unhealthy scheduler is logged once it has been unhealthy this long.
    pub log_threshold: Duration,
    /// Minimum interval between two log lines about the same scheduler.
    pub log_period: Duration,
    /// While healthy, report `ZERO` again at most this often.
    pub healthy_report_threshold: Duration,
}

impl Default for HealthMonitorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 500,
            period: Duration::from_millis(100),
            log_threshold: Duration::from_secs(5),
            log_period: Duration::from_secs(600),
            healthy_report_threshold: Duration::from_secs(1),
        }
    }
}

/// Rate-limited warnings about unhealthy schedulers.
#[derive(Debug)]
struct HealthLogger {
    threshold: Duration,
    period: Duration,
    last_logged: HashMap<String, Instant>,
}

impl HealthLogger {
    fn report_unhealthy(&mut self, scheduler: &dyn MonitoredScheduler, duration: Duration, now: Instant) {
        if duration < self.threshold {
            return;
        }
        if let Some(last) = self.last_logged.get(scheduler.name()) {
            if now.saturating_duration_since(*last) < self.period {
                return;
            }
        }
        self.last_logged.insert(scheduler.name().to_string(), now);
        warn!(
            scheduler = scheduler.name(),
            unhealthy_for_ms = duration.as_millis() as u64,
            unprocessed = scheduler.unprocessed_task_count(),
            capacity = %scheduler.capacity(),
            "scheduler has been over capacity"
        );
    }
}

/// Shared view of the most recently computed longest unhealthy duration.
#[derive(Debug, Clone, Default)]
pub(crate) struct UnhealthyDuration(Arc<AtomicU64>);

impl UnhealthyDuration {
    pub(crate) fn get(&self) -> Duration {
        Duration::from_nanos(self.0.load(Ordering::Acquire))
    }

    fn set(&self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.0.store(nanos, Ordering::Release);
    }
}

pub struct HealthMonitor {
    /// Only schedulers with a bounded capacity, each with the instant it
    /// last turned unhealthy.
    schedulers: Vec<(Arc<dyn MonitoredScheduler>, Option<Instant>)>,
    previously_reported: Duration,
    last_healthy_transition: Option<Instant>,
    healthy_report_threshold: Duration,
    logger: HealthLogger,
    longest: UnhealthyDuration,
    metrics: Arc<dyn MetricsSink>,
}

impl HealthMonitor {
    pub fn new(
        schedulers: Vec<Arc<dyn MonitoredScheduler>>,
        settings: &HealthMonitorSettings,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self::with_shared_duration(schedulers, settings, metrics, UnhealthyDuration::default())
    }

    pub(crate) fn with_shared_duration(
        schedulers: Vec<Arc<dyn MonitoredScheduler>>,
        settings: &HealthMonitorSettings,
        metrics: Arc<dyn MetricsSink>,
        longest: UnhealthyDuration,
    ) -> Self {
        Self {
            schedulers: schedulers
                .into_iter()
                .filter(|s| s.capacity().is_bounded())
                .map(|s| (s, None))
                .collect(),
            previously_reported: Duration::ZERO,
            last_healthy_transition: None,
            healthy_report_threshold: settings.healthy_report_threshold,
            logger: HealthLogger {
                threshold: settings.log_threshold,
                period: settings.log_period,
                last_logged: HashMap::new(),
            },
            longest,
            metrics,
        }
    }

    /// Number of schedulers being watched.
    pub fn monitored_count(&self) -> usize {
        self.schedulers.len()
    }

    /// Longest duration any scheduler has currently been unhealthy, as of the
    /// last change seen by [`HealthMonitor::check_system_health`].
    pub fn unhealthy_duration(&self) -> Duration {
        self.longest.get()
    }

    /// Scan all schedulers.
    ///
    /// Returns the longest current unhealthy duration if it differs from the
    /// previous check. While everything stays healthy, returns `ZERO` on the
    /// first check and then whenever `healthy_report_threshold` has passed
    /// since the last such report. Otherwise returns `None`.
    pub fn check_system_health(&mut self, now: Instant) -> Option<Duration> {
        let mut longest = Duration::ZERO;

        for (scheduler, unhealthy_since) in &mut self.schedulers {
            let healthy = scheduler.capacity().admits(scheduler.unprocessed_task_count());
            if healthy {
                *unhealthy_since = None;
                continue;
            }

            let since = *unhealthy_since.get_or_insert(now);
            let duration = now.saturating_duration_since(since);
            self.logger.report_unhealthy(&**scheduler, duration, now);
            longest = longest.max(duration);
        }

        let report = if longest != self.previously_reported {
            self.longest.set(longest);
            self.metrics.record_unhealthy_duration(longest);
            if longest.is_zero() {
                self.last_healthy_transition = Some(now);
            }
            Some(longest)
        } else if longest.is_zero()
            && self.last_healthy_transition.map_or(true, |last| {
                now.saturating_duration_since(last) >= self.healthy_report_threshold
            })
        {
            self.last_healthy_transition = Some(now);
            Some(longest)
        } else {
            None
        };

        self.previously_reported = longest;
        report
    }
}
