//! Metrics hooks for schedulers and the health monitor.
//!
//! The framework does not own a metrics backend. Schedulers push gauges into
//! a [`MetricsSink`] supplied to the wiring model; [`NoOpMetrics`] is the
//! default and [`InMemoryMetrics`] keeps the latest values for dashboards and
//! tests.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Receives gauges from the wiring framework.
pub trait MetricsSink: Send + Sync {
    /// Fraction of wall time (0.0 - 1.0) a scheduler spent inside handlers
    /// since its previous report.
    fn record_busy_fraction(&self, scheduler: &str, fraction: f64);

    /// Number of tasks on-ramped into a scheduler and not yet off-ramped.
    fn record_unprocessed_tasks(&self, scheduler: &str, count: i64);

    /// Longest time any capacity-bounded scheduler has been over capacity.
    fn record_unhealthy_duration(&self, duration: Duration);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpMetrics;

impl MetricsSink for NoOpMetrics {
    fn record_busy_fraction(&self, _scheduler: &str, _fraction: f64) {}
    fn record_unprocessed_tasks(&self, _scheduler: &str, _count: i64) {}
    fn record_unhealthy_duration(&self, _duration: Duration) {}
}

// ── In-memory sink ───────────────────────────────────────────────────

/// Latest gauges for one scheduler.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerGauges {
    pub busy_fraction: Option<f64>,
    pub unprocessed_tasks: Option<i64>,
    /// Number of busy-fraction reports received (one per handled task).
    pub busy_reports: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Point-in-time copy of everything an [`InMemoryMetrics`] has seen.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub schedulers: BTreeMap<String, SchedulerGauges>,
    pub unhealthy_duration: Duration,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Gauges {
    schedulers: BTreeMap<String, SchedulerGauges>,
    unhealthy_duration: Duration,
}

/// Keeps the most recent value of every gauge.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    gauges: Mutex<Gauges>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy the current gauges.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let gauges = self.gauges.lock().unwrap_or_else(|e| e.into_inner());
        MetricsSnapshot {
            schedulers: gauges.schedulers.clone(),
            unhealthy_duration: gauges.unhealthy_duration,
            captured_at: Utc::now(),
        }
    }

    /// Latest gauges for a single scheduler.
    pub fn scheduler(&self, name: &str) -> Option<SchedulerGauges> {
        let gauges = self.gauges.lock().unwrap_or_else(|e| e.into_inner());
        gauges.schedulers.get(name).cloned()
    }
}

impl MetricsSink for InMemoryMetrics {
    fn record_busy_fraction(&self, scheduler: &str, fraction: f64) {
        if let Ok(mut gauges) = self.gauges.lock() {
            let entry = gauges.schedulers.entry(scheduler.to_string()).or_default();
            entry.busy_fraction = Some(fraction);
            entry.busy_reports += 1;
            entry.updated_at = Some(Utc::now());
        }
    }

    fn record_unprocessed_tasks(&self, scheduler: &str, count: i64) {
        if let Ok(mut gauges) = self.gauges.lock() {
            let entry = gauges.schedulers.entry(scheduler.to_string()).or_default();
            entry.unprocessed_tasks = Some(count);
            entry.updated_at = Some(Utc::now());
        }
    }

    fn record_unhealthy_duration(&self, duration: Duration) {
        if let Ok(mut gauges) = self.gauges.lock() {
            gauges.unhealthy_duration = duration;
        }
    }
}

// ── Busy timer ───────────────────────────────────────────────────────

#[derive(Debug)]
struct BusyWindow {
    window_start: Instant,
    busy: Duration,
    active_since: Option<Instant>,
}

/// Measures how much of a window of wall time was spent busy.
#[derive(Debug)]
pub(crate) struct BusyTimer {
    window: Mutex<BusyWindow>,
}

impl BusyTimer {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            window: Mutex::new(BusyWindow {
                window_start: now,
                busy: Duration::ZERO,
                active_since: None,
            }),
        }
    }

    pub(crate) fn activate(&self, now: Instant) {
        if let Ok(mut w) = self.window.lock() {
            if w.active_since.is_none() {
                w.active_since = Some(now);
            }
        }
    }

    pub(crate) fn deactivate(&self, now: Instant) {
        if let Ok(mut w) = self.window.lock() {
            if let Some(since) = w.active_since.take() {
                w.busy += now.saturating_duration_since(since);
            }
        }
    }

    /// Busy fraction of the window ending at `now`, then start a new window.
    pub(crate) fn take_fraction(&self, now: Instant) -> f64 {
        let Ok(mut w) = self.window.lock() else {
            return 0.0;
        };

        let mut busy = w.busy;
        if let Some(since) = w.active_since {
            busy += now.saturating_duration_since(since);
            w.active_since = Some(now);
        }
        let elapsed = now.saturating_duration_since(w.window_start);

        w.window_start = now;
        w.busy = Duration::ZERO;

        if elapsed.is_zero() {
            return if busy.is_zero() { 0.0 } else { 1.0 };
        }
        (busy.as_secs_f64() / elapsed.as_secs_f64()).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_keeps_latest_values() {
        let m = InMemoryMetrics::new();
        m.record_unprocessed_tasks("hasher", 3);
        m.record_unprocessed_tasks("hasher", 7);
        m.record_busy_fraction("hasher", 0.25);
        m.record_unhealthy_duration(Duration::from_millis(1500));

        let gauges = m.scheduler("hasher").expect("hasher gauges");
        assert_eq!(gauges.unprocessed_tasks, Some(7));
        assert_eq!(gauges.busy_fraction, Some(0.25));
        assert_eq!(gauges.busy_reports, 1);
        assert!(gauges.updated_at.is_some());

        let snapshot = m.snapshot();
        assert_eq!(snapshot.unhealthy_duration, Duration::from_millis(1500));
        assert_eq!(snapshot.schedulers.len(), 1);
        assert!(m.scheduler("missing").is_none());
    }

    #[test]
    fn busy_timer_measures_fraction() {
        let start = Instant::now();
        let timer = BusyTimer::new(start);

        timer.activate(start + Duration::from_millis(10));
        timer.deactivate(start + Duration::from_millis(35));
        let fraction = timer.take_fraction(start + Duration::from_millis(100));
        assert!((fraction - 0.25).abs() < 1e-9, "expected 0.25, got {fraction}");

        // New window starts empty.
        let fraction = timer.take_fraction(start + Duration::from_millis(200));
        assert_eq!(fraction, 0.0);
    }

    #[test]
    fn busy_timer_counts_open_interval() {
        let start = Instant::now();
        let timer = BusyTimer::new(start);

        timer.activate(start);
        let fraction = timer.take_fraction(start + Duration::from_millis(50));
        assert!((fraction - 1.0).abs() < 1e-9);

        timer.deactivate(start + Duration::from_millis(75));
        let fraction = timer.take_fraction(start + Duration::from_millis(100));
        assert!((fraction - 0.5).abs() < 1e-9, "expected 0.5, got {fraction}");
    }
}
