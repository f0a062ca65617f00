//! The wiring model: registry of schedulers, owner of the shared worker pool
//! and driver of the start/stop lifecycle.

mod builder;
pub(crate) mod deterministic;
pub(crate) mod graph;
pub(crate) mod health;
mod heartbeat;
pub(crate) mod lifecycle;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::error::WiringError;
use crate::metrics::MetricsSink;
use crate::schedulers::engine::SchedulerCore;
use crate::schedulers::{
    Capacity, TaskScheduler, TaskSchedulerBuilder, TaskSchedulerType, UncaughtExceptionHandler,
    WorkerPool,
};
use crate::wires::{InputWire, OutputWire, SolderType, WireBinding};

use deterministic::CycleDriver;
use graph::{VertexKind, WiringGraph};
use health::UnhealthyDuration;
use heartbeat::HeartbeatScheduler;
use lifecycle::Lifecycle;

pub use builder::WiringModelBuilder;
pub use health::{HealthMonitor, HealthMonitorSettings, MonitoredScheduler, HEALTH_MONITOR_NAME};
pub use heartbeat::HEARTBEAT_NAME;
pub use lifecycle::ModelState;

/// Reject names that are empty or contain anything outside `[A-Za-z0-9_]`.
pub fn validate_scheduler_name(name: &str) -> Result<(), WiringError> {
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(WiringError::InvalidName(name.to_string()))
    }
}

// ── Shared state ─────────────────────────────────────────────────────

/// State reachable from builders and wires. Wires hold it weakly.
pub(crate) struct ModelShared {
    pub(crate) lifecycle: Arc<Lifecycle>,
    pub(crate) metrics: Arc<dyn MetricsSink>,
    pub(crate) default_pool: Arc<WorkerPool>,
    pub(crate) exception_handler: Option<UncaughtExceptionHandler>,
    /// Present when the model runs in ticks instead of on threads.
    pub(crate) cycles: Option<Arc<CycleDriver>>,
    schedulers: Mutex<Vec<Arc<SchedulerCore>>>,
    /// Keeps every input wire alive for the lifetime of the model, so solder
    /// edges can refer to their targets weakly.
    input_wires: Mutex<Vec<Arc<dyn WireBinding>>>,
    graph: Mutex<WiringGraph>,
    heartbeats: HeartbeatScheduler,
}

impl ModelShared {
    pub(crate) fn register_scheduler(&self, core: Arc<SchedulerCore>) -> Result<(), WiringError> {
        self.lifecycle.ensure_configurable()?;
        let mut graph = self.graph.lock().unwrap_or_else(|e| e.into_inner());
        graph.add_scheduler(core.name(), core.insertion_is_blocking())?;
        let mut schedulers = self.schedulers.lock().unwrap_or_else(|e| e.into_inner());
        schedulers.push(core);
        Ok(())
    }

    pub(crate) fn register_input_wire(&self, wire: Arc<dyn WireBinding>) {
        let mut wires = self.input_wires.lock().unwrap_or_else(|e| e.into_inner());
        wires.push(wire);
    }

    pub(crate) fn record_edge(
        &self,
        source: &str,
        target: &str,
        target_kind: VertexKind,
        label: &str,
        solder_type: SolderType,
    ) -> Result<(), WiringError> {
        self.lifecycle.ensure_configurable()?;
        let source_kind = if source == HEARTBEAT_NAME {
            VertexKind::Heartbeat
        } else {
            VertexKind::Scheduler
        };
        let mut graph = self.graph.lock().unwrap_or_else(|e| e.into_inner());
        graph.add_edge(source, source_kind, target, target_kind, label, solder_type);
        Ok(())
    }

    fn schedulers(&self) -> Vec<Arc<SchedulerCore>> {
        self.schedulers
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

// ── Model ────────────────────────────────────────────────────────────

struct HealthWiring {
    settings: HealthMonitorSettings,
    scheduler: TaskScheduler<Duration>,
    input: InputWire<Instant, Duration>,
    longest: UnhealthyDuration,
}

/// Owns every scheduler and the wiring between them.
///
/// Configure schedulers, wires and solder edges, call [`WiringModel::start`],
/// and finally [`WiringModel::stop`]. Dropping a running model stops it.
pub struct WiringModel {
    shared: Arc<ModelShared>,
    health: HealthWiring,
}

impl WiringModel {
    pub fn builder() -> WiringModelBuilder {
        WiringModelBuilder::new()
    }

    /// A model with default settings.
    pub fn new() -> Result<Self, WiringError> {
        WiringModelBuilder::new().build()
    }

    pub(crate) fn from_parts(
        shared: Arc<ModelShared>,
        settings: HealthMonitorSettings,
    ) -> Result<Self, WiringError> {
        let mut settings = settings;
        if shared.cycles.is_some() {
            settings.enabled = false;
        }
        let (kind, capacity) = if settings.enabled {
            (TaskSchedulerType::Sequential, Capacity::Bounded(settings.capacity))
        } else {
            (TaskSchedulerType::NoOp, Capacity::Unlimited)
        };
        let scheduler = TaskSchedulerBuilder::<Duration>::new(
            Arc::clone(&shared),
            HEALTH_MONITOR_NAME.to_string(),
        )
        .with_type(kind)
        .with_unhandled_task_capacity(capacity)
        .build()?;
        let input = scheduler.build_input_wire::<Instant>("check system health");
        let longest = UnhealthyDuration::default();

        // The monitor is created on the first heartbeat, which only arrives
        // after start, when the set of schedulers is final.
        let mut monitor: Option<HealthMonitor> = None;
        let model_ref = Arc::downgrade(&shared);
        let monitor_settings = settings.clone();
        let monitor_longest = longest.clone();
        input.bind(move |now: Instant| {
            if monitor.is_none() {
                let shared = model_ref.upgrade()?;
                let monitored: Vec<Arc<dyn MonitoredScheduler>> = shared
                    .schedulers()
                    .into_iter()
                    .map(|core| core as Arc<dyn MonitoredScheduler>)
                    .collect();
                monitor = Some(HealthMonitor::with_shared_duration(
                    monitored,
                    &monitor_settings,
                    Arc::clone(&shared.metrics),
                    monitor_longest.clone(),
                ));
            }
            monitor.as_mut()?.check_system_health(now)
        })?;

        let model = Self {
            shared,
            health: HealthWiring {
                settings,
                scheduler,
                input,
                longest,
            },
        };

        if model.health.settings.enabled {
            let heartbeat = model.build_heartbeat_wire(model.health.settings.period)?;
            heartbeat.solder_to(&model.health.input, SolderType::Offer)?;
        }
        Ok(model)
    }

    pub fn state(&self) -> ModelState {
        self.shared.lifecycle.state()
    }

    /// The worker pool `SEQUENTIAL` schedulers use unless given their own.
    pub fn default_pool(&self) -> Arc<WorkerPool> {
        Arc::clone(&self.shared.default_pool)
    }

    // ── Construction ─────────────────────────────────────────────────

    /// Start building a scheduler. The name must be non-empty and use only
    /// `[A-Za-z0-9_]`; uniqueness is checked by the builder's `build`.
    pub fn scheduler_builder<O: Clone + Send + 'static>(
        &self,
        name: &str,
    ) -> Result<TaskSchedulerBuilder<O>, WiringError> {
        validate_scheduler_name(name)?;
        self.shared.lifecycle.ensure_configurable()?;
        Ok(TaskSchedulerBuilder::new(Arc::clone(&self.shared), name.to_string()))
    }

    /// An output wire carrying the current instant once per `period`.
    pub fn build_heartbeat_wire(&self, period: Duration) -> Result<OutputWire<Instant>, WiringError> {
        self.shared.lifecycle.ensure_configurable()?;
        if period.is_zero() {
            return Err(WiringError::InvalidConfiguration {
                name: HEARTBEAT_NAME.to_string(),
                reason: "heartbeat period must be positive".into(),
            });
        }

        if let Ok(mut graph) = self.shared.graph.lock() {
            graph.ensure_vertex(HEARTBEAT_NAME, VertexKind::Heartbeat);
        }
        let wire = OutputWire::new(HEARTBEAT_NAME, Arc::downgrade(&self.shared));
        match &self.shared.cycles {
            Some(cycles) => cycles.add_heartbeat(period, wire.clone()),
            None => self.shared.heartbeats.add(period, wire.clone()),
        }
        Ok(wire)
    }

    /// An output wire carrying the current instant `hz` times per second.
    pub fn build_heartbeat_wire_with_frequency(
        &self,
        hz: f64,
    ) -> Result<OutputWire<Instant>, WiringError> {
        if !(hz.is_finite() && hz > 0.0) {
            return Err(WiringError::InvalidConfiguration {
                name: HEARTBEAT_NAME.to_string(),
                reason: format!("heartbeat frequency must be positive, got {hz}"),
            });
        }
        self.build_heartbeat_wire(Duration::from_secs_f64(1.0 / hz))
    }

    /// Results of the health monitor: the longest unhealthy duration whenever
    /// it changes, and `ZERO` periodically while healthy.
    pub fn health_monitor_wire(&self) -> OutputWire<Duration> {
        self.health.scheduler.output_wire()
    }

    /// Longest time any bounded scheduler has currently been over capacity.
    /// `ZERO` before the first health check.
    pub fn unhealthy_duration(&self) -> Duration {
        self.health.longest.get()
    }

    /// Every solder edge, as `from -[label/type]-> to`.
    pub fn describe_wiring(&self) -> Vec<String> {
        self.shared
            .graph
            .lock()
            .map(|g| g.describe_edges())
            .unwrap_or_default()
    }

    // ── Sanity checks ────────────────────────────────────────────────

    /// Log every loop of blocking `PUT` edges. Returns whether any exists.
    pub fn check_for_cyclical_backpressure(&self) -> bool {
        let cycles = match self.shared.graph.lock() {
            Ok(graph) => graph.cyclical_backpressure(),
            Err(_) => return false,
        };
        for cycle in &cycles {
            error!(
                schedulers = ?cycle,
                "cyclical backpressure detected, these schedulers can deadlock"
            );
        }
        !cycles.is_empty()
    }

    /// Log every input wire without a handler. Returns whether any exists.
    pub fn check_for_unbound_input_wires(&self) -> bool {
        let wires = match self.shared.input_wires.lock() {
            Ok(wires) => wires.clone(),
            Err(_) => return false,
        };
        let mut found = false;
        for wire in wires.iter().filter(|w| !w.is_bound()) {
            warn!(
                scheduler = wire.scheduler_name(),
                wire = wire.label(),
                "input wire has no bound handler"
            );
            found = true;
        }
        found
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Freeze the configuration and start every heartbeat and dedicated
    /// thread. May be called once.
    pub fn start(&self) -> Result<(), WiringError> {
        self.shared.lifecycle.mark_started()?;

        self.check_for_cyclical_backpressure();
        self.check_for_unbound_input_wires();

        self.shared.heartbeats.start()?;
        if let Some(cycles) = &self.shared.cycles {
            cycles.start();
        }
        let schedulers = self.shared.schedulers();
        for core in &schedulers {
            core.start()?;
        }

        info!(
            schedulers = schedulers.len(),
            deterministic = self.is_deterministic(),
            edges = self.shared.graph.lock().map(|g| g.edge_count()).unwrap_or_default(),
            "wiring model started"
        );
        Ok(())
    }

    /// Stop accepting work, release callers blocked in `put` or `flush`, and
    /// join every thread after it has handled what it already admitted.
    pub fn stop(&self) -> Result<(), WiringError> {
        self.shared.lifecycle.mark_stopped()?;
        self.shared.heartbeats.stop();
        for core in self.shared.schedulers() {
            core.stop();
        }
        info!("wiring model stopped");
        Ok(())
    }

    // ── Deterministic execution ──────────────────────────────────────

    /// Whether this model runs its schedulers in [`WiringModel::tick`]s.
    pub fn is_deterministic(&self) -> bool {
        self.shared.cycles.is_some()
    }

    /// Run one cycle of a deterministic model on the calling thread.
    ///
    /// Handles every task queued for this cycle in submission order, fires
    /// the heartbeats due at the current logical time, then queues up the
    /// tasks submitted during this tick for the next one. A task submitted
    /// between ticks is handled in the second tick after its submission.
    /// Returns how many tasks ran.
    pub fn tick(&self) -> Result<usize, WiringError> {
        let cycles = self.cycles()?;
        if self.state() == ModelState::Init {
            return Err(WiringError::NotStarted);
        }
        Ok(cycles.tick())
    }

    /// Move the logical clock of a deterministic model forward.
    pub fn advance_time(&self, elapsed: Duration) -> Result<(), WiringError> {
        self.cycles()?.advance(elapsed);
        Ok(())
    }

    /// The logical clock of a deterministic model, wall-clock time otherwise.
    pub fn current_time(&self) -> Instant {
        self.shared
            .cycles
            .as_ref()
            .map_or_else(Instant::now, |cycles| cycles.now())
    }

    /// Tasks of a deterministic model waiting for a tick. `0` otherwise.
    pub fn pending_work(&self) -> usize {
        self.shared.cycles.as_ref().map_or(0, |cycles| cycles.pending())
    }

    fn cycles(&self) -> Result<&CycleDriver, WiringError> {
        self.shared
            .cycles
            .as_deref()
            .ok_or(WiringError::NotDeterministic)
    }
}

impl Drop for WiringModel {
    fn drop(&mut self) {
        if self.state() == ModelState::Running {
            let _ = self.stop();
        }
        if let Some(cycles) = &self.shared.cycles {
            cycles.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_model() -> WiringModel {
        WiringModel::builder()
            .with_health_monitor_enabled(false)
            .build()
            .unwrap()
    }

    #[test]
    fn scheduler_names_are_validated() {
        for good in ["A", "hasher", "event_intake_2", "_"] {
            assert!(validate_scheduler_name(good).is_ok(), "{good}");
        }
        for bad in ["", " ", "has space", "what?", "a:b", "a*", "a/b", "a\\b", "a-b", "ünïcode"] {
            assert!(
                matches!(validate_scheduler_name(bad), Err(WiringError::InvalidName(_))),
                "{bad:?} should be rejected"
            );
        }

        let model = quiet_model();
        assert!(model.scheduler_builder::<()>("bad name").is_err());
        assert!(model.scheduler_builder::<()>("good_name").is_ok());
    }

    #[test]
    fn duplicate_names_fail_at_build() {
        let model = quiet_model();
        model.scheduler_builder::<()>("twin").unwrap().build().unwrap();
        let second = model.scheduler_builder::<()>("twin").unwrap().build();
        assert!(matches!(second, Err(WiringError::DuplicateName(name)) if name == "twin"));
    }

    #[test]
    fn configuration_is_frozen_after_start() {
        let model = quiet_model();
        let a = model.scheduler_builder::<u32>("A").unwrap().build().unwrap();
        let b = model.scheduler_builder::<()>("B").unwrap().build().unwrap();
        let b_in = b.build_input_wire::<u32>("numbers");
        b_in.bind_consumer(|_| {}).unwrap();

        model.start().unwrap();
        assert!(matches!(model.start(), Err(WiringError::AlreadyStarted)));
        assert!(matches!(
            model.scheduler_builder::<()>("C"),
            Err(WiringError::AlreadyStarted)
        ));
        assert!(matches!(
            a.output_wire().solder_to(&b_in, SolderType::Put),
            Err(WiringError::AlreadyStarted)
        ));
        assert!(matches!(
            model.build_heartbeat_wire(Duration::from_millis(10)),
            Err(WiringError::AlreadyStarted)
        ));

        model.stop().unwrap();
        assert!(matches!(model.stop(), Err(WiringError::NotStarted)));
        assert_eq!(model.state(), ModelState::Stopped);
    }

    #[test]
    fn stop_before_start_is_an_error() {
        let model = quiet_model();
        assert!(matches!(model.stop(), Err(WiringError::NotStarted)));
    }

    #[test]
    fn sanity_checks_find_cycles_and_unbound_wires() {
        let model = quiet_model();
        let a = model
            .scheduler_builder::<u32>("A")
            .unwrap()
            .with_unhandled_task_capacity(5)
            .build()
            .unwrap();
        let b = model
            .scheduler_builder::<u32>("B")
            .unwrap()
            .with_unhandled_task_capacity(5)
            .build()
            .unwrap();
        let a_in = a.build_input_wire::<u32>("from B");
        let b_in = b.build_input_wire::<u32>("from A");
        a.output_wire().solder_to(&b_in, SolderType::Put).unwrap();

        assert!(!model.check_for_cyclical_backpressure());
        b.output_wire().solder_to(&a_in, SolderType::Put).unwrap();
        assert!(model.check_for_cyclical_backpressure());

        assert!(model.check_for_unbound_input_wires());
        a_in.bind(Some).unwrap();
        b_in.bind(Some).unwrap();
        assert!(!model.check_for_unbound_input_wires());

        assert_eq!(
            model.describe_wiring(),
            vec!["A -[from A/PUT]-> B".to_string(), "B -[from B/PUT]-> A".to_string()]
        );
    }

    #[test]
    fn heartbeat_period_must_be_positive() {
        let model = quiet_model();
        assert!(model.build_heartbeat_wire(Duration::ZERO).is_err());
        assert!(model.build_heartbeat_wire_with_frequency(0.0).is_err());
        assert!(model.build_heartbeat_wire_with_frequency(f64::NAN).is_err());
        assert!(model.build_heartbeat_wire_with_frequency(50.0).is_ok());
    }
}
