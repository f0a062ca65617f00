use std::marker::PhantomData;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::TaskSchedulerConfiguration;
use crate::counters::{
    BackpressureObjectCounter, MultiObjectCounter, NoOpObjectCounter, ObjectCounter,
    StandardObjectCounter, DEFAULT_SLEEP_DURATION,
};
use crate::error::{TaskFailure, WiringError};
use crate::metrics::BusyTimer;
use crate::model::ModelShared;

use super::engine::{Executor, SchedulerCore};
use super::exceptions::{default_exception_handler, UncaughtExceptionHandler};
use super::pool::WorkerPool;
use super::scheduler::TaskScheduler;
use super::sequential::SequentialExecutor;
use super::thread::ThreadExecutor;
use super::types::{Capacity, TaskSchedulerType};

/// Configures and builds a [`TaskScheduler`]. Obtained from
/// [`crate::WiringModel::scheduler_builder`], which has already validated the
/// name.
///
/// Defaults: `SEQUENTIAL`, unlimited capacity, flushing and squelching
/// disabled, no metrics, the model's exception handler and worker pool.
pub struct TaskSchedulerBuilder<O> {
    model: Arc<ModelShared>,
    name: String,
    kind: TaskSchedulerType,
    capacity: Capacity,
    flushing_enabled: bool,
    squelching_enabled: bool,
    exception_handler: Option<UncaughtExceptionHandler>,
    on_ramp: Option<Arc<dyn ObjectCounter>>,
    off_ramp: Option<Arc<dyn ObjectCounter>>,
    external_back_pressure: bool,
    sleep_duration: Duration,
    pool: Option<Arc<WorkerPool>>,
    busy_fraction_metric: bool,
    unhandled_task_metric: bool,
    _output: PhantomData<fn() -> O>,
}

impl<O: Clone + Send + 'static> TaskSchedulerBuilder<O> {
    pub(crate) fn new(model: Arc<ModelShared>, name: String) -> Self {
        Self {
            model,
            name,
            kind: TaskSchedulerType::Sequential,
            capacity: Capacity::Unlimited,
            flushing_enabled: false,
            squelching_enabled: false,
            exception_handler: None,
            on_ramp: None,
            off_ramp: None,
            external_back_pressure: false,
            sleep_duration: DEFAULT_SLEEP_DURATION,
            pool: None,
            busy_fraction_metric: false,
            unhandled_task_metric: false,
            _output: PhantomData,
        }
    }

    pub fn with_type(mut self, kind: TaskSchedulerType) -> Self {
        self.kind = kind;
        self
    }

    /// Maximum number of unhandled tasks before `put` blocks and `offer`
    /// refuses. A bounded capacity must be positive.
    pub fn with_unhandled_task_capacity(mut self, capacity: impl Into<Capacity>) -> Self {
        self.capacity = capacity.into();
        self
    }

    pub fn with_flushing_enabled(mut self, enabled: bool) -> Self {
        self.flushing_enabled = enabled;
        self
    }

    pub fn with_squelching_enabled(mut self, enabled: bool) -> Self {
        self.squelching_enabled = enabled;
        self
    }

    pub fn with_uncaught_exception_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&TaskFailure) + Send + Sync + 'static,
    {
        self.exception_handler = Some(Arc::new(handler));
        self
    }

    /// Also on-ramp every admitted task into `counter`, typically one shared
    /// with other schedulers.
    pub fn with_on_ramp(mut self, counter: Arc<dyn ObjectCounter>) -> Self {
        self.on_ramp = Some(counter);
        self
    }

    /// Also off-ramp every handled task from `counter`.
    pub fn with_off_ramp(mut self, counter: Arc<dyn ObjectCounter>) -> Self {
        self.off_ramp = Some(counter);
        self
    }

    /// Declare that insertion may block on a counter this scheduler does not
    /// own. Only affects the start-time deadlock check.
    pub fn with_external_back_pressure(mut self, enabled: bool) -> Self {
        self.external_back_pressure = enabled;
        self
    }

    /// Interval between capacity re-checks of a blocked `put` or `flush`.
    pub fn with_sleep_duration(mut self, sleep: Duration) -> Self {
        self.sleep_duration = sleep;
        self
    }

    /// Run `SEQUENTIAL` tasks on this pool instead of the model's default.
    pub fn with_pool(mut self, pool: Arc<WorkerPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_busy_fraction_metrics_enabled(mut self, enabled: bool) -> Self {
        self.busy_fraction_metric = enabled;
        self
    }

    pub fn with_unhandled_task_metric_enabled(mut self, enabled: bool) -> Self {
        self.unhandled_task_metric = enabled;
        self
    }

    /// Apply every setting present in `config`, leaving the rest untouched.
    pub fn configure(mut self, config: &TaskSchedulerConfiguration) -> Self {
        if let Some(kind) = config.kind {
            self.kind = kind;
        }
        if let Some(capacity) = config.capacity {
            self.capacity = capacity;
        }
        if let Some(enabled) = config.flushing_enabled {
            self.flushing_enabled = enabled;
        }
        if let Some(enabled) = config.squelching_enabled {
            self.squelching_enabled = enabled;
        }
        if let Some(enabled) = config.unhandled_task_metric_enabled {
            self.unhandled_task_metric = enabled;
        }
        if let Some(enabled) = config.busy_fraction_metric_enabled {
            self.busy_fraction_metric = enabled;
        }
        self
    }

    /// Build the scheduler and register it with the model.
    pub fn build(self) -> Result<TaskScheduler<O>, WiringError> {
        self.model.lifecycle.ensure_configurable()?;

        if self.capacity == Capacity::Bounded(0) {
            return Err(WiringError::InvalidConfiguration {
                name: self.name,
                reason: "unhandled task capacity must be positive".into(),
            });
        }

        let (local_counter, on_ramp, off_ramp) = self.build_counters()?;
        let insertion_is_blocking = (self.capacity.is_bounded() || self.external_back_pressure)
            && self.kind != TaskSchedulerType::NoOp
            && self.model.cycles.is_none();

        let executor = match (self.kind, &self.model.cycles) {
            (TaskSchedulerType::NoOp, _) => Executor::NoOp,
            (_, Some(cycles)) => Executor::Deterministic(Arc::clone(cycles)),
            (TaskSchedulerType::Sequential, None) => {
                let pool = self
                    .pool
                    .clone()
                    .unwrap_or_else(|| Arc::clone(&self.model.default_pool));
                Executor::Sequential(SequentialExecutor::new(pool))
            }
            (TaskSchedulerType::SequentialThread, None) => Executor::Thread(ThreadExecutor::new()),
        };

        let exception_handler = self
            .exception_handler
            .clone()
            .or_else(|| self.model.exception_handler.clone())
            .unwrap_or_else(default_exception_handler);

        let tracks = self.kind != TaskSchedulerType::NoOp;
        let core = Arc::new(SchedulerCore {
            name: self.name.clone(),
            kind: self.kind,
            capacity: self.capacity,
            local_counter,
            on_ramp,
            off_ramp,
            executor,
            flush_enabled: self.flushing_enabled,
            squelch_enabled: self.squelching_enabled,
            squelched: AtomicBool::new(false),
            insertion_is_blocking,
            exception_handler,
            lifecycle: Arc::clone(&self.model.lifecycle),
            metrics: Arc::clone(&self.model.metrics),
            busy_timer: (tracks && self.busy_fraction_metric).then(|| BusyTimer::new(Instant::now())),
            unhandled_task_metric: tracks && self.unhandled_task_metric,
        });

        self.model.register_scheduler(Arc::clone(&core))?;
        debug!(
            scheduler = %self.name,
            kind = %self.kind,
            capacity = %self.capacity,
            "built task scheduler"
        );

        Ok(TaskScheduler::new(core, Arc::downgrade(&self.model)))
    }

    /// Local counter: bounded if there is a capacity, tracking if something
    /// needs a count, none otherwise. External counters are ramped together
    /// with the local one.
    #[allow(clippy::type_complexity)]
    fn build_counters(
        &self,
    ) -> Result<
        (
            Option<Arc<dyn ObjectCounter>>,
            Arc<dyn ObjectCounter>,
            Arc<dyn ObjectCounter>,
        ),
        WiringError,
    > {
        if self.kind == TaskSchedulerType::NoOp {
            let noop: Arc<dyn ObjectCounter> = Arc::new(NoOpObjectCounter);
            return Ok((None, Arc::clone(&noop), noop));
        }

        let local: Option<Arc<dyn ObjectCounter>> = match self.capacity {
            Capacity::Bounded(capacity) => Some(Arc::new(BackpressureObjectCounter::new(
                self.name.clone(),
                capacity,
                self.sleep_duration,
            )?)),
            Capacity::Unlimited if self.unhandled_task_metric || self.flushing_enabled => {
                Some(Arc::new(StandardObjectCounter::new(self.sleep_duration)))
            }
            Capacity::Unlimited => None,
        };

        let combine = |external: &Option<Arc<dyn ObjectCounter>>| -> Arc<dyn ObjectCounter> {
            match (&local, external) {
                (Some(local), Some(external)) => Arc::new(MultiObjectCounter::new(
                    vec![Arc::clone(local), Arc::clone(external)],
                    self.sleep_duration,
                )),
                (Some(local), None) => Arc::clone(local),
                (None, Some(external)) => Arc::clone(external),
                (None, None) => Arc::new(NoOpObjectCounter),
            }
        };
        let on_ramp = combine(&self.on_ramp);
        let off_ramp = combine(&self.off_ramp);

        Ok((local, on_ramp, off_ramp))
    }
}
