use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, trace};

use crate::counters::ObjectCounter;
use crate::error::{TaskError, TaskFailure, WiringError};
use crate::metrics::{BusyTimer, MetricsSink};
use crate::model::deterministic::CycleDriver;
use crate::model::health::MonitoredScheduler;
use crate::model::lifecycle::Lifecycle;

use super::exceptions::{self, UncaughtExceptionHandler};
use super::sequential::SequentialExecutor;
use super::thread::ThreadExecutor;
use super::types::{Capacity, TaskSchedulerType};

/// One admitted unit of work: a handler invocation bound to its input item.
pub(crate) struct Task {
    wire: Arc<str>,
    run: Box<dyn FnOnce() -> Result<(), TaskError> + Send>,
}

impl Task {
    pub(crate) fn new(
        wire: Arc<str>,
        run: impl FnOnce() -> Result<(), TaskError> + Send + 'static,
    ) -> Self {
        Self {
            wire,
            run: Box::new(run),
        }
    }
}

/// Where admitted tasks go.
pub(crate) enum Executor {
    Sequential(SequentialExecutor),
    Thread(ThreadExecutor),
    /// Queued for the next tick of a deterministic model.
    Deterministic(Arc<CycleDriver>),
    NoOp,
}

/// Type-independent state of a scheduler, shared by the scheduler handle, its
/// input wires and whichever worker is currently running one of its tasks.
pub(crate) struct SchedulerCore {
    pub(super) name: String,
    pub(super) kind: TaskSchedulerType,
    pub(super) capacity: Capacity,
    /// Counter tracking only this scheduler's tasks, if any is needed.
    pub(super) local_counter: Option<Arc<dyn ObjectCounter>>,
    pub(super) on_ramp: Arc<dyn ObjectCounter>,
    pub(super) off_ramp: Arc<dyn ObjectCounter>,
    pub(super) executor: Executor,
    pub(super) flush_enabled: bool,
    pub(super) squelch_enabled: bool,
    pub(super) squelched: AtomicBool,
    pub(super) insertion_is_blocking: bool,
    pub(super) exception_handler: UncaughtExceptionHandler,
    pub(super) lifecycle: Arc<Lifecycle>,
    pub(super) metrics: Arc<dyn MetricsSink>,
    pub(super) busy_timer: Option<BusyTimer>,
    pub(super) unhandled_task_metric: bool,
}

impl SchedulerCore {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn kind(&self) -> TaskSchedulerType {
        self.kind
    }

    pub(crate) fn capacity(&self) -> Capacity {
        self.capacity
    }

    pub(crate) fn insertion_is_blocking(&self) -> bool {
        self.insertion_is_blocking
    }

    /// Tasks admitted and not yet handled; `-1` when nothing tracks them.
    pub(crate) fn unprocessed_task_count(&self) -> i64 {
        match &self.local_counter {
            Some(counter) => counter.count(),
            None => self.on_ramp.count(),
        }
    }

    // ── Submission ───────────────────────────────────────────────────

    /// Admit a task, blocking while the on-ramp counter is at capacity.
    pub(crate) fn put(self: &Arc<Self>, task: Task) -> Result<(), WiringError> {
        self.ensure_accepting()?;
        if matches!(self.executor, Executor::Deterministic(_)) {
            // Only the next tick makes room, so waiting here would never end.
            self.on_ramp.force_on_ramp();
            return self.enqueue(task);
        }
        let lifecycle = &self.lifecycle;
        if !self.on_ramp.on_ramp(&|| lifecycle.accepts_work()) {
            return Err(self.stopped());
        }
        self.enqueue(task)
    }

    /// Admit a task only if there is capacity right now.
    pub(crate) fn offer(self: &Arc<Self>, task: Task) -> Result<bool, WiringError> {
        self.ensure_accepting()?;
        if !self.on_ramp.attempt_on_ramp() {
            trace!(scheduler = %self.name, "offer rejected, scheduler at capacity");
            return Ok(false);
        }
        self.enqueue(task).map(|()| true)
    }

    /// Admit a task regardless of capacity.
    pub(crate) fn inject(self: &Arc<Self>, task: Task) -> Result<(), WiringError> {
        self.ensure_accepting()?;
        self.on_ramp.force_on_ramp();
        self.enqueue(task)
    }

    fn ensure_accepting(&self) -> Result<(), WiringError> {
        if self.lifecycle.accepts_work() {
            Ok(())
        } else {
            Err(self.stopped())
        }
    }

    fn stopped(&self) -> WiringError {
        WiringError::Stopped(self.name.clone())
    }

    fn enqueue(self: &Arc<Self>, task: Task) -> Result<(), WiringError> {
        self.report_unprocessed();
        match &self.executor {
            Executor::Sequential(executor) => {
                executor.enqueue(self, task);
                Ok(())
            }
            Executor::Thread(executor) => executor.enqueue(task).map_err(|_| {
                self.off_ramp.off_ramp();
                self.stopped()
            }),
            Executor::Deterministic(cycles) => {
                let core = Arc::clone(self);
                cycles.submit(move || core.run_task(task));
                Ok(())
            }
            Executor::NoOp => {
                drop(task);
                self.off_ramp.off_ramp();
                Ok(())
            }
        }
    }

    // ── Execution ────────────────────────────────────────────────────

    /// Run one admitted task on the current thread, then off-ramp it.
    pub(crate) fn run_task(&self, task: Task) {
        let Task { wire, run } = task;

        if self.squelched.load(Ordering::Acquire) {
            trace!(scheduler = %self.name, wire = %wire, "task discarded while squelched");
            drop(run);
        } else {
            if let Some(timer) = &self.busy_timer {
                timer.activate(Instant::now());
            }
            let outcome = panic::catch_unwind(AssertUnwindSafe(run))
                .unwrap_or_else(|payload| Err(TaskError::from_panic(payload)));
            if let Some(timer) = &self.busy_timer {
                timer.deactivate(Instant::now());
            }

            if let Err(error) = outcome {
                let failure = TaskFailure {
                    scheduler: self.name.clone(),
                    input_wire: wire.to_string(),
                    error,
                };
                exceptions::deliver(&self.exception_handler, &failure);
            }
        }

        self.off_ramp.off_ramp();

        if let Some(timer) = &self.busy_timer {
            self.metrics
                .record_busy_fraction(&self.name, timer.take_fraction(Instant::now()));
        }
        self.report_unprocessed();
    }

    fn report_unprocessed(&self) {
        if self.unhandled_task_metric {
            self.metrics
                .record_unprocessed_tasks(&self.name, self.unprocessed_task_count());
        }
    }

    // ── Control ──────────────────────────────────────────────────────

    /// Block until every task admitted so far has been handled.
    pub(crate) fn flush(&self) -> Result<(), WiringError> {
        if !self.flush_enabled {
            return Err(WiringError::Unsupported {
                scheduler: self.name.clone(),
                operation: "flush",
            });
        }
        let counter = self.local_counter.as_ref().unwrap_or(&self.off_ramp);
        if matches!(self.executor, Executor::Deterministic(_)) {
            return if counter.count() <= 0 {
                Ok(())
            } else {
                Err(WiringError::PendingTick(self.name.clone()))
            };
        }
        let lifecycle = &self.lifecycle;
        if counter.wait_until_empty(&|| lifecycle.accepts_work()) {
            Ok(())
        } else {
            Err(self.stopped())
        }
    }

    pub(crate) fn set_squelching(&self, squelch: bool) -> Result<(), WiringError> {
        if !self.squelch_enabled {
            return Err(WiringError::Unsupported {
                scheduler: self.name.clone(),
                operation: "squelching",
            });
        }
        self.squelched.store(squelch, Ordering::Release);
        debug!(scheduler = %self.name, squelch, "squelching changed");
        Ok(())
    }

    pub(crate) fn is_squelched(&self) -> bool {
        self.squelched.load(Ordering::Acquire)
    }

    /// Start the dedicated thread, if this scheduler owns one.
    pub(crate) fn start(self: &Arc<Self>) -> Result<(), WiringError> {
        match &self.executor {
            Executor::Thread(executor) => executor.start(self),
            _ => Ok(()),
        }
    }

    /// Drain and join the dedicated thread, if this scheduler owns one.
    pub(crate) fn stop(&self) {
        if let Executor::Thread(executor) = &self.executor {
            executor.stop(&self.name);
        }
    }
}

impl MonitoredScheduler for SchedulerCore {
    fn name(&self) -> &str {
        &self.name
    }

    fn capacity(&self) -> Capacity {
        self.capacity
    }

    fn unprocessed_task_count(&self) -> i64 {
        SchedulerCore::unprocessed_task_count(self)
    }
}
