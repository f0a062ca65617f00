use std::fmt;
use std::sync::{Arc, Weak};

use crate::error::WiringError;
use crate::model::ModelShared;
use crate::wires::{InputWire, OutputWire};

use super::engine::SchedulerCore;
use super::types::{Capacity, TaskSchedulerType};

/// Handle to a scheduler whose handlers produce `O`.
///
/// Cheap to clone; every clone refers to the same scheduler.
pub struct TaskScheduler<O> {
    core: Arc<SchedulerCore>,
    output: OutputWire<O>,
    model: Weak<ModelShared>,
}

impl<O> Clone for TaskScheduler<O> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            output: self.output.clone(),
            model: Weak::clone(&self.model),
        }
    }
}

impl<O> fmt::Debug for TaskScheduler<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("name", &self.core.name())
            .field("type", &self.core.kind())
            .field("capacity", &self.core.capacity())
            .finish()
    }
}

impl<O: Clone + Send + 'static> TaskScheduler<O> {
    pub(crate) fn new(core: Arc<SchedulerCore>, model: Weak<ModelShared>) -> Self {
        let output = OutputWire::new(core.name(), Weak::clone(&model));
        Self {
            core,
            output,
            model,
        }
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    pub fn scheduler_type(&self) -> TaskSchedulerType {
        self.core.kind()
    }

    pub fn capacity(&self) -> Capacity {
        self.core.capacity()
    }

    /// Whether a `put` into this scheduler can block.
    pub fn insertion_is_blocking(&self) -> bool {
        self.core.insertion_is_blocking()
    }

    /// Tasks admitted but not yet handled, or `-1` if nothing counts them.
    pub fn unprocessed_task_count(&self) -> i64 {
        self.core.unprocessed_task_count()
    }

    // ── Wires ────────────────────────────────────────────────────────

    /// Create a new input wire. All input wires of a scheduler share its
    /// single ordered task queue.
    pub fn build_input_wire<I: Send + 'static>(&self, label: impl Into<String>) -> InputWire<I, O> {
        let wire = InputWire::new(label, Arc::clone(&self.core), self.output.clone());
        if let Some(model) = self.model.upgrade() {
            model.register_input_wire(wire.binding());
        }
        wire
    }

    /// The wire carrying handler results.
    pub fn output_wire(&self) -> OutputWire<O> {
        self.output.clone()
    }

    /// An extra output wire for handlers to [`OutputWire::forward`] into
    /// directly, any number of times per task.
    pub fn build_secondary_output_wire<T: Clone + Send + 'static>(&self) -> OutputWire<T> {
        OutputWire::new(self.core.name(), Weak::clone(&self.model))
    }

    // ── Control ──────────────────────────────────────────────────────

    /// Block until every task admitted so far has been handled.
    pub fn flush(&self) -> Result<(), WiringError> {
        self.core.flush()
    }

    /// Keep accepting tasks but skip their handlers.
    pub fn start_squelching(&self) -> Result<(), WiringError> {
        self.core.set_squelching(true)
    }

    pub fn stop_squelching(&self) -> Result<(), WiringError> {
        self.core.set_squelching(false)
    }

    pub fn is_squelched(&self) -> bool {
        self.core.is_squelched()
    }
}
