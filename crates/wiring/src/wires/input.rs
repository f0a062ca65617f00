use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, Weak};

use crate::error::{HandlerError, TaskError, WiringError};
use crate::schedulers::engine::{SchedulerCore, Task};

use super::output::OutputWire;

/// Every handler kind is normalised into this shape when it is bound.
type BoxedHandler<I, O> = Box<dyn FnMut(I) -> Result<Option<O>, HandlerError> + Send>;

pub(crate) struct InputWireInner<I, O> {
    label: Arc<str>,
    scheduler: Arc<SchedulerCore>,
    output: OutputWire<O>,
    handler: OnceLock<Mutex<BoxedHandler<I, O>>>,
}

/// Type-erased view the model keeps of every input wire it has built.
pub(crate) trait WireBinding: Send + Sync {
    fn scheduler_name(&self) -> &str;
    fn label(&self) -> &str;
    fn is_bound(&self) -> bool;
}

impl<I: Send + 'static, O: Send + 'static> WireBinding for InputWireInner<I, O> {
    fn scheduler_name(&self) -> &str {
        self.scheduler.name()
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn is_bound(&self) -> bool {
        self.handler.get().is_some()
    }
}

impl<I, O: Clone + Send + 'static> InputWireInner<I, O> {
    fn handle(&self, item: I) -> Result<(), TaskError> {
        let handler = self.handler.get().ok_or(TaskError::Unbound)?;
        let result = {
            let mut guard = handler.lock().unwrap_or_else(|e| e.into_inner());
            let f = &mut *guard;
            f(item)
        };
        match result {
            Ok(Some(output)) => {
                self.output.forward(output);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => Err(TaskError::Failed(e)),
        }
    }
}

/// Entry point of a scheduler. Items put here become tasks of the owning
/// scheduler, which hands each one to the bound handler; a handler's
/// non-`None` result goes out on the scheduler's primary output wire.
pub struct InputWire<I, O> {
    inner: Arc<InputWireInner<I, O>>,
}

impl<I, O> Clone for InputWire<I, O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I, O> fmt::Debug for InputWire<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputWire")
            .field("scheduler", &self.inner.scheduler.name())
            .field("label", &&*self.inner.label)
            .field("bound", &self.inner.handler.get().is_some())
            .finish()
    }
}

impl<I, O> InputWire<I, O> {
    pub fn name(&self) -> &str {
        &self.inner.label
    }

    pub fn scheduler_name(&self) -> &str {
        self.inner.scheduler.name()
    }

    pub fn is_bound(&self) -> bool {
        self.inner.handler.get().is_some()
    }

    pub(crate) fn downgrade(&self) -> WeakInputWire<I, O> {
        WeakInputWire {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl<I: Send + 'static, O: Clone + Send + 'static> InputWire<I, O> {
    pub(crate) fn new(
        label: impl Into<String>,
        scheduler: Arc<SchedulerCore>,
        output: OutputWire<O>,
    ) -> Self {
        let label: String = label.into();
        Self {
            inner: Arc::new(InputWireInner {
                label: Arc::from(label),
                scheduler,
                output,
                handler: OnceLock::new(),
            }),
        }
    }

    pub(crate) fn binding(&self) -> Arc<dyn WireBinding> {
        Arc::clone(&self.inner) as Arc<dyn WireBinding>
    }

    // ── Binding ──────────────────────────────────────────────────────

    /// Bind a transforming handler. Returning `None` forwards nothing.
    pub fn bind<F>(&self, mut f: F) -> Result<(), WiringError>
    where
        F: FnMut(I) -> Option<O> + Send + 'static,
    {
        self.bind_boxed(Box::new(move |item: I| Ok(f(item))))
    }

    /// Bind a handler that never produces output.
    pub fn bind_consumer<F>(&self, mut f: F) -> Result<(), WiringError>
    where
        F: FnMut(I) + Send + 'static,
    {
        self.bind_boxed(Box::new(move |item: I| {
            f(item);
            Ok(None)
        }))
    }

    /// Bind a transforming handler that may fail. An `Err` is reported to the
    /// scheduler's uncaught exception handler like a panic would be.
    pub fn bind_fallible<F, E>(&self, mut f: F) -> Result<(), WiringError>
    where
        F: FnMut(I) -> Result<Option<O>, E> + Send + 'static,
        E: Into<HandlerError>,
    {
        self.bind_boxed(Box::new(
            move |item: I| -> Result<Option<O>, HandlerError> { f(item).map_err(Into::into) },
        ))
    }

    fn bind_boxed(&self, handler: BoxedHandler<I, O>) -> Result<(), WiringError> {
        self.inner
            .handler
            .set(Mutex::new(handler))
            .map_err(|_| {
                WiringError::AlreadyBound(format!(
                    "{}/{}",
                    self.inner.scheduler.name(),
                    self.inner.label
                ))
            })
    }

    // ── Submission ───────────────────────────────────────────────────

    /// Submit an item, waiting for capacity if the scheduler is full.
    pub fn put(&self, item: I) -> Result<(), WiringError> {
        self.inner.scheduler.put(self.task(item))
    }

    /// Submit an item only if the scheduler has capacity right now. Returns
    /// `Ok(false)` and drops the item otherwise.
    pub fn offer(&self, item: I) -> Result<bool, WiringError> {
        self.inner.scheduler.offer(self.task(item))
    }

    /// Submit an item regardless of capacity.
    pub fn inject(&self, item: I) -> Result<(), WiringError> {
        self.inner.scheduler.inject(self.task(item))
    }

    fn task(&self, item: I) -> Task {
        let inner = Arc::clone(&self.inner);
        Task::new(Arc::clone(&self.inner.label), move || inner.handle(item))
    }
}

/// Non-owning handle held by solder edges.
pub(crate) struct WeakInputWire<I, O> {
    inner: Weak<InputWireInner<I, O>>,
}

impl<I, O> WeakInputWire<I, O> {
    pub(crate) fn upgrade(&self) -> Option<InputWire<I, O>> {
        self.inner.upgrade().map(|inner| InputWire { inner })
    }
}
