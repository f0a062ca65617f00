use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::error;

use crate::error::TaskFailure;

/// Callback receiving every task failure of a scheduler.
pub type UncaughtExceptionHandler = Arc<dyn Fn(&TaskFailure) + Send + Sync>;

/// Logs the failure and moves on.
pub fn default_exception_handler() -> UncaughtExceptionHandler {
    Arc::new(|failure: &TaskFailure| {
        error!(
            scheduler = %failure.scheduler,
            input_wire = %failure.input_wire,
            error = %failure.error,
            "uncaught exception while handling task"
        );
    })
}

/// Deliver a failure. A handler that itself panics is logged, never propagated
/// into the worker running the scheduler.
pub(crate) fn deliver(handler: &UncaughtExceptionHandler, failure: &TaskFailure) {
    if panic::catch_unwind(AssertUnwindSafe(|| handler(failure))).is_err() {
        error!(
            scheduler = %failure.scheduler,
            error = %failure.error,
            "uncaught exception handler panicked"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::TaskError;

    fn failure() -> TaskFailure {
        TaskFailure {
            scheduler: "s".into(),
            input_wire: "w".into(),
            error: TaskError::Panicked("boom".into()),
        }
    }

    #[test]
    fn delivers_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler: UncaughtExceptionHandler = {
            let calls = Arc::clone(&calls);
            Arc::new(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
        };
        deliver(&handler, &failure());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_handler_is_contained() {
        let handler: UncaughtExceptionHandler = Arc::new(|_| panic!("handler of handlers"));
        deliver(&handler, &failure());
        deliver(&default_exception_handler(), &failure());
    }
}
