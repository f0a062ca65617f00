use std::fmt;

use thiserror::Error;

/// Errors reported synchronously by configuration and lifecycle calls.
#[derive(Debug, Error)]
pub enum WiringError {
    #[error("illegal scheduler name '{0}': names must be non-empty and use only [A-Za-z0-9_]")]
    InvalidName(String),

    #[error("a scheduler named '{0}' already exists in this model")]
    DuplicateName(String),

    #[error("invalid configuration for '{name}': {reason}")]
    InvalidConfiguration { name: String, reason: String },

    #[error("{operation} is not enabled for scheduler '{scheduler}'")]
    Unsupported {
        scheduler: String,
        operation: &'static str,
    },

    #[error("input wire '{0}' already has a bound handler")]
    AlreadyBound(String),

    #[error("wiring model has already been started")]
    AlreadyStarted,

    #[error("wiring model has not been started")]
    NotStarted,

    #[error("scheduler '{0}' no longer accepts work, the wiring model is stopped")]
    Stopped(String),

    #[error("wiring model is not deterministic, it cannot be ticked")]
    NotDeterministic,

    #[error("scheduler '{0}' has tasks waiting for a tick, tick the model instead of flushing")]
    PendingTick(String),

    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("failed to spawn worker thread for '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),
}

/// Error type a fallible handler may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Why a single task did not complete normally.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("handler panicked: {0}")]
    Panicked(String),

    #[error("handler failed: {0}")]
    Failed(HandlerError),

    #[error("no handler is bound")]
    Unbound,
}

/// A failed task together with where it failed. Delivered to the scheduler's
/// uncaught exception handler exactly once per failing task.
#[derive(Debug)]
pub struct TaskFailure {
    pub scheduler: String,
    pub input_wire: String,
    pub error: TaskError,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "task on {}/{} failed: {}",
            self.scheduler, self.input_wire, self.error
        )
    }
}

impl TaskError {
    /// Convert a caught panic payload into a readable error.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        TaskError::Panicked(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_become_messages() {
        let err = TaskError::from_panic(Box::new("boom"));
        assert_eq!(err.to_string(), "handler panicked: boom");

        let err = TaskError::from_panic(Box::new(String::from("owned boom")));
        assert_eq!(err.to_string(), "handler panicked: owned boom");

        let err = TaskError::from_panic(Box::new(42_u32));
        assert_eq!(err.to_string(), "handler panicked: non-string panic payload");
    }

    #[test]
    fn failure_display_names_location() {
        let failure = TaskFailure {
            scheduler: "hasher".into(),
            input_wire: "events".into(),
            error: TaskError::Unbound,
        };
        assert_eq!(failure.to_string(), "task on hasher/events failed: no handler is bound");
    }
}
