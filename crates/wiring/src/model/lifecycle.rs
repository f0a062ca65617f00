use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::WiringError;

/// Lifecycle state of a wiring model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    /// Being configured. Schedulers, wires and solder edges may be added.
    Init,
    /// Started. Configuration is frozen.
    Running,
    /// Stopped. No new work is accepted.
    Stopped,
}

const INIT: u8 = 0;
const RUNNING: u8 = 1;
const STOPPED: u8 = 2;

/// Shared by a model and everything it owns.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(INIT),
        }
    }

    pub(crate) fn state(&self) -> ModelState {
        match self.state.load(Ordering::Acquire) {
            INIT => ModelState::Init,
            RUNNING => ModelState::Running,
            _ => ModelState::Stopped,
        }
    }

    /// Work submitted before start is queued; only a stopped model refuses it.
    pub(crate) fn accepts_work(&self) -> bool {
        self.state.load(Ordering::Acquire) != STOPPED
    }

    pub(crate) fn ensure_configurable(&self) -> Result<(), WiringError> {
        match self.state() {
            ModelState::Init => Ok(()),
            _ => Err(WiringError::AlreadyStarted),
        }
    }

    pub(crate) fn mark_started(&self) -> Result<(), WiringError> {
        self.state
            .compare_exchange(INIT, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| WiringError::AlreadyStarted)
    }

    pub(crate) fn mark_stopped(&self) -> Result<(), WiringError> {
        self.state
            .compare_exchange(RUNNING, STOPPED, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| WiringError::NotStarted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_in_order_only() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), ModelState::Init);
        assert!(lifecycle.accepts_work());
        assert!(lifecycle.ensure_configurable().is_ok());
        assert!(matches!(lifecycle.mark_stopped(), Err(WiringError::NotStarted)));

        lifecycle.mark_started().unwrap();
        assert_eq!(lifecycle.state(), ModelState::Running);
        assert!(matches!(lifecycle.ensure_configurable(), Err(WiringError::AlreadyStarted)));
        assert!(matches!(lifecycle.mark_started(), Err(WiringError::AlreadyStarted)));

        lifecycle.mark_stopped().unwrap();
        assert_eq!(lifecycle.state(), ModelState::Stopped);
        assert!(!lifecycle.accepts_work());
        assert!(matches!(lifecycle.mark_stopped(), Err(WiringError::NotStarted)));
    }
}
