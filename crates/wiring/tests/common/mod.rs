//! Shared helpers for the wiring integration tests.

#![allow(dead_code)]

use std::sync::{Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use ledger_wiring::{TaskSchedulerType, WiringModel};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Both scheduler types that actually run tasks.
pub const RUNNING_TYPES: [TaskSchedulerType; 2] = [
    TaskSchedulerType::Sequential,
    TaskSchedulerType::SequentialThread,
];

/// A model without the health monitor, so only the schedulers under test exist.
pub fn quiet_model() -> WiringModel {
    model_with_pool(4)
}

pub fn model_with_pool(threads: usize) -> WiringModel {
    WiringModel::builder()
        .with_default_pool_size(threads)
        .with_health_monitor_enabled(false)
        .build()
        .expect("model builds")
}

/// Poll `cond` until it holds or `timeout` elapses.
pub fn assert_eventually(cond: impl Fn() -> bool, timeout: Duration, msg: &str) {
    let deadline = Instant::now() + timeout;
    while !cond() {
        if Instant::now() > deadline {
            panic!("condition not met within {timeout:?}: {msg}");
        }
        thread::sleep(Duration::from_millis(1));
    }
}

/// Assert `cond` stays false for the whole of `window`.
pub fn assert_never(cond: impl Fn() -> bool, window: Duration, msg: &str) {
    let deadline = Instant::now() + window;
    while Instant::now() < deadline {
        assert!(!cond(), "{msg}");
        thread::sleep(Duration::from_millis(1));
    }
}

/// Order-sensitive accumulator step. Two sequences hash equal only if the
/// same values were seen in the same order.
pub fn hash_step(acc: i64, x: i64) -> i64 {
    acc.wrapping_mul(31).wrapping_add(x)
}

/// A one-shot latch handlers can park on.
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        let mut open = self.open.lock().unwrap();
        *open = true;
        self.cond.notify_all();
    }

    /// Wait for the gate to open. Panics after [`TIMEOUT`].
    pub fn wait(&self) {
        let open = self.open.lock().unwrap();
        let (open, result) = self
            .cond
            .wait_timeout_while(open, TIMEOUT, |open| !*open)
            .unwrap();
        assert!(*open && !result.timed_out(), "gate was never opened");
    }
}
