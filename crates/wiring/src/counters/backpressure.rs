use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use crate::error::WiringError;

use super::{wait_until, ObjectCounter};

/// A counter with a hard capacity. Blocking and attempted on-ramps never push
/// the count past the capacity; forced on-ramps may.
#[derive(Debug)]
pub struct BackpressureObjectCounter {
    name: String,
    capacity: i64,
    count: AtomicI64,
    sleep_duration: Duration,
}

impl BackpressureObjectCounter {
    /// Create a counter. `capacity` must be positive.
    pub fn new(
        name: impl Into<String>,
        capacity: u64,
        sleep_duration: Duration,
    ) -> Result<Self, WiringError> {
        let name = name.into();
        let capacity = i64::try_from(capacity)
            .ok()
            .filter(|c| *c > 0)
            .ok_or_else(|| WiringError::InvalidConfiguration {
                name: name.clone(),
                reason: format!("counter capacity must be positive, got {capacity}"),
            })?;

        Ok(Self {
            name,
            capacity,
            count: AtomicI64::new(0),
            sleep_duration,
        })
    }

    /// Name used in log output.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maximum count admitted by blocking and attempted on-ramps.
    pub fn capacity(&self) -> u64 {
        self.capacity as u64
    }
}

impl ObjectCounter for BackpressureObjectCounter {
    fn on_ramp(&self, keep_waiting: &dyn Fn() -> bool) -> bool {
        wait_until(self.sleep_duration, keep_waiting, || self.attempt_on_ramp())
    }

    fn attempt_on_ramp(&self) -> bool {
        let mut current = self.count.load(Ordering::Acquire);
        loop {
            if current >= self.capacity {
                return false;
            }
            match self.count.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    fn force_on_ramp(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    fn off_ramp(&self) {
        let previous = self.count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "counter '{}' off-ramped below zero", self.name);
    }

    fn count(&self) -> i64 {
        self.count.load(Ordering::Acquire)
    }

    fn wait_until_empty(&self, keep_waiting: &dyn Fn() -> bool) -> bool {
        wait_until(self.sleep_duration, keep_waiting, || self.count() == 0)
    }
}
