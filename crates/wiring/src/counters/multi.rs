use std::sync::Arc;
use std::time::Duration;

use super::{wait_until, ObjectCounter};

/// Ramps several counters as one. An object is admitted only if every counter
/// admits it, so the most restrictive counter governs. The first counter is
/// the one whose count is reported.
pub struct MultiObjectCounter {
    counters: Vec<Arc<dyn ObjectCounter>>,
    sleep_duration: Duration,
}

impl MultiObjectCounter {
    pub fn new(counters: Vec<Arc<dyn ObjectCounter>>, sleep_duration: Duration) -> Self {
        Self {
            counters,
            sleep_duration,
        }
    }
}

impl ObjectCounter for MultiObjectCounter {
    fn on_ramp(&self, keep_waiting: &dyn Fn() -> bool) -> bool {
        wait_until(self.sleep_duration, keep_waiting, || self.attempt_on_ramp())
    }

    fn attempt_on_ramp(&self) -> bool {
        for (admitted, counter) in self.counters.iter().enumerate() {
            if !counter.attempt_on_ramp() {
                for undo in &self.counters[..admitted] {
                    undo.off_ramp();
                }
                return false;
            }
        }
        true
    }

    fn force_on_ramp(&self) {
        for counter in &self.counters {
            counter.force_on_ramp();
        }
    }

    fn off_ramp(&self) {
        for counter in &self.counters {
            counter.off_ramp();
        }
    }

    fn count(&self) -> i64 {
        self.counters.first().map_or(-1, |c| c.count())
    }

    fn wait_until_empty(&self, keep_waiting: &dyn Fn() -> bool) -> bool {
        self.counters
            .first()
            .map_or(true, |c| c.wait_until_empty(keep_waiting))
    }
}
