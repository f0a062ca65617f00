use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use super::{wait_until, ObjectCounter};

/// An unbounded counter that tracks its count. Used when a scheduler has no
/// capacity but still needs the unprocessed-task metric or flushing.
#[derive(Debug)]
pub struct StandardObjectCounter {
    count: AtomicI64,
    sleep_duration: Duration,
}

impl StandardObjectCounter {
    pub fn new(sleep_duration: Duration) -> Self {
        Self {
            count: AtomicI64::new(0),
            sleep_duration,
        }
    }
}

impl ObjectCounter for StandardObjectCounter {
    fn on_ramp(&self, _keep_waiting: &dyn Fn() -> bool) -> bool {
        self.force_on_ramp();
        true
    }

    fn attempt_on_ramp(&self) -> bool {
        self.force_on_ramp();
        true
    }

    fn force_on_ramp(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    fn off_ramp(&self) {
        self.count.fetch_sub(1, Ordering::AcqRel);
    }

    fn count(&self) -> i64 {
        self.count.load(Ordering::Acquire)
    }

    fn wait_until_empty(&self, keep_waiting: &dyn Fn() -> bool) -> bool {
        wait_until(self.sleep_duration, keep_waiting, || self.count() == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_blocks_and_tracks() {
        let c = StandardObjectCounter::new(Duration::from_millis(1));
        assert_eq!(c.count(), 0);
        for _ in 0..1000 {
            assert!(c.attempt_on_ramp());
        }
        assert!(c.on_ramp(&|| false));
        assert_eq!(c.count(), 1001);
        for _ in 0..1001 {
            c.off_ramp();
        }
        assert!(c.wait_until_empty(&|| false));
    }
}
