use super::ObjectCounter;

/// A counter that counts nothing. Reports `-1` as its count.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpObjectCounter;

impl ObjectCounter for NoOpObjectCounter {
    fn on_ramp(&self, _keep_waiting: &dyn Fn() -> bool) -> bool {
        true
    }

    fn attempt_on_ramp(&self) -> bool {
        true
    }

    fn force_on_ramp(&self) {}

    fn off_ramp(&self) {}

    fn count(&self) -> i64 {
        -1
    }

    fn wait_until_empty(&self, _keep_waiting: &dyn Fn() -> bool) -> bool {
        true
    }
}
