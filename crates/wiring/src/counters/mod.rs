//! In-flight task counters, the backpressure primitive of the framework.
//!
//! A scheduler on-ramps a task into its on-ramp counter when the task is
//! admitted and off-ramps it from its off-ramp counter once the task has been
//! handled (or skipped while squelched). Counters are plain shared objects:
//! several schedulers may hold the same `Arc<dyn ObjectCounter>` to form one
//! capacity domain spanning a whole sub-pipeline.
//!
//! Waiting is done by sleep-and-recheck rather than by signalling. A caller
//! that is running a job of a [`crate::WorkerPool`] starts a compensating
//! thread for the duration of the wait, so a stage blocked on a full
//! downstream stage never holds the pool slot that downstream stage needs
//! to drain.

mod backpressure;
mod multi;
mod noop;
mod standard;

use std::thread;
use std::time::Duration;

pub use backpressure::BackpressureObjectCounter;
pub use multi::MultiObjectCounter;
pub use noop::NoOpObjectCounter;
pub use standard::StandardObjectCounter;

use crate::schedulers::Compensation;

/// Default interval between capacity re-checks of a blocked caller.
pub const DEFAULT_SLEEP_DURATION: Duration = Duration::from_micros(100);

/// Counts objects that have entered a scheduling domain but not yet left it.
pub trait ObjectCounter: Send + Sync {
    /// Count one more object, blocking while the counter is at capacity.
    ///
    /// `keep_waiting` is polled between capacity checks; once it returns
    /// `false` the wait is abandoned and nothing is counted. Returns whether
    /// the object was counted.
    fn on_ramp(&self, keep_waiting: &dyn Fn() -> bool) -> bool;

    /// Count one more object if there is capacity, without blocking.
    fn attempt_on_ramp(&self) -> bool;

    /// Count one more object, ignoring capacity.
    fn force_on_ramp(&self);

    /// Stop counting one object.
    fn off_ramp(&self);

    /// Current number of counted objects, or `-1` if this counter does not track.
    fn count(&self) -> i64;

    /// Block until the count reaches zero. Same `keep_waiting` contract as
    /// [`ObjectCounter::on_ramp`]; returns whether zero was observed.
    fn wait_until_empty(&self, keep_waiting: &dyn Fn() -> bool) -> bool;
}

/// Sleep-and-recheck until `ready` holds or `keep_waiting` gives up.
/// Returns whether `ready` was observed.
pub(crate) fn wait_until(
    sleep: Duration,
    keep_waiting: &dyn Fn() -> bool,
    mut ready: impl FnMut() -> bool,
) -> bool {
    if ready() {
        return true;
    }
    // Compensate from the second round on; most waits end after one.
    let mut rounds = 0u32;
    let mut _compensation = None;
    loop {
        if !keep_waiting() {
            return false;
        }
        if rounds == 1 {
            _compensation = Compensation::begin(sleep);
        }
        rounds = rounds.saturating_add(1);
        thread::sleep(sleep);
        if ready() {
            return true;
        }
    }
}
