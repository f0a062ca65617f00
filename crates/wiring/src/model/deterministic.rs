use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{error, trace};

use crate::wires::OutputWire;

type Work = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Cycles {
    current: Vec<Work>,
    next: Vec<Work>,
}

struct TickedHeartbeat {
    period: Duration,
    next_due: Option<Instant>,
    wire: OutputWire<Instant>,
}

/// Runs every scheduler of a deterministic model on the caller of
/// [`crate::WiringModel::tick`], in cycles.
///
/// Work submitted at any time is queued for the cycle after the current one,
/// so an item handled in cycle `n` is handled downstream in cycle `n + 1`.
/// Heartbeats fire from a logical clock that only moves when told to.
pub(crate) struct CycleDriver {
    cycles: Mutex<Cycles>,
    clock: Mutex<Instant>,
    heartbeats: Mutex<Vec<TickedHeartbeat>>,
    ticking: Mutex<u64>,
}

impl CycleDriver {
    pub(crate) fn new(epoch: Instant) -> Self {
        Self {
            cycles: Mutex::new(Cycles::default()),
            clock: Mutex::new(epoch),
            heartbeats: Mutex::new(Vec::new()),
            ticking: Mutex::new(0),
        }
    }

    pub(crate) fn submit(&self, work: impl FnOnce() + Send + 'static) {
        let mut cycles = self.cycles.lock().unwrap_or_else(|e| e.into_inner());
        cycles.next.push(Box::new(work));
    }

    pub(crate) fn add_heartbeat(&self, period: Duration, wire: OutputWire<Instant>) {
        let mut heartbeats = self.heartbeats.lock().unwrap_or_else(|e| e.into_inner());
        heartbeats.push(TickedHeartbeat {
            period,
            next_due: None,
            wire,
        });
    }

    /// Schedule the first beat of every heartbeat one period from now.
    pub(crate) fn start(&self) {
        let now = self.now();
        let mut heartbeats = self.heartbeats.lock().unwrap_or_else(|e| e.into_inner());
        for heartbeat in heartbeats.iter_mut() {
            heartbeat.next_due = Some(now + heartbeat.period);
        }
    }

    pub(crate) fn now(&self) -> Instant {
        *self.clock.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn advance(&self, elapsed: Duration) {
        let mut clock = self.clock.lock().unwrap_or_else(|e| e.into_inner());
        *clock += elapsed;
    }

    /// Work queued for the current or the next cycle.
    pub(crate) fn pending(&self) -> usize {
        self.cycles
            .lock()
            .map(|c| c.current.len() + c.next.len())
            .unwrap_or_default()
    }

    /// Run the current cycle, fire due heartbeats, then promote the next
    /// cycle. Returns how many work items ran.
    pub(crate) fn tick(&self) -> usize {
        let mut tick = self.ticking.lock().unwrap_or_else(|e| e.into_inner());
        *tick += 1;

        let current = {
            let mut cycles = self.cycles.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut cycles.current)
        };
        let ran = current.len();
        for work in current {
            work();
        }

        self.beat();

        let mut cycles = self.cycles.lock().unwrap_or_else(|e| e.into_inner());
        cycles.current = std::mem::take(&mut cycles.next);
        trace!(tick = *tick, ran, queued = cycles.current.len(), "tick finished");
        ran
    }

    /// Drop all queued work. Breaks the reference cycle between queued work
    /// and the schedulers it belongs to.
    pub(crate) fn clear(&self) {
        let dropped = {
            let mut cycles = self.cycles.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *cycles)
        };
        drop(dropped);
    }

    fn beat(&self) {
        let now = self.now();
        let due: Vec<OutputWire<Instant>> = {
            let mut heartbeats = self.heartbeats.lock().unwrap_or_else(|e| e.into_inner());
            heartbeats
                .iter_mut()
                .filter_map(|heartbeat| {
                    let next_due = heartbeat.next_due?;
                    if next_due > now {
                        return None;
                    }
                    let mut following = next_due + heartbeat.period;
                    if following <= now {
                        following = now + heartbeat.period;
                    }
                    heartbeat.next_due = Some(following);
                    Some(heartbeat.wire.clone())
                })
                .collect()
        };

        for wire in due {
            if panic::catch_unwind(AssertUnwindSafe(|| wire.forward(now))).is_err() {
                error!("heartbeat destination panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn work_runs_one_cycle_after_submission() {
        let driver = Arc::new(CycleDriver::new(Instant::now()));
        let log = Arc::new(Mutex::new(Vec::new()));

        {
            let driver_ref = Arc::clone(&driver);
            let log = Arc::clone(&log);
            driver.submit(move || {
                log.lock().unwrap().push("first");
                let log = Arc::clone(&log);
                driver_ref.submit(move || log.lock().unwrap().push("second"));
            });
        }

        // Submitted between ticks: queued behind the cycle that is already next.
        assert_eq!(driver.tick(), 0);
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(driver.tick(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["first"]);
        assert_eq!(driver.pending(), 1);

        // Submitted during a tick: runs in the very next one.
        assert_eq!(driver.tick(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(driver.pending(), 0);

        // Queued work refers back to the driver; clearing breaks the cycle.
        driver.submit(|| {});
        driver.clear();
        assert_eq!(driver.pending(), 0);
    }

    #[test]
    fn clock_only_moves_when_advanced() {
        let epoch = Instant::now();
        let driver = CycleDriver::new(epoch);
        driver.tick();
        assert_eq!(driver.now(), epoch);
        driver.advance(Duration::from_millis(25));
        assert_eq!(driver.now(), epoch + Duration::from_millis(25));
    }
}
