use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error};

use crate::error::WiringError;
use crate::wires::OutputWire;

/// Vertex name of every heartbeat wire in the wiring graph.
pub const HEARTBEAT_NAME: &str = "Heartbeat";

struct Heartbeat {
    period: Duration,
    wire: OutputWire<Instant>,
}

/// One thread driving every heartbeat wire of a model.
#[derive(Default)]
pub(crate) struct HeartbeatScheduler {
    pending: Mutex<Vec<Heartbeat>>,
    stop: Mutex<Option<Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatScheduler {
    pub(crate) fn add(&self, period: Duration, wire: OutputWire<Instant>) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.push(Heartbeat { period, wire });
        }
    }

    pub(crate) fn start(&self) -> Result<(), WiringError> {
        let heartbeats = match self.pending.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(_) => return Ok(()),
        };
        if heartbeats.is_empty() {
            return Ok(());
        }

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let handle = thread::Builder::new()
            .name(HEARTBEAT_NAME.to_string())
            .spawn(move || beat(heartbeats, stop_rx))
            .map_err(|source| WiringError::Spawn {
                name: HEARTBEAT_NAME.to_string(),
                source,
            })?;

        if let Ok(mut slot) = self.stop.lock() {
            *slot = Some(stop_tx);
        }
        if let Ok(mut slot) = self.handle.lock() {
            *slot = Some(handle);
        }
        Ok(())
    }

    pub(crate) fn stop(&self) {
        // Dropping the sender disconnects the channel and wakes the thread.
        if let Ok(mut slot) = self.stop.lock() {
            slot.take();
        }
        let handle = self.handle.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("heartbeat thread panicked");
            }
        }
    }
}

fn beat(heartbeats: Vec<Heartbeat>, stop: Receiver<()>) {
    debug!(wires = heartbeats.len(), "heartbeat thread started");

    let start = Instant::now();
    let mut next_due: Vec<Instant> = heartbeats.iter().map(|h| start + h.period).collect();

    loop {
        let now = Instant::now();
        let Some(earliest) = next_due.iter().min().copied() else {
            break;
        };

        if earliest > now {
            match stop.recv_timeout(earliest - now) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        for (heartbeat, due) in heartbeats.iter().zip(next_due.iter_mut()) {
            if *due > now {
                continue;
            }
            let sent = panic::catch_unwind(AssertUnwindSafe(|| heartbeat.wire.forward(now)));
            if sent.is_err() {
                error!("heartbeat destination panicked");
            }
            *due += heartbeat.period;
            if *due <= now {
                // Fell behind, skip the missed beats.
                *due = now + heartbeat.period;
            }
        }
    }

    debug!("heartbeat thread stopped");
}
