use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, SendError, Sender};
use tracing::{debug, error};

use crate::error::WiringError;

use super::engine::{SchedulerCore, Task};

enum ThreadMessage {
    Task(Task),
    Shutdown,
}

/// Runs a scheduler's tasks on a thread the scheduler owns.
///
/// Tasks admitted before the thread starts wait in the channel. On stop the
/// thread handles everything already admitted, then exits.
pub(crate) struct ThreadExecutor {
    sender: Sender<ThreadMessage>,
    receiver: Mutex<Option<Receiver<ThreadMessage>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadExecutor {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            handle: Mutex::new(None),
        }
    }

    pub(super) fn enqueue(&self, task: Task) -> Result<(), SendError<()>> {
        self.sender
            .send(ThreadMessage::Task(task))
            .map_err(|_| SendError(()))
    }

    pub(super) fn start(&self, core: &Arc<SchedulerCore>) -> Result<(), WiringError> {
        let receiver = {
            let mut slot = self.receiver.lock().unwrap_or_else(|e| e.into_inner());
            match slot.take() {
                Some(receiver) => receiver,
                None => return Ok(()),
            }
        };

        let worker_core = Arc::clone(core);
        let handle = thread::Builder::new()
            .name(core.name().to_string())
            .spawn(move || work(worker_core, receiver))
            .map_err(|source| WiringError::Spawn {
                name: core.name().to_string(),
                source,
            })?;

        if let Ok(mut slot) = self.handle.lock() {
            *slot = Some(handle);
        }
        Ok(())
    }

    pub(super) fn stop(&self, name: &str) {
        let handle = self.handle.lock().ok().and_then(|mut slot| slot.take());
        let Some(handle) = handle else {
            return;
        };
        if self.sender.send(ThreadMessage::Shutdown).is_err() {
            debug!(scheduler = name, "worker thread already gone");
        }
        // Stopped from one of its own tasks: the thread exits after this task.
        if handle.thread().id() == thread::current().id() {
            debug!(scheduler = name, "stop called on the worker thread, not joining");
            return;
        }
        if handle.join().is_err() {
            error!(scheduler = name, "worker thread panicked");
        }
    }
}

fn work(core: Arc<SchedulerCore>, receiver: Receiver<ThreadMessage>) {
    debug!(scheduler = core.name(), "worker thread started");

    while let Ok(message) = receiver.recv() {
        match message {
            ThreadMessage::Task(task) => core.run_task(task),
            ThreadMessage::Shutdown => break,
        }
    }

    // Handle whatever was admitted before the model stopped.
    while let Ok(message) = receiver.try_recv() {
        if let ThreadMessage::Task(task) = message {
            core.run_task(task);
        }
    }

    debug!(scheduler = core.name(), "worker thread stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, OnceLock, Weak};
    use std::time::{Duration, Instant};

    use crate::model::{ModelState, WiringModel};
    use crate::schedulers::TaskSchedulerType;

    #[test]
    fn runs_on_a_named_thread_and_drains_on_stop() {
        let model = WiringModel::builder()
            .with_health_monitor_enabled(false)
            .build()
            .unwrap();
        let scheduler = model
            .scheduler_builder::<()>("dedicated")
            .unwrap()
            .with_type(TaskSchedulerType::SequentialThread)
            .build()
            .unwrap();
        let input = scheduler.build_input_wire::<u64>("numbers");

        let handled = Arc::new(AtomicUsize::new(0));
        let wrong_thread = Arc::new(AtomicUsize::new(0));
        {
            let handled = handled.clone();
            let wrong_thread = wrong_thread.clone();
            input
                .bind_consumer(move |_| {
                    if std::thread::current().name() != Some("dedicated") {
                        wrong_thread.fetch_add(1, Ordering::SeqCst);
                    }
                    handled.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        // Admitted before start, held until the thread exists.
        for i in 0..10 {
            input.put(i).unwrap();
        }
        model.start().unwrap();
        for i in 10..100 {
            input.put(i).unwrap();
        }
        model.stop().unwrap();

        assert_eq!(handled.load(Ordering::SeqCst), 100);
        assert_eq!(wrong_thread.load(Ordering::SeqCst), 0);
        assert!(input.put(100).is_err());
    }

    #[test]
    fn a_task_may_stop_its_own_model() {
        let model = Arc::new(
            WiringModel::builder()
                .with_health_monitor_enabled(false)
                .build()
                .unwrap(),
        );
        let scheduler = model
            .scheduler_builder::<()>("stopper")
            .unwrap()
            .with_type(TaskSchedulerType::SequentialThread)
            .build()
            .unwrap();
        let input = scheduler.build_input_wire::<()>("stop requests");

        let slot: Arc<OnceLock<Weak<WiringModel>>> = Arc::new(OnceLock::new());
        let stopped = Arc::new(AtomicBool::new(false));
        {
            let slot = Arc::clone(&slot);
            let stopped = Arc::clone(&stopped);
            input
                .bind_consumer(move |_| {
                    if let Some(model) = slot.get().and_then(Weak::upgrade) {
                        model.stop().unwrap();
                        stopped.store(true, Ordering::SeqCst);
                    }
                })
                .unwrap();
        }
        slot.set(Arc::downgrade(&model)).unwrap();

        model.start().unwrap();
        input.put(()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !stopped.load(Ordering::SeqCst) {
            assert!(Instant::now() < deadline, "stop from the worker thread hung");
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(model.state(), ModelState::Stopped);
        assert!(input.put(()).is_err());
    }
}
