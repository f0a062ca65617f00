use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, warn};

use crate::error::WiringError;

type Job = Box<dyn FnOnce() + Send>;

thread_local! {
    /// The pool whose job this thread is running, if any.
    static CURRENT_POOL: RefCell<Option<Arc<WorkerPool>>> = const { RefCell::new(None) };
}

/// The worker pool `SEQUENTIAL` schedulers run their tasks on.
///
/// Jobs wait in a queue of their own; the rayon pool only supplies threads
/// that each pop and run one job. A job that blocks on backpressure hands
/// its slot over to a compensating thread (see [`Compensation`]) instead of
/// running other jobs on its own stack, so a blocked job never ends up
/// underneath the job it is waiting for.
pub struct WorkerPool {
    pool: Arc<ThreadPool>,
    ready: Mutex<VecDeque<Job>>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.pool.current_num_threads())
            .field("queued", &self.queued())
            .finish()
    }
}

impl WorkerPool {
    /// A pool of `threads` named worker threads.
    pub fn new(threads: usize) -> Result<Self, WiringError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("wiring-pool-{i}"))
            .build()?;
        Ok(Self::from_pool(Arc::new(pool)))
    }

    /// Run jobs on the threads of an existing rayon pool.
    pub fn from_pool(pool: Arc<ThreadPool>) -> Self {
        Self {
            pool,
            ready: Mutex::new(VecDeque::new()),
        }
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Jobs submitted but not yet picked up by any thread.
    pub fn queued(&self) -> usize {
        self.ready.lock().map(|q| q.len()).unwrap_or_default()
    }

    pub(crate) fn submit(self: &Arc<Self>, job: impl FnOnce() + Send + 'static) {
        self.ready
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Box::new(job));
        let this = Arc::clone(self);
        self.pool.spawn(move || {
            this.run_one();
        });
    }

    /// Pop and run one queued job. Returns `false` if there was none.
    fn run_one(self: &Arc<Self>) -> bool {
        let job = self
            .ready
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        let Some(job) = job else {
            return false;
        };

        let previous = CURRENT_POOL.with(|current| current.replace(Some(Arc::clone(self))));
        let _restore = RestoreCurrent(previous);
        job();
        true
    }
}

struct RestoreCurrent(Option<Arc<WorkerPool>>);

impl Drop for RestoreCurrent {
    fn drop(&mut self) {
        let previous = self.0.take();
        CURRENT_POOL.with(|current| *current.borrow_mut() = previous);
    }
}

/// Keeps a pool at full strength while one of its jobs is blocked.
///
/// Begun by a pool job that is about to wait for capacity: a helper thread
/// runs queued jobs of the same pool until the guard is dropped. Outside a
/// pool job this does nothing. The helper finishes the job it is running
/// when the guard drops and exits on its own.
pub(crate) struct Compensation {
    done: Arc<AtomicBool>,
}

impl Compensation {
    pub(crate) fn begin(idle: Duration) -> Option<Self> {
        let pool = CURRENT_POOL.with(|current| current.borrow().clone())?;
        let done = Arc::new(AtomicBool::new(false));
        let helper_done = Arc::clone(&done);
        let spawned = thread::Builder::new()
            .name("wiring-compensator".into())
            .spawn(move || {
                while !helper_done.load(Ordering::Acquire) {
                    if !pool.run_one() {
                        thread::sleep(idle);
                    }
                }
            });

        match spawned {
            Ok(_) => {
                debug!("pool job blocked, started compensating thread");
                Some(Self { done })
            }
            Err(e) => {
                warn!(error = %e, "could not start compensating thread");
                None
            }
        }
    }
}

impl Drop for Compensation {
    fn drop(&mut self) {
        self.done.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn compensation_is_a_no_op_outside_the_pool() {
        assert!(Compensation::begin(Duration::from_millis(1)).is_none());
    }

    #[test]
    fn blocked_job_lets_queued_jobs_run_elsewhere() {
        let pool = Arc::new(WorkerPool::new(1).unwrap());
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel::<&'static str>();

        let blocked_done = done_tx.clone();
        pool.submit(move || {
            let _compensation = Compensation::begin(Duration::from_millis(1));
            release_rx.recv().unwrap();
            blocked_done.send("blocked").unwrap();
        });
        pool.submit(move || done_tx.send("queued").unwrap());

        // The only pool thread is parked, yet the second job still runs.
        assert_eq!(
            done_rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            "queued"
        );
        release_tx.send(()).unwrap();
        assert_eq!(
            done_rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            "blocked"
        );
    }
}
