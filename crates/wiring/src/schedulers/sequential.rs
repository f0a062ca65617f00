use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::engine::{Executor, SchedulerCore, Task};
use super::pool::WorkerPool;

#[derive(Default)]
struct Queue {
    tasks: VecDeque<Task>,
    /// A job for this scheduler is queued on, or running in, the pool.
    scheduled: bool,
}

/// Runs a scheduler's tasks on a shared pool, one job at a time.
///
/// At most one job per scheduler exists in the pool; that job handles the
/// task at the head of the queue and, once done, re-submits itself if more
/// tasks are waiting. Admission order is handling order, and the next task
/// starts only after the previous one has completed.
pub(crate) struct SequentialExecutor {
    pool: Arc<WorkerPool>,
    queue: Mutex<Queue>,
}

impl SequentialExecutor {
    pub(crate) fn new(pool: Arc<WorkerPool>) -> Self {
        Self {
            pool,
            queue: Mutex::new(Queue::default()),
        }
    }

    pub(super) fn enqueue(&self, core: &Arc<SchedulerCore>, task: Task) {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        queue.tasks.push_back(task);
        if !queue.scheduled {
            queue.scheduled = true;
            self.spawn(Arc::clone(core));
        }
    }

    fn spawn(&self, core: Arc<SchedulerCore>) {
        self.pool.submit(move || run_next(core));
    }
}

fn run_next(core: Arc<SchedulerCore>) {
    let Executor::Sequential(executor) = &core.executor else {
        return;
    };

    let next = {
        let mut queue = executor.queue.lock().unwrap_or_else(|e| e.into_inner());
        let next = queue.tasks.pop_front();
        if next.is_none() {
            queue.scheduled = false;
        }
        next
    };
    let Some(task) = next else {
        return;
    };

    core.run_task(task);

    let mut queue = executor.queue.lock().unwrap_or_else(|e| e.into_inner());
    if queue.tasks.is_empty() {
        queue.scheduled = false;
    } else {
        executor.spawn(Arc::clone(&core));
    }
}
