//! Task schedulers: the processing units of a wiring model.
//!
//! A scheduler accepts tasks through its input wires, runs them strictly one
//! at a time in admission order, and forwards results through its output
//! wires. Build one with [`crate::WiringModel::scheduler_builder`].

mod builder;
pub(crate) mod engine;
mod exceptions;
mod pool;
mod scheduler;
mod sequential;
mod thread;
mod types;

pub use builder::TaskSchedulerBuilder;
pub use exceptions::{default_exception_handler, UncaughtExceptionHandler};
pub(crate) use pool::Compensation;
pub use pool::WorkerPool;
pub use scheduler::TaskScheduler;
pub use types::{Capacity, TaskSchedulerType, UNLIMITED_CAPACITY};
