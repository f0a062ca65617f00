//! Task scheduling and dataflow wiring for pipelines of independently
//! scheduled stages.
//!
//! A [`WiringModel`] owns a set of [`TaskScheduler`]s. Each scheduler handles
//! its tasks strictly in order, one at a time, either on a shared worker pool
//! or on a thread of its own. Schedulers are connected by soldering an
//! [`OutputWire`] to an [`InputWire`]; bounded capacities and shared
//! [`ObjectCounter`]s apply backpressure across the whole graph.
//!
//! ```ignore
//! let model = WiringModel::new()?;
//! let doubler = model
//!     .scheduler_builder::<u64>("doubler")?
//!     .with_unhandled_task_capacity(100)
//!     .build()?;
//! let input = doubler.build_input_wire::<u64>("numbers");
//! input.bind(|n| Some(n * 2))?;
//! doubler.output_wire().solder_to_fn("print", "doubled", |n| println!("{n}"))?;
//!
//! model.start()?;
//! input.put(21)?;
//! ```

pub mod config;
pub mod counters;
pub mod error;
pub mod metrics;
pub mod model;
pub mod schedulers;
pub mod wires;

pub use config::{ModelConfig, TaskSchedulerConfiguration, WiringConfig};
pub use counters::{
    BackpressureObjectCounter, MultiObjectCounter, NoOpObjectCounter, ObjectCounter,
    StandardObjectCounter,
};
pub use error::{HandlerError, TaskError, TaskFailure, WiringError};
pub use metrics::{InMemoryMetrics, MetricsSink, MetricsSnapshot, NoOpMetrics};
pub use model::{ModelState, WiringModel, WiringModelBuilder};
pub use schedulers::{
    Capacity, TaskScheduler, TaskSchedulerBuilder, TaskSchedulerType, WorkerPool,
};
pub use wires::{InputWire, OutputWire, SolderType};
