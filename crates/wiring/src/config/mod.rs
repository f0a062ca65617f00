//! TOML configuration for wiring models and schedulers.

mod loading;
mod scheduler_config;
mod types;
mod validation;


pub use scheduler_config::TaskSchedulerConfiguration;
pub use types::{ModelConfig, WiringConfig};
