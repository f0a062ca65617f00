use crate::error::WiringError;
use crate::model::validate_scheduler_name;

use super::types::WiringConfig;

impl WiringConfig {
    /// Validate the config: scheduler names and model timings.
    pub fn validate(&self) -> Result<(), WiringError> {
        self.validate_scheduler_names()?;
        self.validate_health_monitor()?;
        Ok(())
    }

    fn validate_scheduler_names(&self) -> Result<(), WiringError> {
        for name in self.schedulers.keys() {
            validate_scheduler_name(name).map_err(|_| {
                WiringError::Config(format!(
                    "scheduler '{name}' has an illegal name, use only [A-Za-z0-9_]"
                ))
            })?;
        }
        Ok(())
    }

    /// An enabled monitor needs a positive capacity and period.
    fn validate_health_monitor(&self) -> Result<(), WiringError> {
        let model = &self.model;
        if !model.health_monitor_enabled {
            return Ok(());
        }
        if model.health_monitor_capacity == 0 {
            return Err(WiringError::Config(
                "health_monitor_capacity must be positive".into(),
            ));
        }
        if model.health_monitor_period_ms == 0 {
            return Err(WiringError::Config(
                "health_monitor_period_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}
