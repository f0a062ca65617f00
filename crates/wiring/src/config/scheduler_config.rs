use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WiringError;
use crate::schedulers::{Capacity, TaskSchedulerType};

/// Scheduler settings in compact string form, e.g.
/// `"SEQUENTIAL_THREAD CAPACITY(500) FLUSHABLE UNHANDLED_TASK_METRIC"`.
///
/// Tokens are separated by whitespace and may appear in any order:
///
/// | Token | Meaning |
/// |---|---|
/// | `SEQUENTIAL`, `SEQUENTIAL_THREAD`, `NO_OP` | scheduler type |
/// | `CAPACITY(n)` | unhandled task capacity, `n > 0` |
/// | `FLUSHABLE` / `!FLUSHABLE` | flushing enabled / disabled |
/// | `SQUELCHABLE` / `!SQUELCHABLE` | squelching enabled / disabled |
/// | `UNHANDLED_TASK_METRIC` / `!UNHANDLED_TASK_METRIC` | unprocessed task gauge |
/// | `BUSY_FRACTION_METRIC` / `!BUSY_FRACTION_METRIC` | busy fraction gauge |
///
/// Anything not mentioned is left at the builder's value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskSchedulerConfiguration {
    pub kind: Option<TaskSchedulerType>,
    pub capacity: Option<Capacity>,
    pub flushing_enabled: Option<bool>,
    pub squelching_enabled: Option<bool>,
    pub unhandled_task_metric_enabled: Option<bool>,
    pub busy_fraction_metric_enabled: Option<bool>,
}

const FLUSHABLE: &str = "FLUSHABLE";
const SQUELCHABLE: &str = "SQUELCHABLE";
const UNHANDLED_TASK_METRIC: &str = "UNHANDLED_TASK_METRIC";
const BUSY_FRACTION_METRIC: &str = "BUSY_FRACTION_METRIC";

impl TaskSchedulerConfiguration {
    /// Parse the compact form.
    pub fn parse(s: &str) -> Result<Self, WiringError> {
        let mut config = Self::default();

        for token in s.split_whitespace() {
            if let Ok(kind) = token.parse::<TaskSchedulerType>() {
                config.kind = Some(kind);
                continue;
            }
            if let Some(inner) = token
                .strip_prefix("CAPACITY(")
                .and_then(|rest| rest.strip_suffix(')'))
            {
                let capacity = inner
                    .parse::<u64>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| invalid(s, format!("bad capacity '{inner}'")))?;
                config.capacity = Some(Capacity::Bounded(capacity));
                continue;
            }

            let (enabled, flag) = match token.strip_prefix('!') {
                Some(flag) => (false, flag),
                None => (true, token),
            };
            let slot = match flag {
                FLUSHABLE => &mut config.flushing_enabled,
                SQUELCHABLE => &mut config.squelching_enabled,
                UNHANDLED_TASK_METRIC => &mut config.unhandled_task_metric_enabled,
                BUSY_FRACTION_METRIC => &mut config.busy_fraction_metric_enabled,
                _ => return Err(invalid(s, format!("unknown token '{token}'"))),
            };
            *slot = Some(enabled);
        }

        Ok(config)
    }
}

fn invalid(input: &str, reason: String) -> WiringError {
    WiringError::Config(format!("scheduler configuration '{input}': {reason}"))
}

impl FromStr for TaskSchedulerConfiguration {
    type Err = WiringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TaskSchedulerConfiguration {
    type Error = WiringError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<TaskSchedulerConfiguration> for String {
    fn from(config: TaskSchedulerConfiguration) -> Self {
        config.to_string()
    }
}

impl fmt::Display for TaskSchedulerConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tokens: Vec<String> = Vec::new();
        if let Some(kind) = self.kind {
            tokens.push(kind.to_string());
        }
        if let Some(Capacity::Bounded(n)) = self.capacity {
            tokens.push(format!("CAPACITY({n})"));
        }
        for (flag, value) in [
            (FLUSHABLE, self.flushing_enabled),
            (SQUELCHABLE, self.squelching_enabled),
            (UNHANDLED_TASK_METRIC, self.unhandled_task_metric_enabled),
            (BUSY_FRACTION_METRIC, self.busy_fraction_metric_enabled),
        ] {
            match value {
                Some(true) => tokens.push(flag.to_string()),
                Some(false) => tokens.push(format!("!{flag}")),
                None => {}
            }
        }
        f.write_str(&tokens.join(" "))
    }
}
