use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How a scheduler executes its tasks. Every model processes a scheduler's
/// tasks one at a time, in the order they were admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskSchedulerType {
    /// Tasks run as jobs on a shared worker pool, at most one per scheduler
    /// at any instant.
    Sequential,
    /// Tasks run on a thread owned by the scheduler for its whole lifetime.
    SequentialThread,
    /// Tasks are accepted and immediately discarded.
    NoOp,
}

impl TaskSchedulerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "SEQUENTIAL",
            Self::SequentialThread => "SEQUENTIAL_THREAD",
            Self::NoOp => "NO_OP",
        }
    }
}

impl fmt::Display for TaskSchedulerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskSchedulerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SEQUENTIAL" => Ok(Self::Sequential),
            "SEQUENTIAL_THREAD" => Ok(Self::SequentialThread),
            "NO_OP" => Ok(Self::NoOp),
            other => Err(format!(
                "unknown scheduler type '{other}', expected SEQUENTIAL, SEQUENTIAL_THREAD or NO_OP"
            )),
        }
    }
}

/// Number of unhandled tasks a scheduler admits before `put` blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capacity {
    /// No local backpressure.
    Unlimited,
    /// At most this many tasks in flight (outside of injection).
    Bounded(u64),
}

/// Shorthand for [`Capacity::Unlimited`].
pub const UNLIMITED_CAPACITY: Capacity = Capacity::Unlimited;

impl Capacity {
    pub fn is_bounded(&self) -> bool {
        matches!(self, Self::Bounded(_))
    }

    pub fn bound(&self) -> Option<u64> {
        match self {
            Self::Bounded(n) => Some(*n),
            Self::Unlimited => None,
        }
    }

    /// Whether `count` in-flight tasks fit within this capacity.
    pub fn admits(&self, count: i64) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Bounded(n) => count <= i64::try_from(*n).unwrap_or(i64::MAX),
        }
    }
}

impl From<u64> for Capacity {
    fn from(n: u64) -> Self {
        Self::Bounded(n)
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unlimited => f.write_str("UNLIMITED"),
            Self::Bounded(n) => write!(f, "{n}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_type_round_trips_through_strings() {
        for kind in [
            TaskSchedulerType::Sequential,
            TaskSchedulerType::SequentialThread,
            TaskSchedulerType::NoOp,
        ] {
            assert_eq!(kind.to_string().parse::<TaskSchedulerType>(), Ok(kind));
        }
        assert!("sequential".parse::<TaskSchedulerType>().is_err());
        assert!("DIRECT".parse::<TaskSchedulerType>().is_err());
    }

    #[test]
    fn capacity_admits() {
        assert!(UNLIMITED_CAPACITY.admits(i64::MAX));
        assert!(!UNLIMITED_CAPACITY.is_bounded());

        let cap = Capacity::from(11);
        assert!(cap.admits(11));
        assert!(!cap.admits(12));
        assert_eq!(cap.bound(), Some(11));
        assert_eq!(cap.to_string(), "11");
    }
}
