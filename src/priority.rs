use serde::{Deserialize, Serialize};
use std::fmt;

/// Priority tag carried by every bus message, 1 (lowest) to 5 (highest).
///
/// Priority is metadata only: the dispatch worker consumes its queue in FIFO
/// order regardless of this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Priority(u8);

impl Priority {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub const LOW: Priority = Priority(1);
    pub const NORMAL: Priority = Priority(3);
    pub const HIGH: Priority = Priority(5);

    /// Build a priority, rejecting values outside 1..=5
    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Priority(value))
    }

    /// Build a priority from arbitrary caller input, clamping into range
    pub fn clamped(value: i64) -> Self {
        let clamped = value.clamp(Self::MIN as i64, Self::MAX as i64) as u8;
        if clamped as i64 != value {
            tracing::warn!(
                requested = value,
                applied = clamped,
                "Priority out of range, clamped"
            );
        }
        Priority(clamped)
    }

    /// Get the numeric priority value
    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::LOW
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Priority::new(value).ok_or_else(|| {
            format!(
                "priority {value} outside {}..={}",
                Priority::MIN,
                Priority::MAX
            )
        })
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}
