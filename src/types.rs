use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Priority tier a task is queued under.
///
/// Each tier has its own FIFO queue; worker pools are bound to one or more
/// tiers, so lower tiers keep making progress through their own workers
/// rather than through preemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    High,
    Medium,
    Low,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::High, Level::Medium, Level::Low];

    pub fn as_str(self) -> &'static str {
        match self {
            Level::High => "high",
            Level::Medium => "medium",
            Level::Low => "low",
        }
    }
}

impl Default for Level {
    fn default() -> Self {
        Level::Medium
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" => Ok(Level::High),
            "medium" => Ok(Level::Medium),
            "low" => Ok(Level::Low),
            other => Err(format!(
                "invalid level: {other} (expected \"high\", \"medium\" or \"low\")"
            )),
        }
    }
}

/// Which half of a spread a leaf was captured on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Rotation applied to a freshly captured leaf on this side.
    pub fn default_rotation(self) -> i32 {
        match self {
            Side::Left => -90,
            Side::Right => 90,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => f.write_str("LEFT"),
            Side::Right => f.write_str("RIGHT"),
        }
    }
}
