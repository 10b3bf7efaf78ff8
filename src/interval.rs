use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The fixed set of throttling windows.
///
/// Variants are declared shortest first; the derived `Ord` is relied on
/// wherever intervals are walked in admission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThrottleInterval {
    QuarterMin,
    Hour,
    Day,
}

impl ThrottleInterval {
    pub const ALL: [ThrottleInterval; 3] = [
        ThrottleInterval::QuarterMin,
        ThrottleInterval::Hour,
        ThrottleInterval::Day,
    ];

    /// Window length in milliseconds
    pub const fn window_millis(self) -> u64 {
        match self {
            ThrottleInterval::QuarterMin => 15_000,
            ThrottleInterval::Hour => 3_600_000,
            ThrottleInterval::Day => 86_400_000,
        }
    }

    pub const fn period_seconds(self) -> u64 {
        self.window_millis() / 1000
    }

    pub fn window(self) -> Duration {
        Duration::from_millis(self.window_millis())
    }

    pub const fn name(self) -> &'static str {
        match self {
            ThrottleInterval::QuarterMin => "QUARTER_MIN",
            ThrottleInterval::Hour => "HOUR",
            ThrottleInterval::Day => "DAY",
        }
    }
}

impl fmt::Display for ThrottleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
