use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The lifetimes a caller may pick for a secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtlChoice {
    Hour,
    Day,
    Week,
}

impl TtlChoice {
    pub const ALL: [TtlChoice; 3] = [TtlChoice::Hour, TtlChoice::Day, TtlChoice::Week];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
        }
    }
}

impl fmt::Display for TtlChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown ttl '{0}' (expected hour, day or week)")]
pub struct UnknownTtl(pub String);

impl FromStr for TtlChoice {
    type Err = UnknownTtl;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hour" => Ok(Self::Hour),
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            _ => Err(UnknownTtl(s.to_owned())),
        }
    }
}

/// Maps each [`TtlChoice`] to a concrete lifetime. Injected into the HTTP
/// layer so tests and deployments can shorten or stretch the windows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlPolicy {
    pub hour: Duration,
    pub day: Duration,
    pub week: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            hour: Duration::from_secs(3600),
            day: Duration::from_secs(86400),
            week: Duration::from_secs(604800),
        }
    }
}

impl TtlPolicy {
    pub fn duration(&self, choice: TtlChoice) -> Duration {
        match choice {
            TtlChoice::Hour => self.hour,
            TtlChoice::Day => self.day,
            TtlChoice::Week => self.week,
        }
    }
}
