//! Sampling granularity table.
//!
//! A granularity label (e.g. `1m`, `1hr`) decides three things at once: the
//! interval string sent upstream, how wide each bucket file is, and how many
//! rows a complete bucket file holds.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Upstream page cap. Every bucket must fit in a single request.
pub const MAX_ROWS_PER_REQUEST: usize = 1000;

/// Supported sampling intervals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Granularity {
    #[default]
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    FourHours,
    OneDay,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported interval '{label}' (valid: {})", Granularity::VALID_LABELS.join(", "))]
pub struct UnknownGranularity {
    pub label: String,
}

impl Granularity {
    pub const ALL: [Granularity; 7] = [
        Granularity::OneMinute,
        Granularity::FiveMinutes,
        Granularity::FifteenMinutes,
        Granularity::ThirtyMinutes,
        Granularity::OneHour,
        Granularity::FourHours,
        Granularity::OneDay,
    ];

    pub const VALID_LABELS: [&'static str; 9] =
        ["1m", "5m", "15m", "30m", "1h", "1hr", "4h", "4hr", "1d"];

    /// Parse a user-facing label. `1hr`/`4hr` are accepted as aliases.
    pub fn from_label(label: &str) -> Result<Self, UnknownGranularity> {
        match label.trim() {
            "1m" => Ok(Self::OneMinute),
            "5m" => Ok(Self::FiveMinutes),
            "15m" => Ok(Self::FifteenMinutes),
            "30m" => Ok(Self::ThirtyMinutes),
            "1h" | "1hr" => Ok(Self::OneHour),
            "4h" | "4hr" => Ok(Self::FourHours),
            "1d" => Ok(Self::OneDay),
            other => Err(UnknownGranularity {
                label: other.to_string(),
            }),
        }
    }

    /// Interval string understood by the upstream kline endpoint.
    pub fn upstream_interval(self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::ThirtyMinutes => "30m",
            Self::OneHour => "1h",
            Self::FourHours => "4h",
            Self::OneDay => "1d",
        }
    }

    /// Width of one bucket file, in hours.
    pub fn bucket_hours(self) -> i64 {
        match self {
            Self::OneMinute => 1,
            Self::FiveMinutes => 12,
            Self::FifteenMinutes => 24,
            Self::ThirtyMinutes => 48,
            Self::OneHour => 48,
            Self::FourHours => 192,
            Self::OneDay => 720,
        }
    }

    pub fn bucket_width(self) -> Duration {
        Duration::hours(self.bucket_hours())
    }

    /// Duration of one sample.
    pub fn sample_width(self) -> Duration {
        match self {
            Self::OneMinute => Duration::minutes(1),
            Self::FiveMinutes => Duration::minutes(5),
            Self::FifteenMinutes => Duration::minutes(15),
            Self::ThirtyMinutes => Duration::minutes(30),
            Self::OneHour => Duration::hours(1),
            Self::FourHours => Duration::hours(4),
            Self::OneDay => Duration::days(1),
        }
    }

    /// Rows a complete bucket file must contain.
    pub fn expected_rows(self) -> usize {
        (self.bucket_width().num_seconds() / self.sample_width().num_seconds()) as usize
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.upstream_interval())
    }
}

impl FromStr for Granularity {
    type Err = UnknownGranularity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s)
    }
}

impl TryFrom<String> for Granularity {
    type Error = UnknownGranularity;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_label(&value)
    }
}

impl From<Granularity> for String {
    fn from(value: Granularity) -> Self {
        value.upstream_interval().to_string()
    }
}
