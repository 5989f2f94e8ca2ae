use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Supported time bucket intervals for OHLC data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1H")]
    OneHour,
    #[serde(rename = "4H")]
    FourHours,
    #[serde(rename = "1D")]
    OneDay,
    #[serde(rename = "1W")]
    OneWeek,
    #[serde(rename = "1M")]
    OneMonth,
}

impl Interval {
    pub const ALL: [Self; 9] = [
        Self::OneMinute,
        Self::FiveMinutes,
        Self::FifteenMinutes,
        Self::ThirtyMinutes,
        Self::OneHour,
        Self::FourHours,
        Self::OneDay,
        Self::OneWeek,
        Self::OneMonth,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::ThirtyMinutes => "30m",
            Self::OneHour => "1H",
            Self::FourHours => "4H",
            Self::OneDay => "1D",
            Self::OneWeek => "1W",
            Self::OneMonth => "1M",
        }
    }

    /// Bucket width in minutes for intraday intervals.
    pub const fn minutes(self) -> Option<i64> {
        match self {
            Self::OneMinute => Some(1),
            Self::FiveMinutes => Some(5),
            Self::FifteenMinutes => Some(15),
            Self::ThirtyMinutes => Some(30),
            Self::OneHour => Some(60),
            Self::FourHours => Some(240),
            Self::OneDay | Self::OneWeek | Self::OneMonth => None,
        }
    }

    pub const fn is_intraday(self) -> bool {
        self.minutes().is_some()
    }
}

impl Default for Interval {
    fn default() -> Self {
        Self::OneDay
    }
}

impl Display for Interval {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        // Month is the only case-sensitive spelling: `M`/`1M` versus `m`/`1m`.
        if trimmed == "M" || trimmed == "1M" {
            return Ok(Self::OneMonth);
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "m" | "minute" | "1m" => Ok(Self::OneMinute),
            "5m" => Ok(Self::FiveMinutes),
            "15m" => Ok(Self::FifteenMinutes),
            "30m" => Ok(Self::ThirtyMinutes),
            "h" | "hour" | "1h" => Ok(Self::OneHour),
            "4h" => Ok(Self::FourHours),
            "d" | "day" | "1d" => Ok(Self::OneDay),
            "w" | "week" | "1w" => Ok(Self::OneWeek),
            "month" => Ok(Self::OneMonth),
            _ => Err(ValidationError::InvalidInterval {
                value: trimmed.to_owned(),
            }),
        }
    }
}
