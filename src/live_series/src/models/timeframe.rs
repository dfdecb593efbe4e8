use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeframeError {
    #[error("Unknown timeframe {0:?} (expected one of 1D, 1M, 3M, 1Y)")]
    UnknownTimeframe(String),

    #[error("Unknown interval {0:?} (expected one of 1m, 1h, 1d, 1w)")]
    UnknownInterval(String),
}

/// Exchange kline interval, i.e. the width of one bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "1w")]
    OneWeek,
}

impl Interval {
    pub const ALL: [Interval; 4] = [
        Interval::OneMinute,
        Interval::OneHour,
        Interval::OneDay,
        Interval::OneWeek,
    ];

    /// The code the exchange understands (`interval=` query value, `@kline_<code>` stream suffix).
    pub const fn code(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::OneHour => "1h",
            Interval::OneDay => "1d",
            Interval::OneWeek => "1w",
        }
    }

    pub const fn seconds(&self) -> i64 {
        match self {
            Interval::OneMinute => 60,
            Interval::OneHour => 60 * 60,
            Interval::OneDay => 24 * 60 * 60,
            Interval::OneWeek => 7 * 24 * 60 * 60,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Interval {
    type Err = TimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Interval::ALL
            .into_iter()
            .find(|i| i.code() == s.trim())
            .ok_or_else(|| TimeframeError::UnknownInterval(s.to_string()))
    }
}

/// The horizon a user picks for the chart. Each maps to the interval its history is sampled at.
///
/// Labels are case-sensitive: `1M` is one month, never one minute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[default]
    #[serde(rename = "1D")]
    OneDay,
    #[serde(rename = "1M")]
    OneMonth,
    #[serde(rename = "3M")]
    ThreeMonths,
    #[serde(rename = "1Y")]
    OneYear,
}

impl Timeframe {
    pub const ALL: [Timeframe; 4] = [
        Timeframe::OneDay,
        Timeframe::OneMonth,
        Timeframe::ThreeMonths,
        Timeframe::OneYear,
    ];

    pub const fn label(&self) -> &'static str {
        match self {
            Timeframe::OneDay => "1D",
            Timeframe::OneMonth => "1M",
            Timeframe::ThreeMonths => "3M",
            Timeframe::OneYear => "1Y",
        }
    }

    pub const fn interval(&self) -> Interval {
        match self {
            Timeframe::OneDay => Interval::OneHour,
            Timeframe::OneMonth => Interval::OneDay,
            Timeframe::ThreeMonths | Timeframe::OneYear => Interval::OneWeek,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Timeframe {
    type Err = TimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::ALL
            .into_iter()
            .find(|tf| tf.label() == s.trim())
            .ok_or_else(|| TimeframeError::UnknownTimeframe(s.to_string()))
    }
}
