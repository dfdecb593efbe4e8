//! Canonical in-memory representation of a kline (OHLC bar) and its chart projections.
//!
//! Every provider normalizes into [`Bar`]: epoch-second timestamps and `f64` prices,
//! whatever the wire format looked like. What a chart actually receives is a
//! [`SeriesItem`], derived from a `Bar` through a
//! [`Representation`](crate::models::session_params::Representation).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single OHLC sample for one time bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bucket start, unix seconds.
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// The single-value projection of a [`Bar`] used by area charts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub time: i64,
    pub value: f64,
}

/// What a chart series is fed with: a full candle or a reduced point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SeriesItem {
    Candle(Bar),
    Point(Point),
}

impl SeriesItem {
    pub fn time(&self) -> i64 {
        match self {
            SeriesItem::Candle(b) => b.time,
            SeriesItem::Point(p) => p.time,
        }
    }
}

impl Bar {
    pub const fn new(time: i64, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
        }
    }

    /// Builds a bar from an exchange timestamp in milliseconds.
    pub fn from_millis(time_ms: i64, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self::new(time_ms.div_euclid(1000), open, high, low, close)
    }

    /// The bucket start as a UTC datetime, if representable.
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(self.time, 0)
    }

    pub fn to_point(&self) -> Point {
        Point {
            time: self.time,
            value: self.close,
        }
    }

    /// Runs the bar through an [`OhlcPolicy`], returning the bar to use or why it was refused.
    pub fn sanitize(self, policy: OhlcPolicy) -> Result<Bar, BarRejected> {
        for (field, value) in [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ] {
            if !value.is_finite() {
                return Err(BarRejected::NonFinite { field });
            }
            if value < 0.0 {
                return Err(BarRejected::Negative { field, value });
            }
        }

        let body_hi = self.open.max(self.close);
        let body_lo = self.open.min(self.close);
        if self.high >= body_hi && self.low <= body_lo {
            return Ok(self);
        }

        match policy {
            OhlcPolicy::Reject => Err(BarRejected::Inverted {
                low: self.low,
                high: self.high,
            }),
            OhlcPolicy::Clamp => Ok(Bar {
                high: self.high.max(body_hi),
                low: self.low.min(body_lo),
                ..self
            }),
        }
    }
}

/// How to treat a bar whose high/low do not bracket its open/close.
///
/// Non-finite and negative prices are refused under either policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OhlcPolicy {
    #[default]
    Reject,
    Clamp,
}

/// Why a bar was refused by [`Bar::sanitize`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BarRejected {
    #[error("{field} is not a finite number")]
    NonFinite { field: &'static str },

    #[error("{field} is negative ({value})")]
    Negative { field: &'static str, value: f64 },

    #[error("high/low do not bracket open/close (low={low}, high={high})")]
    Inverted { low: f64, high: f64 },
}
