use serde::{Deserialize, Serialize};

use crate::models::{instrument::Symbol, timeframe::Interval};

/// Number of samples requested when nothing else is configured.
pub const DEFAULT_HISTORY_LIMIT: u32 = 365;

/// Largest `limit` the klines endpoint accepts.
pub const MAX_HISTORY_LIMIT: u32 = 1000;

/// Parameters for a one-shot historical klines request.
///
/// This is the standard input for every
/// [`HistoricalProvider`](crate::providers::HistoricalProvider) implementation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KlinesRequestParams {
    /// Instrument to request (e.g. `BTCUSDT`).
    pub symbol: Symbol,

    /// Width of each bar.
    pub interval: Interval,

    /// How many of the most recent samples to return.
    ///
    /// Always within `1..=MAX_HISTORY_LIMIT`; [`KlinesRequestParams::new`] clamps it.
    pub limit: u32,
}

impl KlinesRequestParams {
    pub fn new(symbol: Symbol, interval: Interval, limit: u32) -> Self {
        Self {
            symbol,
            interval,
            limit: limit.clamp(1, MAX_HISTORY_LIMIT),
        }
    }
}
