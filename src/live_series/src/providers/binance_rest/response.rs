use std::fmt;

use serde::de::{self, Deserialize, Deserializer, IgnoredAny, SeqAccess, Visitor};

use crate::{models::bar::Bar, providers::decimal::Decimal};

/// One row of `GET /api/v3/klines`.
///
/// The exchange sends twelve positional fields; only the first five are kept:
/// `[openTime(ms), open, high, low, close, ...]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinanceKline {
    pub open_time_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl From<BinanceKline> for Bar {
    fn from(k: BinanceKline) -> Self {
        Bar::from_millis(k.open_time_ms, k.open, k.high, k.low, k.close)
    }
}

impl<'de> Deserialize<'de> for BinanceKline {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_seq(KlineVisitor)
    }
}

struct KlineVisitor;

impl<'de> Visitor<'de> for KlineVisitor {
    type Value = BinanceKline;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a kline array [openTime, open, high, low, close, ...]")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<BinanceKline, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let open_time_ms: i64 = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let mut price = |idx: usize| -> Result<f64, A::Error> {
            seq.next_element::<Decimal>()?
                .map(|d| d.0)
                .ok_or_else(|| de::Error::invalid_length(idx, &self))
        };
        let open = price(1)?;
        let high = price(2)?;
        let low = price(3)?;
        let close = price(4)?;

        // close time, volumes, trade count...
        while seq.next_element::<IgnoredAny>()?.is_some() {}

        Ok(BinanceKline {
            open_time_ms,
            open,
            high,
            low,
            close,
        })
    }
}

/// Decodes a klines response body straight into bars.
pub fn parse_klines(body: &[u8]) -> Result<Vec<Bar>, serde_json::Error> {
    let rows: Vec<BinanceKline> = serde_json::from_slice(body)?;
    Ok(rows.into_iter().map(Bar::from).collect())
}
