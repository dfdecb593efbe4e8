use serde::Deserialize;
use serde_json::Value;

use crate::{models::bar::Bar, providers::decimal::de_decimal};

/// The `k` object of a kline event.
#[derive(Debug, Clone, Deserialize)]
struct KlinePayload {
    #[serde(rename = "t")]
    start_ms: i64,
    #[serde(rename = "o", deserialize_with = "de_decimal")]
    open: f64,
    #[serde(rename = "h", deserialize_with = "de_decimal")]
    high: f64,
    #[serde(rename = "l", deserialize_with = "de_decimal")]
    low: f64,
    #[serde(rename = "c", deserialize_with = "de_decimal")]
    close: f64,
    #[serde(rename = "i", default)]
    interval: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct KlineEvent {
    #[serde(rename = "s", default)]
    symbol: Option<String>,
    #[serde(rename = "k")]
    kline: KlinePayload,
}

/// A normalized kline update pulled out of a stream message.
#[derive(Debug, Clone, PartialEq)]
pub struct KlineUpdate {
    pub symbol: Option<String>,
    pub interval: Option<String>,
    pub bar: Bar,
}

impl KlineUpdate {
    /// Whether the event belongs to `symbol`/`interval`. Fields the message leaves
    /// out are taken to match.
    pub fn matches(&self, symbol: &str, interval: &str) -> bool {
        self.symbol.as_deref().is_none_or(|s| s.eq_ignore_ascii_case(symbol))
            && self.interval.as_deref().is_none_or(|i| i == interval)
    }
}

/// Parses one text frame.
///
/// Accepts both the raw-stream shape (`{"e":"kline",...,"k":{..}}`) and the
/// combined-stream wrapper (`{"stream":"..","data":{..}}`).
pub fn parse_kline_message(text: &str) -> Result<KlineUpdate, serde_json::Error> {
    let mut value: Value = serde_json::from_str(text)?;
    if let Some(inner) = value.get_mut("data") {
        value = inner.take();
    }

    let event: KlineEvent = serde_json::from_value(value)?;
    let k = event.kline;

    Ok(KlineUpdate {
        symbol: event.symbol,
        interval: k.interval,
        bar: Bar::from_millis(k.start_ms, k.open, k.high, k.low, k.close),
    })
}
