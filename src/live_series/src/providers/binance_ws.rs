//! Live klines from the Binance spot WebSocket stream.

pub mod message;
pub mod provider;

pub use provider::{BinanceKlineFeed, BinanceKlineStream};
