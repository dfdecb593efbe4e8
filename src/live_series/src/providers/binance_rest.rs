//! Historical klines from the Binance spot REST API.

pub mod params;
pub mod provider;
pub mod response;

pub use provider::BinanceRestProvider;
