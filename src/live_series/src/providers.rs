//! Provider abstraction for kline sources.
//!
//! Two seams, one per half of a live chart:
//!
//! - [`HistoricalProvider`]: one-shot load of the most recent N bars.
//! - [`FeedProvider`] / [`FeedConnection`]: a streaming connection that yields
//!   normalized [`Bar`]s until it ends or is closed.
//!
//! Both traits are async and object safe so the synchronizer can hold them as
//! `Arc<dyn ...>` and tests can swap in scripted implementations.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use live_series::models::{bar::Bar, request_params::KlinesRequestParams};
//! use live_series::providers::{FetchError, HistoricalProvider};
//!
//! struct Flat;
//!
//! #[async_trait]
//! impl HistoricalProvider for Flat {
//!     async fn fetch_bars(&self, _params: &KlinesRequestParams) -> Result<Vec<Bar>, FetchError> {
//!         Ok(vec![Bar::new(0, 1.0, 1.0, 1.0, 1.0)])
//!     }
//! }
//! ```

pub mod binance_rest;
pub mod binance_ws;
mod decimal;
pub mod errors;

use async_trait::async_trait;

pub use errors::{FeedError, FetchError, ProviderInitError};

use crate::models::{
    bar::Bar, instrument::Symbol, request_params::KlinesRequestParams, timeframe::Interval,
};

/// Loads historical bars for one instrument.
#[async_trait]
pub trait HistoricalProvider: Send + Sync {
    /// Fetches the most recent `params.limit` bars, oldest first.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<Bar>)` - normalized bars (epoch seconds, `f64` prices).
    /// * `Err(FetchError)` - the request or its decoding failed; nothing partial is returned.
    async fn fetch_bars(&self, params: &KlinesRequestParams) -> Result<Vec<Bar>, FetchError>;
}

/// Opens real-time kline streams.
#[async_trait]
pub trait FeedProvider: Send + Sync {
    /// Connects to the kline stream for `symbol` at `interval`.
    async fn subscribe(
        &self,
        symbol: &Symbol,
        interval: Interval,
    ) -> Result<Box<dyn FeedConnection>, FeedError>;
}

/// One open kline stream.
///
/// The sequence is lazy, unbounded and non-restartable: once `next_bar` returns
/// `None` it keeps returning `None`, and a new connection has to be requested from
/// the [`FeedProvider`].
#[async_trait]
pub trait FeedConnection: Send {
    /// Waits for the next update, in transport order.
    ///
    /// `Some(Err(e))` with a non-fatal `e` (see [`FeedError::is_fatal`]) means one
    /// message was skipped and the stream goes on.
    async fn next_bar(&mut self) -> Option<Result<Bar, FeedError>>;

    /// Closes the connection. Idempotent, and fine to call after an error.
    async fn close(&mut self);
}
