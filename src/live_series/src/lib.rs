#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod errors;
pub mod io;
pub mod models;
pub mod providers;
pub mod session;
pub mod sync;

pub use config::SyncConfig;
pub use errors::Error;
pub use sync::{SessionStatus, Synchronizer, SynchronizerHandle};

/// Historical provider and feed for the public Binance spot endpoints in `config`.
pub fn binance_providers(
    config: &SyncConfig,
) -> Result<
    (
        std::sync::Arc<dyn providers::HistoricalProvider>,
        std::sync::Arc<dyn providers::FeedProvider>,
    ),
    Error,
> {
    let rest = providers::binance_rest::BinanceRestProvider::from_env(
        &config.rest_base_url,
        config.requests_per_second(),
    )?;
    let ws = providers::binance_ws::BinanceKlineFeed::new(&config.ws_base_url);
    Ok((std::sync::Arc::new(rest), std::sync::Arc::new(ws)))
}
