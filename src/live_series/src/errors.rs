use shared_utils::config::ConfigError;
use thiserror::Error;

use crate::{
    models::{
        instrument::InvalidSymbol, session_params::UnknownRepresentation,
        timeframe::TimeframeError,
    },
    providers::{FeedError, FetchError, ProviderInitError},
    session::StaleWriteRejected,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Historical load failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Live feed failed: {0}")]
    Feed(#[from] FeedError),

    #[error(transparent)]
    StaleWrite(#[from] StaleWriteRejected),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provider initialization failed: {0}")]
    ProviderInit(#[from] ProviderInitError),

    #[error(transparent)]
    InvalidSymbol(#[from] InvalidSymbol),

    #[error(transparent)]
    Timeframe(#[from] TimeframeError),

    #[error(transparent)]
    Representation(#[from] UnknownRepresentation),

    #[error("Synchronizer is no longer running")]
    Stopped,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
