use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::models::{
    instrument::Symbol, session_params::Representation, timeframe::Timeframe,
};

#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to a TOML config file; every key is optional
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the instruments offered for selection
    Instruments,

    /// Load and print the recent history of one instrument
    History {
        #[command(flatten)]
        session: SessionArgs,
    },

    /// Run a live chart session and print a summary when it ends
    Watch {
        #[command(flatten)]
        session: SessionArgs,

        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(long)]
        seconds: Option<u64>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    /// Exchange symbol (e.g. "BTCUSDT")
    #[arg(long, default_value = "BTCUSDT")]
    pub symbol: Symbol,

    /// Horizon: 1D, 1M, 3M or 1Y
    #[arg(long, default_value = "1D")]
    pub timeframe: Timeframe,

    /// candlestick or area
    #[arg(long, default_value = "candlestick")]
    pub representation: Representation,
}
