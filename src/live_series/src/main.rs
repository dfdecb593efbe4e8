use std::{process::ExitCode, sync::Arc, time::Duration};

use clap::Parser;
use live_series::{
    Error, SyncConfig, Synchronizer, binance_providers,
    cli::{
        commands::{Cli, Commands},
        params::{format_item, format_summary},
    },
    io::sink::MemorySurface,
    models::{bar_series::BarSeries, request_params::KlinesRequestParams},
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "live-series failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Error> {
    let config = SyncConfig::load(cli.config.as_deref())?;
    let catalog = config.instrument_catalog()?;

    match cli.command {
        Commands::Instruments => {
            for instrument in catalog.iter() {
                println!("{}\t{}", instrument.symbol, instrument.name);
            }
        }

        Commands::History { session } => {
            let params = session.to_params();
            if !catalog.contains(&params.symbol) {
                warn!(symbol = %params.symbol, "symbol is not in the instrument catalog");
            }

            let (historical, _) = binance_providers(&config)?;
            let request = KlinesRequestParams::new(
                params.symbol.clone(),
                params.timeframe.interval(),
                config.history_limit,
            );
            let series = BarSeries::from_bars(historical.fetch_bars(&request).await?);
            for item in series.project(params.representation) {
                println!("{}", format_item(&item));
            }
        }

        Commands::Watch { session, seconds } => {
            let params = session.to_params();
            if !catalog.contains(&params.symbol) {
                warn!(symbol = %params.symbol, "symbol is not in the instrument catalog");
            }

            let (historical, feed) = binance_providers(&config)?;
            let surface = MemorySurface::new();
            let handle =
                Synchronizer::new(config, historical, feed, Arc::new(surface.clone())).spawn();
            handle.set_params(params).await?;

            let deadline = async {
                match seconds {
                    Some(s) => tokio::time::sleep(Duration::from_secs(s)).await,
                    None => std::future::pending().await,
                }
            };
            tokio::pin!(deadline);

            let mut status = handle.status();
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    () = &mut deadline => break,
                    changed = status.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let snapshot = status.borrow_and_update().clone();
                        let latest = surface
                            .current()
                            .and_then(|s| s.items.last().map(format_item))
                            .unwrap_or_default();
                        info!(
                            generation = %snapshot.generation,
                            state = %snapshot.state,
                            bars = snapshot.bars,
                            feed = snapshot.feed_connected,
                            "{latest}"
                        );
                    }
                }
            }

            let last = handle.snapshot();
            handle.shutdown().await?;
            println!("{}", format_summary(&last));
        }
    }

    Ok(())
}
