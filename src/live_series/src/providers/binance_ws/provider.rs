use std::{sync::Once, time::Duration};

use async_trait::async_trait;
use futures::StreamExt;
use snafu::{IntoError, ResultExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info};

use crate::{
    models::{bar::Bar, instrument::Symbol, timeframe::Interval},
    providers::{
        FeedConnection, FeedProvider,
        binance_ws::message::parse_kline_message,
        errors::{
            ConnectSnafu, ConnectTimeoutSnafu, DecodeMessageSnafu, FeedError, StreamClosedSnafu,
            TransportSnafu, UnexpectedStreamSnafu,
        },
    },
};

pub const WS_BASE_URL: &str = "wss://stream.binance.com:9443";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Rustls 0.23 needs a process-wide crypto provider before the first TLS handshake.
/// If something else already installed one, that one is kept.
fn install_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Opens `<symbol>@kline_<interval>` raw streams.
pub struct BinanceKlineFeed {
    base_url: String,
    connect_timeout: Duration,
}

impl BinanceKlineFeed {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn stream_url(&self, symbol: &Symbol, interval: Interval) -> String {
        format!(
            "{}/ws/{}@kline_{}",
            self.base_url,
            symbol.stream_name(),
            interval.code()
        )
    }
}

impl Default for BinanceKlineFeed {
    fn default() -> Self {
        Self::new(WS_BASE_URL)
    }
}

#[async_trait]
impl FeedProvider for BinanceKlineFeed {
    async fn subscribe(
        &self,
        symbol: &Symbol,
        interval: Interval,
    ) -> Result<Box<dyn FeedConnection>, FeedError> {
        install_crypto_provider();

        let url = self.stream_url(symbol, interval);
        let (ws, _response) = tokio::time::timeout(self.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| {
                ConnectTimeoutSnafu {
                    url: url.clone(),
                    after: self.connect_timeout,
                }
                .build()
            })?
            .context(ConnectSnafu { url: url.clone() })?;

        info!(%url, "kline stream connected");
        Ok(Box::new(BinanceKlineStream {
            ws,
            url,
            symbol: symbol.as_str().to_string(),
            interval: interval.code(),
            closed: false,
        }))
    }
}

/// An open kline stream. Ends for good on close frame, transport error, or [`FeedConnection::close`].
pub struct BinanceKlineStream {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    url: String,
    symbol: String,
    interval: &'static str,
    closed: bool,
}

impl BinanceKlineStream {
    fn decode(&self, text: String) -> Result<Bar, FeedError> {
        let update = match parse_kline_message(&text) {
            Ok(update) => update,
            Err(source) => return Err(DecodeMessageSnafu { payload: text }.into_error(source)),
        };
        if !update.matches(&self.symbol, self.interval) {
            return UnexpectedStreamSnafu {
                expected: format!("{} {}", self.symbol, self.interval),
                received: format!(
                    "{} {}",
                    update.symbol.as_deref().unwrap_or("?"),
                    update.interval.as_deref().unwrap_or("?")
                ),
            }
            .fail();
        }
        Ok(update.bar)
    }
}

#[async_trait]
impl FeedConnection for BinanceKlineStream {
    async fn next_bar(&mut self) -> Option<Result<Bar, FeedError>> {
        if self.closed {
            return None;
        }

        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => return Some(self.decode(text)),
                Some(Ok(Message::Close(frame))) => {
                    self.closed = true;
                    let reason = frame
                        .map(|f| format!("{} {}", u16::from(f.code), f.reason))
                        .unwrap_or_else(|| "close frame without reason".to_string());
                    return Some(Err(StreamClosedSnafu { reason }.build()));
                }
                // ping/pong are answered by tungstenite; binary frames carry nothing for us
                Some(Ok(_)) => continue,
                Some(Err(source)) => {
                    self.closed = true;
                    return Some(Err(TransportSnafu.into_error(source)));
                }
                None => {
                    self.closed = true;
                    return None;
                }
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        match tokio::time::timeout(CLOSE_TIMEOUT, self.ws.close(None)).await {
            Ok(Ok(())) => debug!(url = %self.url, "kline stream closed"),
            Ok(Err(e)) => debug!(url = %self.url, error = %e, "close handshake failed"),
            Err(_) => debug!(url = %self.url, "close handshake timed out"),
        }
    }
}
