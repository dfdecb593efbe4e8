use std::time::Duration;

use snafu::{Backtrace, Snafu};

/// Errors that can occur during the creation of a provider instance.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderInitError {
    /// failed to init reqwest client
    #[snafu(display("Failed to build HTTP client: {source}"))]
    ClientBuild {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// API key contains invalid characters.
    #[snafu(display("Invalid API key format: {source}"))]
    InvalidApiKey {
        source: reqwest::header::InvalidHeaderValue,
        backtrace: Backtrace,
    },
}

/// Errors from a historical load.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum FetchError {
    /// Network-level failure (DNS, connect, TLS, body read).
    #[snafu(display("Historical request failed: {source}"))]
    Request {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// The exchange answered with a non-success status.
    #[snafu(display("Historical request returned HTTP {status}: {body}"))]
    Status {
        status: u16,
        body: String,
        backtrace: Backtrace,
    },

    /// The body was not a klines array.
    #[snafu(display("Failed to decode klines response: {source}"))]
    DecodeResponse {
        source: serde_json::Error,
        backtrace: Backtrace,
    },

    /// The request did not finish in time.
    #[snafu(display("Historical request timed out after {after:?}"))]
    FetchTimeout { after: Duration, backtrace: Backtrace },
}

impl FetchError {
    /// Whether trying the same request again could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Request { .. } | FetchError::FetchTimeout { .. } => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::DecodeResponse { .. } => false,
        }
    }
}

/// Errors from a real-time kline feed.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum FeedError {
    /// The stream could not be opened.
    #[snafu(display("Failed to connect to {url}: {source}"))]
    Connect {
        url: String,
        source: tokio_tungstenite::tungstenite::Error,
        backtrace: Backtrace,
    },

    /// Opening the stream took too long.
    #[snafu(display("Connecting to {url} timed out after {after:?}"))]
    ConnectTimeout {
        url: String,
        after: Duration,
        backtrace: Backtrace,
    },

    /// The open connection failed while reading.
    #[snafu(display("Feed transport error: {source}"))]
    Transport {
        source: tokio_tungstenite::tungstenite::Error,
        backtrace: Backtrace,
    },

    /// A message arrived that is not a kline event.
    #[snafu(display("Unparseable feed message ({source}): {payload}"))]
    DecodeMessage {
        payload: String,
        source: serde_json::Error,
        backtrace: Backtrace,
    },

    /// A kline event for a symbol or interval other than the subscribed one.
    #[snafu(display("Kline for {received} on a stream subscribed to {expected}"))]
    UnexpectedStream {
        expected: String,
        received: String,
        backtrace: Backtrace,
    },

    /// The stream ended without us asking it to.
    #[snafu(display("Feed closed unexpectedly: {reason}"))]
    StreamClosed { reason: String, backtrace: Backtrace },

    /// Provider-specific failure that fits none of the above.
    #[snafu(display("Feed provider error: {message}"))]
    Upstream { message: String, backtrace: Backtrace },
}

impl FeedError {
    /// Whether the connection that produced this error is still usable.
    ///
    /// A bad or misrouted message is skipped; everything else means the connection is gone.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            FeedError::DecodeMessage { .. } | FeedError::UnexpectedStream { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use snafu::IntoError;

    use super::*;

    #[test]
    fn retryable_statuses() {
        let status = |s: u16| StatusSnafu { status: s, body: "x" }.build();
        assert!(status(500).is_retryable());
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(!status(400).is_retryable());
        assert!(!status(404).is_retryable());

        assert!(
            FetchTimeoutSnafu {
                after: Duration::from_secs(1)
            }
            .build()
            .is_retryable()
        );
        let decode = serde_json::from_str::<serde_json::Value>("[").unwrap_err();
        assert!(!DecodeResponseSnafu.into_error(decode).is_retryable());
    }

    #[test]
    fn only_decode_errors_keep_the_feed_alive() {
        let decode = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = DecodeMessageSnafu { payload: "{" }.into_error(decode);
        assert!(!err.is_fatal());

        let misrouted = UnexpectedStreamSnafu {
            expected: "BTCUSDT 1h",
            received: "ETHUSDT 1h",
        }
        .build();
        assert!(!misrouted.is_fatal());

        assert!(StreamClosedSnafu { reason: "eof" }.build().is_fatal());
        assert!(UpstreamSnafu { message: "gone" }.build().is_fatal());
    }
}
