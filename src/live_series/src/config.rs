//! Runtime settings for the synchronizer and the Binance providers.
//!
//! Every field has a default, so an absent or partial TOML file is fine:
//!
//! ```toml
//! history_limit = 500
//! stream_interval = "1m"
//! ohlc_policy = "clamp"
//!
//! [reconnect]
//! max_attempts = 0
//!
//! [instruments]
//! BTCUSDT = "Bitcoin"
//! DOGEUSDT = "Dogecoin"
//! ```

use std::{num::NonZeroU32, path::Path, time::Duration};

use backon::{ExponentialBackoff, ExponentialBuilder};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use shared_utils::{
    config::{ConfigError, load_toml},
    env::get_env_var_opt,
};

use crate::{
    models::{
        bar::OhlcPolicy,
        instrument::InstrumentCatalog,
        request_params::{DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT},
        timeframe::{Interval, Timeframe},
    },
    providers::{binance_rest::provider::BASE_URL, binance_ws::provider::WS_BASE_URL},
};

pub const REST_URL_VAR: &str = "LIVE_SERIES_REST_URL";
pub const WS_URL_VAR: &str = "LIVE_SERIES_WS_URL";

const FETCH_RETRY_MIN_DELAY: Duration = Duration::from_millis(500);
const FETCH_RETRY_MAX_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    pub rest_base_url: String,
    pub ws_base_url: String,
    /// Bars requested per historical load, clamped to the exchange maximum.
    pub history_limit: u32,
    pub fetch_timeout_secs: u64,
    /// Extra attempts after a retryable fetch failure.
    pub fetch_retries: usize,
    pub requests_per_second: u32,
    /// Pins the live stream to one interval instead of following the timeframe.
    pub stream_interval: Option<Interval>,
    pub ohlc_policy: OhlcPolicy,
    pub reconnect: ReconnectConfig,
    /// symbol -> display name, in presentation order.
    pub instruments: IndexMap<String, String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            rest_base_url: BASE_URL.to_string(),
            ws_base_url: WS_BASE_URL.to_string(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            fetch_timeout_secs: 10,
            fetch_retries: 2,
            requests_per_second: 10,
            stream_interval: None,
            ohlc_policy: OhlcPolicy::default(),
            reconnect: ReconnectConfig::default(),
            instruments: InstrumentCatalog::default()
                .iter()
                .map(|i| (i.symbol.to_string(), i.name))
                .collect(),
        }
    }
}

/// Backoff for re-subscribing after the live feed drops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconnectConfig {
    /// 0 disables reconnecting: a dropped feed closes the session.
    pub max_attempts: usize,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            min_delay_ms: 1_000,
            max_delay_ms: 30_000,
            jitter: true,
        }
    }
}

impl ReconnectConfig {
    /// A fresh delay sequence; yields `max_attempts` delays, then `None`.
    pub fn backoff(&self) -> ExponentialBackoff {
        let builder = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(self.min_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_max_times(self.max_attempts);
        let builder = if self.jitter {
            builder.with_jitter()
        } else {
            builder
        };
        backon::BackoffBuilder::build(builder)
    }
}

impl SyncConfig {
    /// Loads the config file if one is given, applies env overrides, then validates.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => load_toml::<SyncConfig>(path)?,
            None => SyncConfig::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(url) = get_env_var_opt(REST_URL_VAR) {
            self.rest_base_url = url;
        }
        if let Some(url) = get_env_var_opt(WS_URL_VAR) {
            self.ws_base_url = url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_HISTORY_LIMIT).contains(&self.history_limit) {
            return Err(ConfigError::Invalid(format!(
                "history_limit must be within 1..={MAX_HISTORY_LIMIT}, got {}",
                self.history_limit
            )));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "fetch_timeout_secs must be positive".to_string(),
            ));
        }
        if self.requests_per_second == 0 {
            return Err(ConfigError::Invalid(
                "requests_per_second must be positive".to_string(),
            ));
        }
        if self.reconnect.min_delay_ms > self.reconnect.max_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "reconnect.min_delay_ms ({}) exceeds reconnect.max_delay_ms ({})",
                self.reconnect.min_delay_ms, self.reconnect.max_delay_ms
            )));
        }
        let catalog = self.instrument_catalog()?;
        if catalog.is_empty() {
            return Err(ConfigError::Invalid("instruments must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn instrument_catalog(&self) -> Result<InstrumentCatalog, ConfigError> {
        InstrumentCatalog::from_pairs(&self.instruments)
            .map_err(|e| ConfigError::Invalid(format!("instruments: {e}")))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn requests_per_second(&self) -> NonZeroU32 {
        NonZeroU32::new(self.requests_per_second).unwrap_or(NonZeroU32::MIN)
    }

    /// Retry schedule for historical loads.
    pub fn fetch_backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(FETCH_RETRY_MIN_DELAY)
            .with_max_delay(FETCH_RETRY_MAX_DELAY)
            .with_max_times(self.fetch_retries)
            .with_jitter()
    }

    /// Interval the live feed subscribes to for `timeframe`.
    pub fn stream_interval_for(&self, timeframe: Timeframe) -> Interval {
        self.stream_interval.unwrap_or_else(|| timeframe.interval())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serial_test::serial;
    use tempfile::NamedTempFile;

    use super::*;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn clear_env() {
        unsafe {
            std::env::remove_var(REST_URL_VAR);
            std::env::remove_var(WS_URL_VAR);
        }
    }

    #[test]
    #[serial]
    fn defaults_without_file() {
        clear_env();
        let config = SyncConfig::load(None).unwrap();

        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.history_limit, 365);
        assert_eq!(config.fetch_timeout(), Duration::from_secs(10));
        assert_eq!(config.requests_per_second().get(), 10);
        assert_eq!(config.ohlc_policy, OhlcPolicy::Reject);
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(
            config.instruments.keys().collect::<Vec<_>>(),
            ["BTCUSDT", "ETHUSDT", "SOLUSDT"]
        );
    }

    #[test]
    #[serial]
    fn partial_file_overrides_defaults() {
        clear_env();
        let file = write_config(
            r#"
            history_limit = 50
            stream_interval = "1m"
            ohlc_policy = "clamp"

            [reconnect]
            max_attempts = 0

            [instruments]
            DOGEUSDT = "Dogecoin"
            BTCUSDT = "Bitcoin"
            "#,
        );

        let config = SyncConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.history_limit, 50);
        assert_eq!(config.stream_interval, Some(Interval::OneMinute));
        assert_eq!(config.ohlc_policy, OhlcPolicy::Clamp);
        assert_eq!(config.reconnect.max_attempts, 0);
        assert_eq!(config.reconnect.min_delay_ms, 1_000);
        assert_eq!(config.rest_base_url, BASE_URL);

        let names: Vec<_> = config
            .instrument_catalog()
            .unwrap()
            .iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, ["Dogecoin", "Bitcoin"]);
    }

    #[test]
    #[serial]
    fn env_overrides_urls() {
        clear_env();
        unsafe {
            std::env::set_var(REST_URL_VAR, "http://127.0.0.1:9000");
            std::env::set_var(WS_URL_VAR, "  ");
        }

        let config = SyncConfig::load(None).unwrap();
        assert_eq!(config.rest_base_url, "http://127.0.0.1:9000");
        assert_eq!(config.ws_base_url, WS_BASE_URL);

        clear_env();
    }

    #[test]
    #[serial]
    fn out_of_range_values_are_invalid() {
        clear_env();
        for body in [
            "history_limit = 0",
            "history_limit = 1001",
            "fetch_timeout_secs = 0",
            "requests_per_second = 0",
            "[reconnect]\nmin_delay_ms = 10\nmax_delay_ms = 5",
            "[instruments]\n\"BTC-USDT\" = \"Bitcoin\"",
        ] {
            let file = write_config(body);
            let err = SyncConfig::load(Some(file.path())).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{body}: {err}");
        }
    }

    #[test]
    #[serial]
    fn unknown_keys_are_parse_errors() {
        clear_env();
        let file = write_config("histroy_limit = 10");
        let err = SyncConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn stream_interval_follows_timeframe_unless_pinned() {
        let mut config = SyncConfig::default();
        assert_eq!(
            config.stream_interval_for(Timeframe::OneDay),
            Interval::OneHour
        );
        assert_eq!(
            config.stream_interval_for(Timeframe::OneYear),
            Interval::OneWeek
        );

        config.stream_interval = Some(Interval::OneMinute);
        assert_eq!(
            config.stream_interval_for(Timeframe::OneYear),
            Interval::OneMinute
        );
    }

    #[test]
    fn reconnect_backoff_is_bounded() {
        let reconnect = ReconnectConfig {
            max_attempts: 3,
            min_delay_ms: 100,
            max_delay_ms: 250,
            jitter: false,
        };
        let delays: Vec<_> = reconnect.backoff().collect();
        assert_eq!(delays.len(), 3);
        assert!(delays.iter().all(|d| *d <= Duration::from_millis(250)));

        let none = ReconnectConfig {
            max_attempts: 0,
            ..reconnect
        };
        assert_eq!(none.backoff().count(), 0);
    }
}
