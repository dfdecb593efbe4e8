use std::num::NonZeroU32;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::{Client, header};
use secrecy::{ExposeSecret, SecretString};
use shared_utils::env::get_env_var_opt;
use snafu::ResultExt;
use tracing::debug;

use crate::{
    models::{bar::Bar, request_params::KlinesRequestParams},
    providers::{
        HistoricalProvider,
        binance_rest::{
            params::{construct_params, klines_url},
            response::parse_klines,
        },
        errors::{
            ClientBuildSnafu, DecodeResponseSnafu, FetchError, InvalidApiKeySnafu,
            ProviderInitError, RequestSnafu, StatusSnafu,
        },
    },
};

pub const BASE_URL: &str = "https://api.binance.com";

/// Env var holding an optional API key, sent as `X-MBX-APIKEY`.
pub const API_KEY_VAR: &str = "BINANCE_API_KEY";

/// Client-side request budget when none is configured.
pub const DEFAULT_REQUESTS_PER_SECOND: NonZeroU32 = nonzero!(10u32);

pub struct BinanceRestProvider {
    client: Client,
    klines_url: String,
    limiter: DefaultDirectRateLimiter,
    _api_key: Option<SecretString>,
}

impl BinanceRestProvider {
    /// Creates a provider against `base_url` (e.g. [`BASE_URL`]).
    ///
    /// Klines are public; `api_key` only raises the exchange's rate allowance.
    pub fn new(
        base_url: &str,
        requests_per_second: NonZeroU32,
        api_key: Option<SecretString>,
    ) -> Result<Self, ProviderInitError> {
        let mut headers = header::HeaderMap::new();
        if let Some(key) = &api_key {
            headers.insert(
                "X-MBX-APIKEY",
                header::HeaderValue::from_str(key.expose_secret()).context(InvalidApiKeySnafu)?,
            );
        }

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .context(ClientBuildSnafu)?;

        Ok(Self {
            client,
            klines_url: klines_url(base_url),
            limiter: RateLimiter::direct(Quota::per_second(requests_per_second)),
            _api_key: api_key,
        })
    }

    /// Same as [`BinanceRestProvider::new`], picking up the API key from [`API_KEY_VAR`] if set.
    pub fn from_env(
        base_url: &str,
        requests_per_second: NonZeroU32,
    ) -> Result<Self, ProviderInitError> {
        let api_key = get_env_var_opt(API_KEY_VAR).map(|k| SecretString::new(k.into()));
        Self::new(base_url, requests_per_second, api_key)
    }
}

#[async_trait]
impl HistoricalProvider for BinanceRestProvider {
    async fn fetch_bars(&self, params: &KlinesRequestParams) -> Result<Vec<Bar>, FetchError> {
        self.limiter.until_ready().await;

        let response = self
            .client
            .get(&self.klines_url)
            .query(&construct_params(params))
            .send()
            .await
            .context(RequestSnafu)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown API error".to_string());
            return StatusSnafu {
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        let body = response.bytes().await.context(RequestSnafu)?;
        let bars = parse_klines(&body).context(DecodeResponseSnafu)?;

        debug!(
            symbol = %params.symbol,
            interval = %params.interval,
            count = bars.len(),
            "fetched klines"
        );
        Ok(bars)
    }
}
