use crate::models::request_params::KlinesRequestParams;

/// Path of the spot klines endpoint, relative to the REST base URL.
pub const KLINES_PATH: &str = "/api/v3/klines";

/// Builds the `?symbol=..&interval=..&limit=..` query for a klines request.
pub fn construct_params(params: &KlinesRequestParams) -> Vec<(&'static str, String)> {
    vec![
        ("symbol", params.symbol.as_str().to_string()),
        ("interval", params.interval.code().to_string()),
        ("limit", params.limit.to_string()),
    ]
}

/// Joins a base URL and the klines path without doubling the slash.
pub fn klines_url(base_url: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), KLINES_PATH)
}
