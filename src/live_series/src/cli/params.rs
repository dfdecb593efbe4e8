use chrono::DateTime;

use crate::{
    cli::commands::SessionArgs,
    models::{bar::SeriesItem, session_params::SessionParameters},
    sync::SessionStatus,
};

impl SessionArgs {
    pub fn to_params(&self) -> SessionParameters {
        SessionParameters::new(self.symbol.clone(), self.timeframe, self.representation)
    }
}

pub fn format_time(time: i64) -> String {
    DateTime::from_timestamp(time, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| time.to_string())
}

/// One line per item: time, then OHLC or the single value.
pub fn format_item(item: &SeriesItem) -> String {
    match item {
        SeriesItem::Candle(bar) => format!(
            "{}  o={} h={} l={} c={}",
            format_time(bar.time),
            bar.open,
            bar.high,
            bar.low,
            bar.close
        ),
        SeriesItem::Point(point) => format!("{}  {}", format_time(point.time), point.value),
    }
}

pub fn format_summary(status: &SessionStatus) -> String {
    let params = status
        .params
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "-".to_string());
    let last = status
        .last_bar_time
        .map(format_time)
        .unwrap_or_else(|| "-".to_string());
    let c = &status.counters;

    let mut out = format!(
        "session {} [{}] {}\n  bars: {} (last {})\n  ticks applied: {}\n  out-of-order dropped: {}\n  invalid dropped: {}\n  stale writes rejected: {}\n  reconnects: {}",
        status.generation,
        params,
        status.state,
        status.bars,
        last,
        c.ticks_applied,
        c.anomalies_dropped,
        c.invalid_bars_dropped,
        c.stale_writes_rejected,
        c.reconnects,
    );
    if let Some(err) = &status.last_error {
        out.push_str(&format!("\n  last error: {err}"));
    }
    out
}
