use serde::Serialize;

use crate::{
    models::session_params::SessionParameters,
    session::{Generation, SessionState},
};

/// Counters kept for the lifetime of a synchronizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncCounters {
    pub sessions_opened: u64,
    pub ticks_applied: u64,
    /// Ticks older than the newest bar, dropped.
    pub anomalies_dropped: u64,
    /// Bars refused by the OHLC policy, from history or the feed.
    pub invalid_bars_dropped: u64,
    /// Results that arrived for a session that was already replaced or closed.
    pub stale_writes_rejected: u64,
    /// Feed messages that could not be decoded and were skipped.
    pub feed_errors: u64,
    /// Successful re-subscriptions after a dropped feed.
    pub reconnects: u64,
}

/// Snapshot of the synchronizer, published on every change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionStatus {
    pub generation: Generation,
    pub params: Option<SessionParameters>,
    pub state: SessionState,
    pub bars: usize,
    pub last_bar_time: Option<i64>,
    pub feed_connected: bool,
    /// Attempts made so far for the pending re-subscription, if any.
    pub reconnect_attempt: Option<usize>,
    pub last_error: Option<String>,
    pub counters: SyncCounters,
    /// The driver has exited; nothing further will be published.
    pub stopped: bool,
}

impl SessionStatus {
    pub fn is_live(&self) -> bool {
        self.state == SessionState::Live
    }
}
