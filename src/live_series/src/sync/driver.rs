//! The single task that owns the active session.
//!
//! Everything that can change the chart (commands, finished history loads, feed
//! connects, feed updates, the reconnect timer) is funnelled through one `select!`
//! loop, so merges are serialized and there is never more than one session, sink or
//! feed alive. Nothing in the loop waits on the network, so a command is always picked
//! up as soon as it is sent.

use std::{future::pending, sync::Arc, time::Duration};

use backon::{ExponentialBackoff, ExponentialBuilder, Retryable};
use futures::{FutureExt, future::BoxFuture};
use tokio::{
    sync::{mpsc, oneshot, watch},
    time::Instant,
};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::{
    config::SyncConfig,
    io::sink::SurfaceFactory,
    models::{
        bar::{Bar, OhlcPolicy},
        bar_series::MergeOutcome,
        request_params::KlinesRequestParams,
        session_params::SessionParameters,
    },
    providers::{
        FeedConnection, FeedError, FeedProvider, FetchError, HistoricalProvider,
        errors::FetchTimeoutSnafu,
    },
    session::{Generation, Session, SessionState, StaleWriteRejected},
    sync::status::{SessionStatus, SyncCounters},
};

pub(crate) enum Command {
    SetParams(SessionParameters),
    Shutdown(oneshot::Sender<()>),
}

/// Result of a spawned history load, tagged with the session it was started for.
struct HistoryLoaded {
    origin: Generation,
    result: Result<Vec<Bar>, FetchError>,
}

type Connected = (Generation, Result<Box<dyn FeedConnection>, FeedError>);

struct PendingReconnect {
    at: Instant,
    backoff: ExponentialBackoff,
    attempts: usize,
}

enum Step {
    Command(Option<Command>),
    Loaded(HistoryLoaded),
    Subscribed(Connected),
    Feed(Generation, Option<Result<Bar, FeedError>>),
    Reconnect,
}

pub(crate) struct Driver {
    config: SyncConfig,
    historical: Arc<dyn HistoricalProvider>,
    feed: Arc<dyn FeedProvider>,
    surface: Arc<dyn SurfaceFactory>,
    commands: mpsc::Receiver<Command>,
    loaded_tx: mpsc::UnboundedSender<HistoryLoaded>,
    loaded_rx: mpsc::UnboundedReceiver<HistoryLoaded>,
    last_generation: Generation,
    session: Option<Session>,
    /// Feed connect in flight for the current session. Dropping it abandons the
    /// connect before any socket is handed over.
    connecting: Option<BoxFuture<'static, Connected>>,
    reconnect: Option<PendingReconnect>,
    counters: SyncCounters,
    last_error: Option<String>,
    status: watch::Sender<SessionStatus>,
}

impl Driver {
    pub(crate) fn new(
        config: SyncConfig,
        historical: Arc<dyn HistoricalProvider>,
        feed: Arc<dyn FeedProvider>,
        surface: Arc<dyn SurfaceFactory>,
        commands: mpsc::Receiver<Command>,
        status: watch::Sender<SessionStatus>,
    ) -> Self {
        let (loaded_tx, loaded_rx) = mpsc::unbounded_channel();
        Self {
            config,
            historical,
            feed,
            surface,
            commands,
            loaded_tx,
            loaded_rx,
            last_generation: Generation::default(),
            session: None,
            connecting: None,
            reconnect: None,
            counters: SyncCounters::default(),
            last_error: None,
            status,
        }
    }

    pub(crate) async fn run(mut self) {
        info!("synchronizer started");
        self.publish();

        loop {
            // the timer is idle while a re-subscribe is already in flight
            let reconnect_at = match self.connecting {
                Some(_) => None,
                None => self.reconnect.as_ref().map(|r| r.at),
            };

            let step = tokio::select! {
                command = self.commands.recv() => Step::Command(command),
                Some(loaded) = self.loaded_rx.recv() => Step::Loaded(loaded),
                connected = connect_finished(self.connecting.as_mut()) => Step::Subscribed(connected),
                (origin, item) = next_feed_item(self.session.as_mut()) => Step::Feed(origin, item),
                () = sleep_until(reconnect_at) => Step::Reconnect,
            };

            match step {
                Step::Command(Some(Command::SetParams(params))) => self.switch_to(params).await,
                Step::Command(Some(Command::Shutdown(ack))) => {
                    self.teardown().await;
                    let _ = ack.send(());
                    return;
                }
                // every handle is gone
                Step::Command(None) => {
                    self.teardown().await;
                    return;
                }
                Step::Loaded(loaded) => self.on_history(loaded).await,
                Step::Subscribed(connected) => {
                    self.connecting = None;
                    self.on_subscribed(connected).await;
                }
                Step::Feed(origin, item) => self.on_feed_item(origin, item).await,
                Step::Reconnect => self.resubscribe().await,
            }

            self.publish();
        }
    }

    /// Closes whatever is active and starts a session for `params`.
    async fn switch_to(&mut self, params: SessionParameters) {
        self.reconnect = None;
        self.abandon_connect();

        let retained = match self.session.take() {
            Some(mut previous) => {
                let reusable = previous.state() == SessionState::Live
                    && previous.params().same_source(&params);
                let history = previous.close().await;
                (reusable && !history.is_empty()).then_some(history)
            }
            None => None,
        };

        self.last_generation = self.last_generation.next();
        let generation = self.last_generation;
        let sink = self.surface.create(generation, &params);
        let mut session = Session::new(generation, params, sink);
        self.counters.sessions_opened += 1;
        self.last_error = None;
        info!(%generation, params = %session.params(), "session opened");

        match retained {
            Some(history) => {
                debug!(%generation, bars = history.len(), "reusing bar history");
                if let Err(rejected) = session.load(generation, history.into_bars()) {
                    warn!(%rejected, "could not seed session");
                }
                self.session = Some(session);
                self.subscribe();
            }
            None => {
                session.begin_loading();
                self.spawn_history(generation, session.params());
                self.session = Some(session);
            }
        }
    }

    fn spawn_history(&self, generation: Generation, params: &SessionParameters) {
        let request = KlinesRequestParams::new(
            params.symbol.clone(),
            params.timeframe.interval(),
            self.config.history_limit,
        );
        let span = info_span!(
            "history",
            %generation,
            symbol = %request.symbol,
            interval = %request.interval
        );
        let provider = Arc::clone(&self.historical);
        let loaded_tx = self.loaded_tx.clone();
        let timeout = self.config.fetch_timeout();
        let backoff = self.config.fetch_backoff();

        tokio::spawn(
            async move {
                let result = fetch_with_retry(provider.as_ref(), &request, timeout, backoff).await;
                // fails only once the driver has exited
                let _ = loaded_tx.send(HistoryLoaded {
                    origin: generation,
                    result,
                });
            }
            .instrument(span),
        );
    }

    async fn on_history(&mut self, loaded: HistoryLoaded) {
        let HistoryLoaded { origin, result } = loaded;
        let current = self.session.as_ref().map(Session::generation);

        match result {
            Ok(bars) => {
                let (bars, invalid) = sanitize_history(bars, self.config.ohlc_policy);
                let applied = match self.session.as_mut() {
                    Some(session) => session.load(origin, bars),
                    None => Err(StaleWriteRejected {
                        origin,
                        current: self.last_generation,
                        state: SessionState::Closed,
                    }),
                };

                match applied {
                    Ok(_) => {
                        if invalid > 0 {
                            self.counters.invalid_bars_dropped += invalid;
                            warn!(generation = %origin, dropped = invalid, "history contained invalid bars");
                        }
                        self.subscribe();
                    }
                    Err(rejected) => {
                        self.counters.stale_writes_rejected += 1;
                        warn!(%rejected, "discarding history for a replaced session");
                    }
                }
            }
            Err(err) if current == Some(origin) => {
                error!(generation = %origin, error = %err, "historical load failed");
                self.last_error = Some(err.to_string());
            }
            Err(err) => {
                debug!(generation = %origin, error = %err, "historical load failed for a replaced session");
            }
        }
    }

    /// Starts opening the live feed for the current session. The connect is polled by
    /// the main loop; the previous feed is always closed before this is called.
    fn subscribe(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if session.state() != SessionState::Live || session.has_feed() {
            return;
        }

        let generation = session.generation();
        let symbol = session.params().symbol.clone();
        let interval = self.config.stream_interval_for(session.params().timeframe);
        let feed = Arc::clone(&self.feed);
        debug!(%generation, %symbol, %interval, "feed connecting");

        let connect = async move { (generation, feed.subscribe(&symbol, interval).await) };
        self.connecting = Some(connect.boxed());
    }

    async fn on_subscribed(&mut self, (origin, result): Connected) {
        let Some(session) = self.session.as_mut() else {
            if let Ok(mut connection) = result {
                connection.close().await;
            }
            return;
        };
        let symbol = session.params().symbol.clone();

        match result {
            Ok(connection) => match session.attach_feed(origin, connection).await {
                Ok(()) => match self.reconnect.take() {
                    Some(pending) => {
                        self.counters.reconnects += 1;
                        info!(generation = %origin, %symbol, attempts = pending.attempts, "feed re-subscribed");
                    }
                    None => info!(generation = %origin, %symbol, "feed subscribed"),
                },
                Err(rejected) => {
                    self.counters.stale_writes_rejected += 1;
                    warn!(%rejected, "feed opened for a replaced session");
                }
            },
            Err(err) if session.generation() == origin => {
                warn!(generation = %origin, %symbol, error = %err, "feed subscribe failed");
                self.last_error = Some(err.to_string());
                self.schedule_reconnect().await;
            }
            Err(err) => {
                debug!(generation = %origin, error = %err, "feed subscribe failed for a replaced session");
            }
        }
    }

    fn abandon_connect(&mut self) {
        if self.connecting.take().is_some() {
            debug!("abandoning feed connect");
        }
    }

    async fn on_feed_item(&mut self, origin: Generation, item: Option<Result<Bar, FeedError>>) {
        match item {
            Some(Ok(bar)) => self.on_tick(origin, bar),
            Some(Err(err)) if !err.is_fatal() => {
                self.counters.feed_errors += 1;
                warn!(generation = %origin, error = %err, "skipping feed message");
            }
            Some(Err(err)) => {
                warn!(generation = %origin, error = %err, "feed dropped");
                self.last_error = Some(err.to_string());
                self.drop_feed().await;
            }
            None => {
                warn!(generation = %origin, "feed ended");
                self.drop_feed().await;
            }
        }
    }

    fn on_tick(&mut self, origin: Generation, bar: Bar) {
        let bar = match bar.sanitize(self.config.ohlc_policy) {
            Ok(bar) => bar,
            Err(reason) => {
                self.counters.invalid_bars_dropped += 1;
                warn!(generation = %origin, time = bar.time, %reason, "dropping invalid tick");
                return;
            }
        };

        let applied = match self.session.as_mut() {
            Some(session) => session.apply(origin, bar),
            None => Err(StaleWriteRejected {
                origin,
                current: self.last_generation,
                state: SessionState::Closed,
            }),
        };

        match applied {
            Ok(MergeOutcome::Dropped { last_time }) => {
                self.counters.anomalies_dropped += 1;
                warn!(generation = %origin, time = bar.time, last_time, "dropping out-of-order tick");
            }
            Ok(outcome) => {
                self.counters.ticks_applied += 1;
                debug!(generation = %origin, time = bar.time, close = bar.close, ?outcome, "tick applied");
            }
            Err(rejected) => {
                self.counters.stale_writes_rejected += 1;
                warn!(%rejected, "discarding tick for a replaced session");
            }
        }
    }

    async fn drop_feed(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.detach_feed().await;
        }
        self.schedule_reconnect().await;
    }

    /// Arms the reconnect timer, or closes the session once the attempts are used up.
    async fn schedule_reconnect(&mut self) {
        let pending = self.reconnect.get_or_insert_with(|| PendingReconnect {
            at: Instant::now(),
            backoff: self.config.reconnect.backoff(),
            attempts: 0,
        });

        match pending.backoff.next() {
            Some(delay) => {
                pending.attempts += 1;
                pending.at = Instant::now() + delay;
                info!(attempt = pending.attempts, ?delay, "feed reconnect scheduled");
            }
            None => {
                let attempts = pending.attempts;
                self.reconnect = None;
                warn!(attempts, "giving up on the live feed");
                if let Some(session) = self.session.as_mut() {
                    session.close().await;
                }
            }
        }
    }

    async fn resubscribe(&mut self) {
        let live = self
            .session
            .as_ref()
            .is_some_and(|s| s.state() == SessionState::Live && !s.has_feed());
        if !live {
            self.reconnect = None;
            return;
        }
        self.subscribe();
    }

    async fn teardown(&mut self) {
        self.reconnect = None;
        self.abandon_connect();
        if let Some(session) = self.session.as_mut() {
            session.close().await;
        }
        self.publish();
        self.status.send_modify(|s| s.stopped = true);
        info!("synchronizer stopped");
    }

    fn publish(&self) {
        let status = match &self.session {
            Some(session) => SessionStatus {
                generation: session.generation(),
                params: Some(session.params().clone()),
                state: session.state(),
                bars: session.series().len(),
                last_bar_time: session.series().last().map(|b| b.time),
                feed_connected: session.has_feed(),
                reconnect_attempt: self.reconnect.as_ref().map(|r| r.attempts),
                last_error: self.last_error.clone(),
                counters: self.counters,
                stopped: false,
            },
            None => SessionStatus {
                counters: self.counters,
                ..SessionStatus::default()
            },
        };

        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

async fn next_feed_item(
    session: Option<&mut Session>,
) -> (Generation, Option<Result<Bar, FeedError>>) {
    let Some(session) = session else {
        return pending().await;
    };
    let generation = session.generation();
    match session.feed_mut() {
        Some(feed) => (generation, feed.next_bar().await),
        None => pending().await,
    }
}

async fn connect_finished(connecting: Option<&mut BoxFuture<'static, Connected>>) -> Connected {
    match connecting {
        Some(connect) => connect.await,
        None => pending().await,
    }
}

async fn sleep_until(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => pending().await,
    }
}

/// Drops bars the policy refuses, returning the survivors and how many were dropped.
fn sanitize_history(bars: Vec<Bar>, policy: OhlcPolicy) -> (Vec<Bar>, u64) {
    let mut dropped = 0;
    let kept = bars
        .into_iter()
        .filter_map(|bar| match bar.sanitize(policy) {
            Ok(bar) => Some(bar),
            Err(reason) => {
                dropped += 1;
                warn!(time = bar.time, %reason, "dropping invalid historical bar");
                None
            }
        })
        .collect();
    (kept, dropped)
}

/// One historical load: each attempt is bounded by `timeout`, and retryable failures
/// are tried again on the `backoff` schedule.
pub(crate) async fn fetch_with_retry(
    provider: &dyn HistoricalProvider,
    request: &KlinesRequestParams,
    timeout: Duration,
    backoff: ExponentialBuilder,
) -> Result<Vec<Bar>, FetchError> {
    (move || async move {
        tokio::time::timeout(timeout, provider.fetch_bars(request))
            .await
            .unwrap_or_else(|_| FetchTimeoutSnafu { after: timeout }.fail())
    })
    .retry(backoff)
    .when(FetchError::is_retryable)
    .notify(|err, delay| warn!(error = %err, ?delay, "historical load failed, retrying"))
    .await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::{
        models::{instrument::Symbol, timeframe::Interval},
        providers::errors::{DecodeResponseSnafu, StatusSnafu},
    };
    use snafu::IntoError;

    enum Behaviour {
        Hang,
        Status(u16),
        Decode,
    }

    /// Fails with `behaviour` until `succeed_after` calls have been made.
    struct Flaky {
        calls: AtomicUsize,
        succeed_after: usize,
        behaviour: Behaviour,
    }

    #[async_trait]
    impl HistoricalProvider for Flaky {
        async fn fetch_bars(&self, _params: &KlinesRequestParams) -> Result<Vec<Bar>, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call >= self.succeed_after {
                return Ok(vec![Bar::new(60, 1.0, 1.0, 1.0, 1.0)]);
            }
            match self.behaviour {
                Behaviour::Hang => pending().await,
                Behaviour::Status(status) => StatusSnafu { status, body: "err" }.fail(),
                Behaviour::Decode => {
                    let source = serde_json::from_str::<Vec<u8>>("{").unwrap_err();
                    Err(DecodeResponseSnafu.into_error(source))
                }
            }
        }
    }

    fn flaky(behaviour: Behaviour, succeed_after: usize) -> Flaky {
        Flaky {
            calls: AtomicUsize::new(0),
            succeed_after,
            behaviour,
        }
    }

    fn request() -> KlinesRequestParams {
        KlinesRequestParams::new(Symbol::new("BTCUSDT").unwrap(), Interval::OneHour, 10)
    }

    fn two_retries() -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(10))
            .with_max_times(2)
    }

    #[tokio::test(start_paused = true)]
    async fn server_errors_are_retried() {
        let provider = flaky(Behaviour::Status(503), 2);
        let bars = fetch_with_retry(&provider, &request(), Duration::from_secs(1), two_retries())
            .await
            .unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded() {
        let provider = flaky(Behaviour::Status(500), usize::MAX);
        let err = fetch_with_retry(&provider, &request(), Duration::from_secs(1), two_retries())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 500, .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_requests_time_out() {
        let provider = flaky(Behaviour::Hang, usize::MAX);
        let err = fetch_with_retry(
            &provider,
            &request(),
            Duration::from_millis(100),
            ExponentialBuilder::default().with_max_times(0),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FetchError::FetchTimeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_are_not_retried() {
        for behaviour in [Behaviour::Status(400), Behaviour::Decode] {
            let provider = flaky(behaviour, usize::MAX);
            assert!(
                fetch_with_retry(&provider, &request(), Duration::from_secs(1), two_retries())
                    .await
                    .is_err()
            );
            assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn invalid_history_bars_are_dropped_individually() {
        let bars = vec![
            Bar::new(1, 1.0, 2.0, 0.5, 1.5),
            Bar::new(2, 1.0, 0.9, 0.5, 1.5),
            Bar::new(3, f64::NAN, 2.0, 0.5, 1.5),
        ];

        let (kept, dropped) = sanitize_history(bars.clone(), OhlcPolicy::Reject);
        assert_eq!(kept, vec![bars[0]]);
        assert_eq!(dropped, 2);

        let (kept, dropped) = sanitize_history(bars, OhlcPolicy::Clamp);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[1].high, 1.5);
        assert_eq!(dropped, 1);
    }
}
