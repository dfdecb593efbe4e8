#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    future::Future,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use live_series::{
    SessionStatus, SyncConfig, SynchronizerHandle,
    config::ReconnectConfig,
    models::{
        bar::Bar,
        instrument::Symbol,
        request_params::KlinesRequestParams,
        session_params::{Representation, SessionParameters},
        timeframe::{Interval, Timeframe},
    },
    providers::{
        FeedConnection, FeedError, FeedProvider, FetchError, HistoricalProvider,
        errors::{StatusSnafu, UpstreamSnafu},
    },
};
use tokio::sync::{Notify, mpsc};

pub const WAIT: Duration = Duration::from_secs(5);

pub fn sym(s: &str) -> Symbol {
    Symbol::new(s).unwrap()
}

pub fn params(symbol: &str, timeframe: Timeframe, representation: Representation) -> SessionParameters {
    SessionParameters::new(sym(symbol), timeframe, representation)
}

pub fn bar(time: i64, close: f64) -> Bar {
    Bar::new(time, close, close + 2.0, close - 2.0, close + 1.0)
}

/// `count` consecutive daily bars ending one day before `end`.
pub fn daily_bars(end: i64, count: usize, base: f64) -> Vec<Bar> {
    (0..count)
        .map(|i| {
            let back = (count - i) as i64;
            bar(end - back * 86_400, base + i as f64)
        })
        .collect()
}

/// Fast, deterministic settings for driving a synchronizer in tests.
pub fn test_config() -> SyncConfig {
    SyncConfig {
        fetch_timeout_secs: 30,
        fetch_retries: 0,
        reconnect: ReconnectConfig {
            max_attempts: 3,
            min_delay_ms: 10,
            max_delay_ms: 50,
            jitter: false,
        },
        ..SyncConfig::default()
    }
}

pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(WAIT, fut)
        .await
        .expect("timed out waiting")
}

/// Polls `condition` until it holds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    within(async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}

pub async fn wait_status(
    handle: &SynchronizerHandle,
    predicate: impl FnMut(&SessionStatus) -> bool,
) -> SessionStatus {
    within(handle.wait_for(predicate)).await.unwrap()
}

/// Historical provider that serves canned bars per symbol.
///
/// A symbol can be held behind a gate so its load stays in flight until the test
/// releases it, or made to fail.
#[derive(Default)]
pub struct ScriptedHistory {
    bars: Mutex<HashMap<Symbol, Vec<Bar>>>,
    gates: Mutex<HashMap<Symbol, Arc<Notify>>>,
    failing: Mutex<HashSet<Symbol>>,
    requests: Mutex<Vec<KlinesRequestParams>>,
}

impl ScriptedHistory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, symbol: &str, bars: Vec<Bar>) {
        self.bars.lock().unwrap().insert(sym(symbol), bars);
    }

    /// Holds loads for `symbol` until the returned gate is notified.
    pub fn hold(&self, symbol: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().unwrap().insert(sym(symbol), gate.clone());
        gate
    }

    pub fn fail(&self, symbol: &str) {
        self.failing.lock().unwrap().insert(sym(symbol));
    }

    pub fn requests(&self) -> Vec<KlinesRequestParams> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HistoricalProvider for ScriptedHistory {
    async fn fetch_bars(&self, params: &KlinesRequestParams) -> Result<Vec<Bar>, FetchError> {
        self.requests.lock().unwrap().push(params.clone());

        let gate = self.gates.lock().unwrap().get(&params.symbol).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.failing.lock().unwrap().contains(&params.symbol) {
            return StatusSnafu {
                status: 400u16,
                body: "{\"code\":-1121,\"msg\":\"Invalid symbol.\"}",
            }
            .fail();
        }

        Ok(self
            .bars
            .lock()
            .unwrap()
            .get(&params.symbol)
            .cloned()
            .unwrap_or_default())
    }
}

type FeedItem = Option<Result<Bar, FeedError>>;

/// Feed provider whose connections are driven by the test.
///
/// Tracks how many connections are open at once; a connection only counts as closed
/// once its `close` has been called.
#[derive(Default)]
pub struct ScriptedFeed {
    open: Arc<AtomicUsize>,
    max_open: Arc<AtomicUsize>,
    refuse: AtomicUsize,
    held: Mutex<Option<Arc<Notify>>>,
    subscriptions: Mutex<Vec<(Symbol, Interval)>>,
    senders: Mutex<Vec<mpsc::UnboundedSender<FeedItem>>>,
}

impl ScriptedFeed {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn max_open(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }

    pub fn subscriptions(&self) -> Vec<(Symbol, Interval)> {
        self.subscriptions.lock().unwrap().clone()
    }

    /// The next subscribe call stays in flight until the returned gate is notified.
    pub fn hold_next_subscribe(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.held.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// The next `n` subscribe calls fail.
    pub fn refuse_next(&self, n: usize) {
        self.refuse.store(n, Ordering::SeqCst);
    }

    fn send(&self, item: FeedItem) {
        let senders = self.senders.lock().unwrap();
        let tx = senders.last().expect("no feed was ever opened");
        let _ = tx.send(item);
    }

    /// Delivers a bar on the most recent connection.
    pub fn push(&self, bar: Bar) {
        self.send(Some(Ok(bar)));
    }

    pub fn push_garbage(&self) {
        let source = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        self.send(Some(Err(snafu::IntoError::into_error(
            live_series::providers::errors::DecodeMessageSnafu { payload: "{oops" },
            source,
        ))));
    }

    /// Kills the most recent connection with a fatal error.
    pub fn kill(&self) {
        self.send(Some(Err(UpstreamSnafu {
            message: "connection reset",
        }
        .build())));
    }

    /// Ends the most recent connection cleanly.
    pub fn end(&self) {
        self.send(None);
    }
}

#[async_trait]
impl FeedProvider for ScriptedFeed {
    async fn subscribe(
        &self,
        symbol: &Symbol,
        interval: Interval,
    ) -> Result<Box<dyn FeedConnection>, FeedError> {
        self.subscriptions
            .lock()
            .unwrap()
            .push((symbol.clone(), interval));

        let held = self.held.lock().unwrap().take();
        if let Some(gate) = held {
            gate.notified().await;
        }

        let refused = self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return UpstreamSnafu {
                message: "subscribe refused",
            }
            .fail();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().unwrap().push(tx);

        let now_open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open.fetch_max(now_open, Ordering::SeqCst);

        Ok(Box::new(ScriptedConnection {
            rx,
            open: self.open.clone(),
            closed: false,
        }))
    }
}

struct ScriptedConnection {
    rx: mpsc::UnboundedReceiver<FeedItem>,
    open: Arc<AtomicUsize>,
    closed: bool,
}

#[async_trait]
impl FeedConnection for ScriptedConnection {
    async fn next_bar(&mut self) -> Option<Result<Bar, FeedError>> {
        if self.closed {
            return None;
        }
        match self.rx.recv().await {
            Some(item) => item,
            None => None,
        }
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Answers HTTP requests on a loopback port with canned `(status, body)` pairs, in order.
///
/// Returns the base URL and a handle yielding the request lines that were received.
pub async fn serve_http(
    responses: Vec<(u16, &'static str)>,
) -> (String, tokio::task::JoinHandle<Vec<String>>) {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let task = tokio::spawn(async move {
        let mut seen = Vec::new();
        for (status, body) in responses {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let mut len = 0;
            while !buf[..len].windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf[len..]).await.unwrap();
                if n == 0 {
                    break;
                }
                len += n;
            }
            let request = String::from_utf8_lossy(&buf[..len]);
            seen.push(request.lines().next().unwrap_or_default().to_string());

            let response = format!(
                "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
        }
        seen
    });

    (base, task)
}
