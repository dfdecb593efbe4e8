//! One live chart binding: parameters, bar history, a sink, and eventually a feed.
//!
//! A session only moves forward through [`SessionState`]. Every write names the
//! generation it was produced for, and anything that does not match the session's own
//! generation, or that arrives after close, is refused without touching the series or
//! the sink.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    io::sink::SeriesSink,
    models::{
        bar::Bar,
        bar_series::{BarSeries, MergeOutcome},
        session_params::SessionParameters,
    },
    providers::FeedConnection,
};

/// Monotonic session id handed out by the synchronizer.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Generation(u64);

impl Generation {
    pub fn next(self) -> Self {
        Generation(self.0 + 1)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Loading,
    Live,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Loading => "loading",
            SessionState::Live => "live",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// A write that arrived for a session that is no longer allowed to take it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("stale write from session {origin} rejected (current {current}, {state})")]
pub struct StaleWriteRejected {
    pub origin: Generation,
    pub current: Generation,
    pub state: SessionState,
}

pub struct Session {
    generation: Generation,
    params: SessionParameters,
    state: SessionState,
    series: BarSeries,
    sink: Option<Box<dyn SeriesSink>>,
    feed: Option<Box<dyn FeedConnection>>,
}

impl Session {
    pub fn new(
        generation: Generation,
        params: SessionParameters,
        sink: Box<dyn SeriesSink>,
    ) -> Self {
        Self {
            generation,
            params,
            state: SessionState::Idle,
            series: BarSeries::new(),
            sink: Some(sink),
            feed: None,
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn params(&self) -> &SessionParameters {
        &self.params
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn series(&self) -> &BarSeries {
        &self.series
    }

    pub fn has_feed(&self) -> bool {
        self.feed.is_some()
    }

    pub fn feed_mut(&mut self) -> Option<&mut Box<dyn FeedConnection>> {
        self.feed.as_mut()
    }

    fn guard(&self, origin: Generation, allowed: &[SessionState]) -> Result<(), StaleWriteRejected> {
        if origin == self.generation && allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(StaleWriteRejected {
                origin,
                current: self.generation,
                state: self.state,
            })
        }
    }

    /// Idle -> Loading. A no-op in any other state.
    pub fn begin_loading(&mut self) {
        if self.state == SessionState::Idle {
            self.state = SessionState::Loading;
            debug!(generation = %self.generation, "session loading");
        }
    }

    /// Replaces the history with `bars` and pushes the whole projection to the sink.
    ///
    /// Returns the series length after the load.
    pub fn load(&mut self, origin: Generation, bars: Vec<Bar>) -> Result<usize, StaleWriteRejected> {
        self.guard(
            origin,
            &[SessionState::Idle, SessionState::Loading, SessionState::Live],
        )?;

        self.series.replace(bars);
        if let Some(sink) = self.sink.as_mut() {
            sink.set_data(self.series.project(self.params.representation));
        }
        self.state = SessionState::Live;

        info!(
            generation = %self.generation,
            params = %self.params,
            bars = self.series.len(),
            "history applied"
        );
        Ok(self.series.len())
    }

    /// Merges one live bar; accepted bars are forwarded to the sink.
    pub fn apply(&mut self, origin: Generation, bar: Bar) -> Result<MergeOutcome, StaleWriteRejected> {
        self.guard(origin, &[SessionState::Live])?;

        let outcome = self.series.merge(bar);
        if outcome.is_applied() {
            if let Some(sink) = self.sink.as_mut() {
                sink.update(self.params.representation.project(&bar));
            }
        }
        Ok(outcome)
    }

    /// Takes ownership of a feed opened for `origin`. A feed for another generation or
    /// for a session that is not live is closed straight away.
    pub async fn attach_feed(
        &mut self,
        origin: Generation,
        mut feed: Box<dyn FeedConnection>,
    ) -> Result<(), StaleWriteRejected> {
        if let Err(rejected) = self.guard(origin, &[SessionState::Live]) {
            feed.close().await;
            return Err(rejected);
        }
        if let Some(mut old) = self.feed.replace(feed) {
            old.close().await;
        }
        Ok(())
    }

    /// Closes and forgets the current feed, keeping the session and its data.
    pub async fn detach_feed(&mut self) {
        if let Some(mut feed) = self.feed.take() {
            feed.close().await;
        }
    }

    /// Moves to Closed, releases the sink, then closes the feed.
    ///
    /// Hands back the bar history so a follow-up session over the same source can be
    /// seeded from it. A second call returns an empty series.
    pub async fn close(&mut self) -> BarSeries {
        if self.state == SessionState::Closed {
            return BarSeries::new();
        }
        self.state = SessionState::Closed;

        if let Some(mut sink) = self.sink.take() {
            sink.release();
        }
        self.detach_feed().await;

        info!(generation = %self.generation, params = %self.params, "session closed");
        std::mem::take(&mut self.series)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("generation", &self.generation)
            .field("params", &self.params)
            .field("state", &self.state)
            .field("bars", &self.series.len())
            .field("feed", &self.feed.is_some())
            .finish()
    }
}
