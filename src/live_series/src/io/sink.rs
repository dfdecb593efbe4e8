//! The rendering seam: where projected series items end up.
//!
//! A chart library only ever sees two calls, "replace everything" ([`SeriesSink::set_data`])
//! and "upsert the newest item" ([`SeriesSink::update`]). Each session gets its own sink
//! from a [`SurfaceFactory`] and releases it when the session closes, so a sink is never
//! written by two sessions.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::warn;

use crate::{
    models::{bar::SeriesItem, session_params::SessionParameters},
    session::Generation,
};

/// One chart series owned by one session.
pub trait SeriesSink: Send {
    /// Replaces the whole series.
    fn set_data(&mut self, items: Vec<SeriesItem>);

    /// Overwrites the last item if `item` has the same time, otherwise appends it.
    fn update(&mut self, item: SeriesItem);

    /// Detaches the series from the chart. No calls follow.
    fn release(&mut self);
}

/// Creates a fresh series for each session.
pub trait SurfaceFactory: Send + Sync {
    fn create(&self, generation: Generation, params: &SessionParameters) -> Box<dyn SeriesSink>;
}

/// What an in-memory chart series currently shows.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedSeries {
    pub generation: Generation,
    pub params: SessionParameters,
    pub items: Vec<SeriesItem>,
    pub set_data_calls: usize,
    pub updates: usize,
    pub released: bool,
}

/// A chart surface that keeps everything in memory.
///
/// Every series ever created stays inspectable, in creation order, which is what the
/// CLI prints from and what tests assert against.
#[derive(Debug, Clone, Default)]
pub struct MemorySurface {
    series: Arc<Mutex<Vec<RenderedSeries>>>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<RenderedSeries>> {
        self.series.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The series that is still attached, if any.
    pub fn current(&self) -> Option<RenderedSeries> {
        self.lock().iter().rev().find(|s| !s.released).cloned()
    }

    /// Every series created so far, oldest first.
    pub fn history(&self) -> Vec<RenderedSeries> {
        self.lock().clone()
    }

    /// How many series are attached right now.
    pub fn attached(&self) -> usize {
        self.lock().iter().filter(|s| !s.released).count()
    }
}

impl SurfaceFactory for MemorySurface {
    fn create(&self, generation: Generation, params: &SessionParameters) -> Box<dyn SeriesSink> {
        let mut all = self.lock();
        all.push(RenderedSeries {
            generation,
            params: params.clone(),
            items: Vec::new(),
            set_data_calls: 0,
            updates: 0,
            released: false,
        });
        Box::new(MemorySink {
            series: Arc::clone(&self.series),
            index: all.len() - 1,
        })
    }
}

struct MemorySink {
    series: Arc<Mutex<Vec<RenderedSeries>>>,
    index: usize,
}

impl MemorySink {
    fn with<R>(&self, f: impl FnOnce(&mut RenderedSeries) -> R) -> R {
        let mut all = self.series.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut all[self.index])
    }
}

impl SeriesSink for MemorySink {
    fn set_data(&mut self, items: Vec<SeriesItem>) {
        self.with(|s| {
            s.items = items;
            s.set_data_calls += 1;
        });
    }

    fn update(&mut self, item: SeriesItem) {
        self.with(|s| {
            match s.items.last_mut() {
                Some(last) if last.time() == item.time() => *last = item,
                Some(last) if last.time() > item.time() => {
                    warn!(
                        generation = %s.generation,
                        time = item.time(),
                        last = last.time(),
                        "ignoring out-of-order series update"
                    );
                    return;
                }
                _ => s.items.push(item),
            }
            s.updates += 1;
        });
    }

    fn release(&mut self) {
        self.with(|s| s.released = true);
    }
}
