//! Ordered bar history for one session and the rules for merging live ticks into it.

use crate::models::{
    bar::{Bar, SeriesItem},
    session_params::Representation,
};

/// What [`BarSeries::merge`] did with an incoming bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MergeOutcome {
    /// Same bucket as the last bar: it was overwritten in place.
    Replaced,
    /// Newer bucket (or first bar): appended.
    Appended,
    /// Older than the last bar: ignored, series untouched.
    Dropped { last_time: i64 },
}

impl MergeOutcome {
    pub fn is_applied(&self) -> bool {
        !matches!(self, MergeOutcome::Dropped { .. })
    }
}

/// Bars in strictly ascending time order, one per bucket.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BarSeries {
    bars: Vec<Bar>,
}

impl BarSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a series from bars in any order. Later duplicates of a timestamp win.
    pub fn from_bars(bars: Vec<Bar>) -> Self {
        let mut series = Self::new();
        series.replace(bars);
        series
    }

    /// Replaces the whole history. Nothing from the previous content survives.
    pub fn replace(&mut self, mut bars: Vec<Bar>) {
        // stable sort keeps arrival order among equal timestamps
        bars.sort_by_key(|b| b.time);

        let mut out: Vec<Bar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match out.last_mut() {
                Some(last) if last.time == bar.time => *last = bar,
                _ => out.push(bar),
            }
        }
        self.bars = out;
    }

    /// Merges one live bar.
    pub fn merge(&mut self, bar: Bar) -> MergeOutcome {
        match self.bars.last_mut() {
            Some(last) if bar.time == last.time => {
                *last = bar;
                MergeOutcome::Replaced
            }
            Some(last) if bar.time < last.time => MergeOutcome::Dropped {
                last_time: last.time,
            },
            _ => {
                self.bars.push(bar);
                MergeOutcome::Appended
            }
        }
    }

    /// Renders the whole history for a chart of the given representation.
    pub fn project(&self, representation: Representation) -> Vec<SeriesItem> {
        self.bars.iter().map(|b| representation.project(b)).collect()
    }

    pub fn into_bars(self) -> Vec<Bar> {
        self.bars
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}
