//! Fixed-capacity, multi-channel FIFO time series.
//!
//! One `Sample` per polling tick, insertion order = chronological order.
//! The length never exceeds the configured capacity; inserting beyond it
//! evicts the oldest entry first. "No data yet" is an empty store, never
//! a sentinel sample.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::VecDeque;

/// Default history depth, matching the operator-facing strip chart.
pub const DEFAULT_CAPACITY: usize = 1000;

/// One poll tick's worth of readings. A channel whose device is absent
/// is `None`, never zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub at: DateTime<Local>,
    pub ph: Option<f64>,
    pub temperature: Option<f64>,
    pub dissolved_oxygen: Option<f64>,
}

/// Bounded FIFO of samples with a movable head (VecDeque-backed, O(1)
/// amortized push with no reallocation once warm).
#[derive(Debug)]
pub struct RingStore {
    buf: VecDeque<Sample>,
    capacity: usize,
}

impl RingStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Append at the tail, evicting the head first when full.
    pub fn push(&mut self, sample: Sample) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(sample);
    }

    /// The most recent sample, if any.
    pub fn latest(&self) -> Option<&Sample> {
        self.buf.back()
    }

    /// All samples with timestamp >= `t0`, in chronological order.
    ///
    /// `t0` later than everything stored yields an empty window; `t0`
    /// earlier than everything yields the full history (the chart clamps
    /// its left edge to the earliest sample, not to `t0`).
    pub fn window_since(&self, t0: DateTime<Local>) -> Vec<Sample> {
        // Timestamps are nondecreasing, so scan from the tail.
        let take = self.buf.iter().rev().take_while(|s| s.at >= t0).count();
        let skip = self.buf.len() - take;
        self.buf.iter().skip(skip).cloned().collect()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Default for RingStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
