//! Bounded per-channel sample history
//!
//! A fixed-capacity ring, newest sample first. Pushing into a full buffer is
//! the steady state: the oldest sample is evicted.

use std::collections::VecDeque;

use super::types::Sample;

/// Default number of samples retained per channel
pub const DATA_HISTORY: usize = 50;

/// Newest-first ring of samples for one channel
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl HistoryBuffer {
    /// Create an empty buffer. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Prepend a sample, evicting the oldest one when full
    pub fn push(&mut self, sample: Sample) {
        self.samples.push_front(sample);
        if self.samples.len() > self.capacity {
            self.samples.pop_back();
        }
    }

    /// Most recent sample
    pub fn latest(&self) -> Option<&Sample> {
        self.samples.front()
    }

    /// All retained samples, newest first.
    ///
    /// Iterating does not touch the buffer, so it can be restarted freely.
    pub fn all(&self) -> impl ExactSizeIterator<Item = &Sample> + Clone + '_ {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copy the retained samples out, newest first
    pub fn to_vec(&self) -> Vec<Sample> {
        self.samples.iter().cloned().collect()
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DATA_HISTORY)
    }
}
