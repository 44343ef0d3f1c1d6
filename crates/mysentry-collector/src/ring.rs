use mysentry_common::types::MetricSample;
use std::collections::VecDeque;

/// Bounded in-memory ring buffer of samples for one metric.
///
/// Owned exclusively by the collector/evaluator pair; capacity is sized
/// from the rule window and poll interval at startup, so evicted
/// samples are never needed again.
pub struct SampleRing {
    capacity: usize,
    data: VecDeque<MetricSample>,
}

impl SampleRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            data: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    /// Append a sample, evicting the oldest when full.
    pub fn push(&mut self, sample: MetricSample) {
        if self.data.len() >= self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(sample);
    }

    /// The most recent `n` samples, oldest first. Returns fewer than
    /// `n` entries when the ring has not filled yet.
    pub fn recent(&self, n: usize) -> Vec<&MetricSample> {
        let start = self.data.len().saturating_sub(n);
        self.data.range(start..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricSample> {
        self.data.iter()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
