//! Rolling telemetry history
//!
//! Fixed-capacity FIFO window over the most recent samples. Arrival order is
//! preserved; the only removal is eviction from the front on overflow.

use crate::error::CoreError;
use crate::types::TelemetrySample;
use std::collections::VecDeque;
use std::sync::Arc;

/// Default number of samples retained
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Bounded, arrival-ordered sample buffer
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    capacity: usize,
    samples: VecDeque<Arc<TelemetrySample>>,
}

impl HistoryBuffer {
    /// Create buffer with given capacity
    ///
    /// # Errors
    /// `CoreError::InvalidCapacity` when `capacity` is zero
    pub fn new(capacity: usize) -> Result<Self, CoreError> {
        if capacity == 0 {
            return Err(CoreError::InvalidCapacity(capacity));
        }
        Ok(Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        })
    }

    /// Append a sample, evicting the oldest entries beyond capacity
    ///
    /// Returns the number of samples evicted.
    pub fn append(&mut self, sample: Arc<TelemetrySample>) -> usize {
        self.samples.push_back(sample);
        let mut evicted = 0;
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Oldest-first copy of the current window
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<TelemetrySample>> {
        self.samples.iter().cloned().collect()
    }

    /// Most recent sample
    #[inline]
    #[must_use]
    pub fn latest(&self) -> Option<&Arc<TelemetrySample>> {
        self.samples.back()
    }

    /// Iterate oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Arc<TelemetrySample>> {
        self.samples.iter()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_HISTORY_CAPACITY,
            samples: VecDeque::with_capacity(DEFAULT_HISTORY_CAPACITY),
        }
    }
}
