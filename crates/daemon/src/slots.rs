//! Job slot pool for Transcode Watcher
//!
//! Counts in-flight encodes against the configured concurrency limit.
//! Admission and release both happen on the dispatch loop, so a plain
//! counter is enough to keep `0 <= active <= max`.

/// Bounded counter of running jobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotPool {
    /// Maximum number of concurrent jobs
    max_concurrent: usize,
    /// Number of jobs currently holding a slot
    active: usize,
    /// Highest `active` value observed
    peak: usize,
}

impl SlotPool {
    /// Create a pool with `max_concurrent` slots (at least one)
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            active: 0,
            peak: 0,
        }
    }

    /// Take a slot if one is free
    ///
    /// Returns false when the pool is full.
    pub fn try_admit(&mut self) -> bool {
        if self.active >= self.max_concurrent {
            return false;
        }
        self.active += 1;
        self.peak = self.peak.max(self.active);
        true
    }

    /// Give a slot back
    pub fn release(&mut self) {
        debug_assert!(self.active > 0, "released a slot that was never admitted");
        self.active = self.active.saturating_sub(1);
    }

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn peak(&self) -> usize {
        self.peak
    }

    pub fn has_capacity(&self) -> bool {
        self.active < self.max_concurrent
    }

    /// True when no job holds a slot
    pub fn is_idle(&self) -> bool {
        self.active == 0
    }
}
