//! Per-worker success accounting.
//!
//! Every attempt reads the count when it starts and bumps it once the write
//! confirms a created item. The read is a relaxed load that is not ordered
//! against the attempt's own increment, so attempts started close together
//! can carry the same value. Records use it as an annotation of worker
//! progress, not as an exact tally.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Atomic success count shared by all attempts of one worker.
#[derive(Clone, Debug, Default)]
pub struct SuccessCounter {
    confirmed: Arc<AtomicU64>,
}

impl SuccessCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point-in-time read; may lag increments made by concurrent attempts.
    pub fn snapshot(&self) -> u64 {
        self.confirmed.load(Ordering::Relaxed)
    }

    /// Counts one confirmed success and returns the post-increment value.
    pub fn record_success(&self) -> u64 {
        self.confirmed.fetch_add(1, Ordering::AcqRel) + 1
    }
}
