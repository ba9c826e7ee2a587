//! Job progress accounting shared by concurrently running targets

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

/// Counts resolved stages against the number requested across all targets.
///
/// The reported percentage never decreases and stays below 100; only a
/// completed job reports 100.
#[derive(Debug)]
pub struct ProgressTracker {
    total: usize,
    resolved: AtomicUsize,
    percent: AtomicU8,
}

impl ProgressTracker {
    /// `total` = requested stages per target x targets
    pub fn new(total: usize) -> Self {
        Self {
            total,
            resolved: AtomicUsize::new(0),
            percent: AtomicU8::new(0),
        }
    }

    /// Record one more resolved stage and return the current percentage
    pub fn advance(&self) -> u8 {
        let resolved = self.resolved.fetch_add(1, Ordering::SeqCst) + 1;
        let computed = if self.total == 0 {
            99
        } else {
            (resolved.min(self.total) * 100 / self.total).min(99) as u8
        };
        let previous = self.percent.fetch_max(computed, Ordering::SeqCst);
        previous.max(computed)
    }

    pub fn percent(&self) -> u8 {
        self.percent.load(Ordering::SeqCst)
    }

    pub fn resolved(&self) -> usize {
        self.resolved.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total
    }
}
