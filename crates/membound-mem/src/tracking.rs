//! Lightweight high-water-mark tracking for admitted bytes.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct PeakTracker {
    peak_bytes: AtomicUsize,
}

impl PeakTracker {
    pub fn new() -> Self {
        Self {
            peak_bytes: AtomicUsize::new(0),
        }
    }

    /// Record a new "used bytes" value; updates peak if higher.
    pub fn record_used(&self, used_bytes: usize) {
        self.peak_bytes.fetch_max(used_bytes, Ordering::AcqRel);
        #[cfg(feature = "tracing")]
        tracing::trace!(
            used_bytes,
            peak = self.peak_bytes.load(Ordering::Relaxed),
            "limiter usage"
        );
    }

    pub fn peak(&self) -> usize {
        self.peak_bytes.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.peak_bytes.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_only_grows_until_reset() {
        let tracker = PeakTracker::new();
        tracker.record_used(10);
        tracker.record_used(40);
        tracker.record_used(20);
        assert_eq!(tracker.peak(), 40);

        tracker.reset();
        assert_eq!(tracker.peak(), 0);
        tracker.record_used(5);
        assert_eq!(tracker.peak(), 5);
    }
}
