// SPDX-License-Identifier: MIT OR Apache-2.0
//! Comprehension telemetry: is the five-second target being met?

use crate::view::COMPREHENSION_TARGET_SEC;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters over generated views.
///
/// Clones share the same counters.
#[derive(Debug, Clone, Default)]
pub struct ComprehensionStats {
    inner: Arc<StatsInner>,
}

#[derive(Debug, Default)]
struct StatsInner {
    views: AtomicU64,
    total_read_secs: AtomicU64,
    over_target: AtomicU64,
}

impl ComprehensionStats {
    /// Fresh zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one generated view's estimated read time.
    pub fn observe(&self, read_time_sec: u32) {
        self.inner.views.fetch_add(1, Ordering::Relaxed);
        self.inner
            .total_read_secs
            .fetch_add(u64::from(read_time_sec), Ordering::Relaxed);
        if read_time_sec > COMPREHENSION_TARGET_SEC {
            self.inner.over_target.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Views generated so far.
    #[must_use]
    pub fn views_generated(&self) -> u64 {
        self.inner.views.load(Ordering::Relaxed)
    }

    /// Mean estimated read time across all views, in seconds.
    #[must_use]
    pub fn mean_read_time_sec(&self) -> f64 {
        let views = self.inner.views.load(Ordering::Relaxed);
        if views == 0 {
            return 0.0;
        }
        self.inner.total_read_secs.load(Ordering::Relaxed) as f64 / views as f64
    }

    /// Views whose estimate exceeded the five-second target.
    #[must_use]
    pub fn over_target_count(&self) -> u64 {
        self.inner.over_target.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stats_report_zero() {
        let stats = ComprehensionStats::new();
        assert_eq!(stats.views_generated(), 0);
        assert_eq!(stats.mean_read_time_sec(), 0.0);
        assert_eq!(stats.over_target_count(), 0);
    }

    #[test]
    fn observe_accumulates() {
        let stats = ComprehensionStats::new();
        stats.observe(2);
        stats.observe(4);
        stats.observe(9);
        assert_eq!(stats.views_generated(), 3);
        assert!((stats.mean_read_time_sec() - 5.0).abs() < 1e-9);
        assert_eq!(stats.over_target_count(), 1);
    }

    #[test]
    fn exactly_on_target_is_not_over() {
        let stats = ComprehensionStats::new();
        stats.observe(COMPREHENSION_TARGET_SEC);
        assert_eq!(stats.over_target_count(), 0);
    }

    #[test]
    fn clones_share_counters() {
        let stats = ComprehensionStats::new();
        let clone = stats.clone();
        stats.observe(1);
        assert_eq!(clone.views_generated(), 1);
    }
}
