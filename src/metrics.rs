use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Point-in-time cache counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Requests served from an existing entry.
    pub hits: u64,
    /// Requests that computed and persisted a new entry.
    pub misses: u64,
}

impl CacheStats {
    /// Total requests observed.
    pub fn requests(&self) -> u64 {
        self.hits + self.misses
    }

    /// Fraction of requests served from disk; `0.0` before any request.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.requests();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Lock-free counters shared by concurrent cache readers.
#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheCounters {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_ratio_reports_share_of_hits() {
        let counters = CacheCounters::default();
        assert_eq!(counters.snapshot().hit_ratio(), 0.0);

        counters.record_miss();
        counters.record_hit();
        counters.record_hit();
        counters.record_hit();
        let stats = counters.snapshot();
        assert_eq!(stats.requests(), 4);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_ratio() - 0.75).abs() < 1e-9);
    }
}
