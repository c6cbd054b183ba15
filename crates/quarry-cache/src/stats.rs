//! Per-tier counters and the snapshot returned by `get_cache_stats`.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
pub(crate) struct TierCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
}

impl TierCounters {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn evicted(&self, n: u64) {
        self.evictions.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn invalidated(&self, n: u64) {
        self.invalidations.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, entries: u64) -> TierStats {
        TierStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            entries,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
    pub invalidations: u64,
    pub entries: u64,
}

impl TierStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub l1: TierStats,
    pub l2_hot: TierStats,
    pub l2_persistent: TierStats,
    pub l3: TierStats,
    pub l1_capacity: u64,
    /// Persistent tier failed and L2 is running hot-only.
    pub l2_persistent_degraded: bool,
    pub l3_enabled: bool,
    /// Current L3 coherence generation.
    pub generation: u64,
}

impl CacheStats {
    /// Combined L2 hit rate, counting a persistent hit after a hot miss as a hit.
    pub fn l2_hit_rate(&self) -> f64 {
        let lookups = self.l2_hot.hits + self.l2_hot.misses;
        if lookups == 0 {
            return 0.0;
        }
        (self.l2_hot.hits + self.l2_persistent.hits) as f64 / lookups as f64
    }
}
