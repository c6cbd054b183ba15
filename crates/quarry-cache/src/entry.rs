//! Cache entry wrapper shared by every tier.
//!
//! Tiers store `Arc<CacheEntry<V>>`. A reader clones the `Arc` out of the map
//! before touching the value, so eviction never pulls an entry out from under
//! an in-flight read.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use quarry_core::models::{CacheKey, CacheTier};

#[derive(Debug)]
pub struct CacheEntry<V> {
    pub tier: CacheTier,
    pub key: CacheKey,
    pub value: V,
    pub size_bytes: usize,
    pub created_at: DateTime<Utc>,
    last_access_ms: AtomicI64,
    access_count: AtomicU64,
}

impl<V> CacheEntry<V> {
    pub fn new(tier: CacheTier, key: CacheKey, value: V, size_bytes: usize) -> Self {
        let now = Utc::now();
        Self {
            tier,
            key,
            value,
            size_bytes,
            created_at: now,
            last_access_ms: AtomicI64::new(now.timestamp_millis()),
            access_count: AtomicU64::new(0),
        }
    }

    /// Record a read.
    pub fn touch(&self) {
        self.last_access_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        self.access_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn last_access(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_access_ms.load(Ordering::Relaxed))
            .unwrap_or(self.created_at)
    }

    pub fn access_count(&self) -> u64 {
        self.access_count.load(Ordering::Relaxed)
    }
}

/// Payload size of an embedding vector.
pub fn embedding_size_bytes(vector: &[f32]) -> usize {
    std::mem::size_of_val(vector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::models::CacheScope;

    #[test]
    fn touch_counts_reads() {
        let key = CacheKey::builder(CacheScope::Global, "t").part("x").build();
        let entry = CacheEntry::new(CacheTier::L1, key, vec![1.0f32, 2.0], 8);
        assert_eq!(entry.access_count(), 0);
        entry.touch();
        entry.touch();
        assert_eq!(entry.access_count(), 2);
        assert!(entry.last_access() >= entry.created_at);
    }
}
