//! L1 query-embedding cache using moka.
//!
//! LRU eviction, bounded entry count, session-scoped keys.
//! Fastest tier, sub-microsecond lookups.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use parking_lot::RwLock;

use quarry_core::models::{CacheKey, CacheScope, CacheTier};

use crate::entry::{embedding_size_bytes, CacheEntry};
use crate::keys;
use crate::stats::{TierCounters, TierStats};

type EmbeddingMap = Cache<CacheKey, Arc<CacheEntry<Vec<f32>>>>;

pub struct L1QueryCache {
    // Swapped wholesale on resize; moka caches cannot change capacity in place.
    cache: RwLock<EmbeddingMap>,
    capacity: AtomicU64,
    counters: Arc<TierCounters>,
}

impl L1QueryCache {
    pub fn new(capacity: u64) -> Self {
        let counters = Arc::new(TierCounters::default());
        Self {
            cache: RwLock::new(build(capacity, &counters)),
            capacity: AtomicU64::new(capacity),
            counters,
        }
    }

    /// Look up the embedding of `query` under `scope` for `model`.
    pub fn get(&self, scope: &CacheScope, model: &str, query: &str) -> Option<Vec<f32>> {
        let key = keys::query_key(scope, model, query);
        let entry = self.cache.read().get(&key);
        match entry {
            Some(entry) => {
                entry.touch();
                self.counters.hit();
                Some(entry.value.clone())
            }
            None => {
                self.counters.miss();
                None
            }
        }
    }

    pub fn put(&self, scope: &CacheScope, model: &str, query: &str, embedding: Vec<f32>) {
        let key = keys::query_key(scope, model, query);
        let size = embedding_size_bytes(&embedding);
        let entry = Arc::new(CacheEntry::new(CacheTier::L1, key.clone(), embedding, size));
        self.cache.read().insert(key, entry);
        self.counters.insert();
    }

    /// Drop every entry written under `scope`.
    pub fn purge_scope(&self, scope: &CacheScope) -> usize {
        let cache = self.cache.read();
        let doomed: Vec<Arc<CacheKey>> = cache
            .iter()
            .filter(|(k, _)| k.scope == *scope)
            .map(|(k, _)| k)
            .collect();
        for key in &doomed {
            cache.invalidate(key.as_ref());
        }
        self.counters.invalidated(doomed.len() as u64);
        doomed.len()
    }

    /// Rebuild with a new bound, carrying over as many entries as fit.
    pub fn resize(&self, capacity: u64) {
        if capacity == self.capacity() {
            return;
        }
        let mut guard = self.cache.write();
        let resized = build(capacity, &self.counters);
        for (key, entry) in guard.iter() {
            resized.insert(key.as_ref().clone(), entry);
        }
        resized.run_pending_tasks();
        *guard = resized;
        self.capacity.store(capacity, Ordering::Relaxed);
    }

    pub fn capacity(&self) -> u64 {
        self.capacity.load(Ordering::Relaxed)
    }

    /// Number of entries currently in the cache.
    pub fn len(&self) -> u64 {
        let cache = self.cache.read();
        cache.run_pending_tasks();
        cache.entry_count()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invalidate all entries.
    pub fn clear(&self) {
        self.cache.read().invalidate_all();
    }

    pub fn stats(&self) -> TierStats {
        self.counters.snapshot(self.len())
    }
}

fn build(capacity: u64, counters: &Arc<TierCounters>) -> EmbeddingMap {
    let counters = Arc::clone(counters);
    Cache::builder()
        .max_capacity(capacity)
        .eviction_policy(EvictionPolicy::lru())
        .eviction_listener(move |_key, _value, cause| {
            if cause.was_evicted() {
                counters.evicted(1);
            }
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::SessionId;

    #[test]
    fn insert_and_get() {
        let cache = L1QueryCache::new(100);
        cache.put(&CacheScope::Global, "m", "what is rust", vec![1.0, 2.0]);
        assert_eq!(
            cache.get(&CacheScope::Global, "m", "What  is Rust"),
            Some(vec![1.0, 2.0])
        );
    }

    #[test]
    fn miss_returns_none() {
        let cache = L1QueryCache::new(100);
        assert_eq!(cache.get(&CacheScope::Global, "m", "nonexistent"), None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn model_is_part_of_key() {
        let cache = L1QueryCache::new(100);
        cache.put(&CacheScope::Global, "model-a", "q", vec![1.0]);
        assert!(cache.get(&CacheScope::Global, "model-b", "q").is_none());
    }

    #[test]
    fn purge_scope_leaves_other_scopes() {
        let cache = L1QueryCache::new(100);
        let s1 = CacheScope::Session(SessionId::from("s1"));
        cache.put(&s1, "m", "q", vec![1.0]);
        cache.put(&CacheScope::Global, "m", "q", vec![2.0]);
        assert_eq!(cache.purge_scope(&s1), 1);
        assert!(cache.get(&s1, "m", "q").is_none());
        assert_eq!(cache.get(&CacheScope::Global, "m", "q"), Some(vec![2.0]));
    }

    #[test]
    fn bounded_by_capacity() {
        let cache = L1QueryCache::new(10);
        for i in 0..100 {
            cache.put(&CacheScope::Global, "m", &format!("q{i}"), vec![i as f32]);
        }
        assert!(cache.len() <= 10);
        assert!(cache.stats().evictions > 0);
    }

    #[test]
    fn resize_keeps_entries_that_fit() {
        let cache = L1QueryCache::new(10);
        cache.put(&CacheScope::Global, "m", "keep", vec![1.0]);
        cache.resize(50);
        assert_eq!(cache.capacity(), 50);
        assert_eq!(cache.get(&CacheScope::Global, "m", "keep"), Some(vec![1.0]));
    }
}
