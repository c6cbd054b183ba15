//! L3 fused-result cache with TTL.
//!
//! Coherence is generation-based: every invalidation that could change a
//! result bumps the generation. Entries carry the generation observed when
//! their retrieval started and are discarded on read once it is stale.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;

use quarry_core::models::{CacheKey, CacheScope, CacheTier, RetrievedPassage};

use crate::entry::CacheEntry;
use crate::stats::{TierCounters, TierStats};

#[derive(Debug, Clone)]
pub struct CachedResult {
    pub results: Vec<RetrievedPassage>,
    pub index_version: u64,
    pub generation: u64,
}

pub struct L3ResultCache {
    cache: Cache<CacheKey, Arc<CacheEntry<CachedResult>>>,
    enabled: AtomicBool,
    generation: AtomicU64,
    counters: Arc<TierCounters>,
}

impl L3ResultCache {
    pub fn new(capacity: u64, ttl_secs: u64, enabled: bool) -> Self {
        let counters = Arc::new(TierCounters::default());
        let listener_counters = Arc::clone(&counters);
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(Duration::from_secs(ttl_secs))
            .eviction_listener(move |_key, _value, cause| {
                if cause.was_evicted() {
                    listener_counters.evicted(1);
                }
            })
            .build();
        Self {
            cache,
            enabled: AtomicBool::new(enabled),
            generation: AtomicU64::new(0),
            counters,
        }
    }

    /// Generation to capture before starting a retrieval.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Invalidate every existing entry lazily. Returns the new generation.
    pub fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self, key: &CacheKey) -> Option<CachedResult> {
        if !self.is_enabled() {
            return None;
        }
        let Some(entry) = self.cache.get(key) else {
            self.counters.miss();
            return None;
        };
        if entry.value.generation != self.generation() {
            self.cache.invalidate(key);
            self.counters.invalidated(1);
            self.counters.miss();
            return None;
        }
        entry.touch();
        self.counters.hit();
        Some(entry.value.clone())
    }

    /// Store a result computed from a retrieval that started at
    /// `generation_at_start`. Refused if an invalidation happened since.
    pub fn put(
        &self,
        key: CacheKey,
        results: Vec<RetrievedPassage>,
        index_version: u64,
        generation_at_start: u64,
    ) -> bool {
        if !self.is_enabled() || generation_at_start != self.generation() {
            return false;
        }
        let size = results
            .iter()
            .map(|r| r.doc_id.len() + r.snippet.len() + std::mem::size_of::<RetrievedPassage>())
            .sum();
        let value = CachedResult {
            results,
            index_version,
            generation: generation_at_start,
        };
        self.cache
            .insert(key.clone(), Arc::new(CacheEntry::new(CacheTier::L3, key, value, size)));
        self.counters.insert();
        true
    }

    pub fn purge_scope(&self, scope: &CacheScope) -> usize {
        let doomed: Vec<Arc<CacheKey>> = self
            .cache
            .iter()
            .filter(|(k, _)| k.scope == *scope)
            .map(|(k, _)| k)
            .collect();
        for key in &doomed {
            self.cache.invalidate(key.as_ref());
        }
        self.counters.invalidated(doomed.len() as u64);
        doomed.len()
    }

    pub fn set_enabled(&self, enabled: bool) {
        let was_enabled = self.enabled.swap(enabled, Ordering::SeqCst);
        if was_enabled && !enabled {
            self.cache.invalidate_all();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    pub fn stats(&self) -> TierStats {
        self.cache.run_pending_tasks();
        self.counters.snapshot(self.cache.entry_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(q: &str) -> CacheKey {
        CacheKey::builder(CacheScope::Global, "l3").part(q).build()
    }

    fn passage(id: &str) -> RetrievedPassage {
        RetrievedPassage {
            doc_id: id.to_string(),
            score: 1.0,
            snippet: String::new(),
            lexical_rank: Some(1),
            vector_rank: None,
        }
    }

    #[test]
    fn stale_generation_is_a_miss() {
        let cache = L3ResultCache::new(100, 300, true);
        let g = cache.generation();
        assert!(cache.put(key("q"), vec![passage("a")], 1, g));
        assert!(cache.get(&key("q")).is_some());
        cache.bump_generation();
        assert!(cache.get(&key("q")).is_none());
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[test]
    fn put_after_invalidation_is_refused() {
        let cache = L3ResultCache::new(100, 300, true);
        let started = cache.generation();
        cache.bump_generation();
        assert!(!cache.put(key("q"), vec![passage("a")], 1, started));
        assert!(cache.get(&key("q")).is_none());
    }

    #[test]
    fn disabled_cache_stores_nothing() {
        let cache = L3ResultCache::new(100, 300, true);
        cache.set_enabled(false);
        assert!(!cache.put(key("q"), vec![], 1, cache.generation()));
        cache.set_enabled(true);
        assert!(cache.get(&key("q")).is_none());
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = L3ResultCache::new(100, 1, true);
        cache.put(key("q"), vec![passage("a")], 1, cache.generation());
        std::thread::sleep(Duration::from_millis(1_100));
        assert!(cache.get(&key("q")).is_none());
    }
}
