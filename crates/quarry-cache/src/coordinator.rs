//! MultiTierCache owns the three tiers and the cross-tier rules:
//! document invalidation reaches L2 and L3, scope purges reach L1 and L3.

use std::path::Path;

use quarry_core::config::CacheConfig;
use quarry_core::models::CacheScope;
use quarry_observability::events;

use crate::l1_query::L1QueryCache;
use crate::l2_document::L2DocumentCache;
use crate::l3_result::L3ResultCache;
use crate::stats::CacheStats;

pub struct MultiTierCache {
    l1: L1QueryCache,
    l2: L2DocumentCache,
    l3: L3ResultCache,
}

impl MultiTierCache {
    /// Build all tiers. `cache_dir` enables the L2 persistent store.
    pub fn new(config: &CacheConfig, cache_dir: Option<&Path>) -> Self {
        let l2 = match cache_dir {
            Some(dir) => {
                L2DocumentCache::open(config.l2_hot_capacity, config.l2_total_capacity, dir)
            }
            None => L2DocumentCache::in_memory(config.l2_hot_capacity),
        };
        Self {
            l1: L1QueryCache::new(config.l1_capacity),
            l2,
            l3: L3ResultCache::new(
                config.l3_capacity,
                config.l3_ttl_secs,
                config.result_cache_enabled,
            ),
        }
    }

    pub fn l1(&self) -> &L1QueryCache {
        &self.l1
    }

    pub fn l2(&self) -> &L2DocumentCache {
        &self.l2
    }

    pub fn l3(&self) -> &L3ResultCache {
        &self.l3
    }

    /// Synchronously drop every entry derived from `doc_id`.
    ///
    /// L2 rows go first; the L3 generation is bumped after, so any retrieval
    /// that captures the new generation started after the L2 removal.
    pub fn invalidate_document(&self, doc_id: &str) -> usize {
        let removed = self.l2.invalidate_document(doc_id);
        let generation = self.l3.bump_generation();
        events::cache_invalidated(&format!("document:{doc_id}"), removed, generation);
        removed
    }

    pub fn invalidate_collection(&self, collection: &str) -> usize {
        let removed = self.l2.invalidate_collection(collection);
        let generation = self.l3.bump_generation();
        events::cache_invalidated(&format!("collection:{collection}"), removed, generation);
        removed
    }

    /// Mark every cached result stale, e.g. after an index publish.
    pub fn invalidate_results(&self) -> u64 {
        self.l3.bump_generation()
    }

    /// Drop every session-scoped entry of `scope`.
    pub fn purge_scope(&self, scope: &CacheScope) -> usize {
        let removed = self.l1.purge_scope(scope) + self.l3.purge_scope(scope);
        events::cache_invalidated(&scope.tag(), removed, self.l3.generation());
        removed
    }

    /// Apply advisory sizing from the tuner.
    pub fn apply_tuning(&self, l1_capacity: u64, result_cache_enabled: bool) {
        self.l1.resize(l1_capacity.max(1));
        self.l3.set_enabled(result_cache_enabled);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            l1: self.l1.stats(),
            l2_hot: self.l2.hot_stats(),
            l2_persistent: self.l2.persistent_stats(),
            l3: self.l3.stats(),
            l1_capacity: self.l1.capacity(),
            l2_persistent_degraded: self.l2.is_persistent_degraded(),
            l3_enabled: self.l3.is_enabled(),
            generation: self.l3.generation(),
        }
    }
}
