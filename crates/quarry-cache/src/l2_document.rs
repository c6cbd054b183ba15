//! L2 document-embedding cache: a hot moka LRU over the SQLite store.
//!
//! Reads check hot, then persistent (promoting hits into hot). Writes go to
//! both. A persistent failure flips the tier into hot-only mode for the rest
//! of the process; the cache keeps serving.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use tracing::debug;

use quarry_core::errors::{CacheError, QuarryError, QuarryResult};
use quarry_core::models::{CacheKey, CacheTier, DocId};
use quarry_observability::events;

use crate::entry::{embedding_size_bytes, CacheEntry};
use crate::keys;
use crate::persistent::PersistentStore;
use crate::stats::{TierCounters, TierStats};

/// A cached document embedding plus what is needed to invalidate it.
#[derive(Debug, Clone, PartialEq)]
pub struct DocEmbedding {
    pub doc_id: DocId,
    pub collection: String,
    pub vector: Vec<f32>,
}

pub struct L2DocumentCache {
    hot: Cache<CacheKey, Arc<CacheEntry<DocEmbedding>>>,
    persistent: Option<PersistentStore>,
    persistent_degraded: AtomicBool,
    total_capacity: u64,
    hot_counters: Arc<TierCounters>,
    persistent_counters: Arc<TierCounters>,
}

impl L2DocumentCache {
    /// Hot tier only.
    pub fn in_memory(hot_capacity: u64) -> Self {
        Self::with_store(hot_capacity, hot_capacity, None)
    }

    /// Hot tier over a store in `dir`. If the store cannot be opened the
    /// cache starts in hot-only mode.
    pub fn open(hot_capacity: u64, total_capacity: u64, dir: &Path) -> Self {
        match PersistentStore::open(dir) {
            Ok(store) => Self::with_store(hot_capacity, total_capacity, Some(store)),
            Err(err) => {
                let cache = Self::with_store(hot_capacity, total_capacity, None);
                cache.degrade(&err.to_string());
                cache
            }
        }
    }

    fn with_store(hot_capacity: u64, total_capacity: u64, store: Option<PersistentStore>) -> Self {
        let hot_counters = Arc::new(TierCounters::default());
        let listener_counters = Arc::clone(&hot_counters);
        let hot = Cache::builder()
            .max_capacity(hot_capacity)
            .eviction_policy(EvictionPolicy::lru())
            .eviction_listener(move |_key, _value, cause| {
                if cause.was_evicted() {
                    listener_counters.evicted(1);
                }
            })
            .build();
        Self {
            hot,
            persistent: store,
            persistent_degraded: AtomicBool::new(false),
            total_capacity,
            hot_counters,
            persistent_counters: Arc::new(TierCounters::default()),
        }
    }

    pub fn get(&self, doc_id: &str, model: &str, content_hash: &str) -> Option<Vec<f32>> {
        let key = keys::document_key(doc_id, model, content_hash);
        if let Some(entry) = self.hot.get(&key) {
            entry.touch();
            self.hot_counters.hit();
            return Some(entry.value.vector.clone());
        }
        self.hot_counters.miss();

        let store = self.store()?;
        match store.get(&key.fingerprint) {
            Ok(Some(found)) => {
                self.persistent_counters.hit();
                let vector = found.vector.clone();
                let size = embedding_size_bytes(&vector);
                self.hot
                    .insert(key.clone(), Arc::new(CacheEntry::new(CacheTier::L2, key, found, size)));
                Some(vector)
            }
            Ok(None) => {
                self.persistent_counters.miss();
                None
            }
            Err(QuarryError::Cache(CacheError::MalformedEntry { .. })) => {
                // The store already dropped the row; recompute.
                self.persistent_counters.miss();
                debug!(doc_id, "dropped malformed L2 row");
                None
            }
            Err(err) => {
                self.persistent_counters.miss();
                self.degrade(&err.to_string());
                None
            }
        }
    }

    pub fn put(
        &self,
        doc_id: &str,
        collection: &str,
        model: &str,
        content_hash: &str,
        vector: Vec<f32>,
    ) {
        let key = keys::document_key(doc_id, model, content_hash);
        if let Some(store) = self.store() {
            let result = store
                .put(&key.fingerprint, doc_id, collection, &vector)
                .and_then(|()| store.evict_to(self.total_capacity));
            match result {
                Ok(evicted) => {
                    self.persistent_counters.insert();
                    self.persistent_counters.evicted(evicted);
                }
                Err(err) => self.degrade(&err.to_string()),
            }
        }
        let value = DocEmbedding {
            doc_id: doc_id.to_string(),
            collection: collection.to_string(),
            vector,
        };
        let size = embedding_size_bytes(&value.vector);
        self.hot
            .insert(key.clone(), Arc::new(CacheEntry::new(CacheTier::L2, key, value, size)));
        self.hot_counters.insert();
    }

    /// Remove every embedding of `doc_id` from both levels before returning.
    pub fn invalidate_document(&self, doc_id: &str) -> usize {
        let mut removed = self.invalidate_hot_where(|e| e.doc_id == doc_id);
        if let Some(store) = self.store() {
            match store.delete_document(doc_id) {
                Ok(n) => {
                    self.persistent_counters.invalidated(n as u64);
                    removed += n;
                }
                Err(err) => self.degrade(&err.to_string()),
            }
        }
        removed
    }

    /// Remove every embedding of documents in `collection` from both levels.
    pub fn invalidate_collection(&self, collection: &str) -> usize {
        let mut removed = self.invalidate_hot_where(|e| e.collection == collection);
        if let Some(store) = self.store() {
            match store.delete_collection(collection) {
                Ok(n) => {
                    self.persistent_counters.invalidated(n as u64);
                    removed += n;
                }
                Err(err) => self.degrade(&err.to_string()),
            }
        }
        removed
    }

    pub fn is_persistent_degraded(&self) -> bool {
        self.persistent_degraded.load(Ordering::Relaxed)
    }

    pub fn has_persistent_tier(&self) -> bool {
        self.persistent.is_some()
    }

    pub fn clear(&self) -> QuarryResult<()> {
        self.hot.invalidate_all();
        if let Some(store) = self.store() {
            store.clear()?;
        }
        Ok(())
    }

    pub fn hot_stats(&self) -> TierStats {
        self.hot.run_pending_tasks();
        self.hot_counters.snapshot(self.hot.entry_count())
    }

    pub fn persistent_stats(&self) -> TierStats {
        let entries = self
            .store()
            .and_then(|s| s.count().ok())
            .unwrap_or(0);
        self.persistent_counters.snapshot(entries)
    }

    /// The store, unless absent or degraded.
    fn store(&self) -> Option<&PersistentStore> {
        if self.is_persistent_degraded() {
            return None;
        }
        self.persistent.as_ref()
    }

    fn degrade(&self, reason: &str) {
        if !self.persistent_degraded.swap(true, Ordering::SeqCst) {
            events::cache_persistent_degraded(reason);
        }
    }

    fn invalidate_hot_where(&self, pred: impl Fn(&DocEmbedding) -> bool) -> usize {
        let doomed: Vec<Arc<CacheKey>> = self
            .hot
            .iter()
            .filter(|(_, entry)| pred(&entry.value))
            .map(|(k, _)| k)
            .collect();
        for key in &doomed {
            self.hot.invalidate(key.as_ref());
        }
        self.hot_counters.invalidated(doomed.len() as u64);
        doomed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hot_only_roundtrip() {
        let cache = L2DocumentCache::in_memory(10);
        cache.put("d1", "c", "m", "h1", vec![1.0, 2.0]);
        assert_eq!(cache.get("d1", "m", "h1"), Some(vec![1.0, 2.0]));
        assert!(cache.get("d1", "m", "h2").is_none(), "content hash is part of the key");
        assert!(!cache.has_persistent_tier());
    }

    #[test]
    fn persistent_hit_is_promoted() {
        let dir = tempfile::tempdir().unwrap();
        let cache = L2DocumentCache::open(1, 100, dir.path());
        cache.put("d1", "c", "m", "h1", vec![1.0]);
        cache.put("d2", "c", "m", "h2", vec![2.0]);
        cache.hot.run_pending_tasks();

        // At least one of the two fell out of the 1-entry hot tier.
        assert_eq!(cache.get("d1", "m", "h1"), Some(vec![1.0]));
        assert_eq!(cache.get("d2", "m", "h2"), Some(vec![2.0]));
        assert!(cache.persistent_stats().hits >= 1);
    }

    #[test]
    fn promoted_entries_still_invalidate_by_collection() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = L2DocumentCache::open(10, 100, dir.path());
            cache.put("d1", "books", "m", "h1", vec![1.0]);
        }
        let cache = L2DocumentCache::open(10, 100, dir.path());
        assert!(cache.get("d1", "m", "h1").is_some());
        assert_eq!(cache.invalidate_collection("books"), 2);
        assert!(cache.get("d1", "m", "h1").is_none());
    }

    #[test]
    fn total_capacity_bounds_persistent_rows() {
        let dir = tempfile::tempdir().unwrap();
        let cache = L2DocumentCache::open(2, 5, dir.path());
        for i in 0..20 {
            cache.put(&format!("d{i}"), "c", "m", "h", vec![i as f32]);
        }
        assert!(cache.persistent_stats().entries <= 5);
    }

    #[test]
    fn unopenable_store_degrades_to_hot_only() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        // A regular file where a directory is expected.
        let cache = L2DocumentCache::open(10, 100, &blocker.join("cache"));
        assert!(cache.is_persistent_degraded());
        cache.put("d1", "c", "m", "h", vec![1.0]);
        assert_eq!(cache.get("d1", "m", "h"), Some(vec![1.0]));
    }
}
