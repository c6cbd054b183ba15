use proptest::prelude::*;

use quarry_cache::{keys, MultiTierCache};
use quarry_core::config::CacheConfig;
use quarry_core::models::{CacheScope, RetrievalRequest, RetrievedPassage};
use quarry_core::SessionId;

fn passage(id: &str) -> RetrievedPassage {
    RetrievedPassage {
        doc_id: id.to_string(),
        score: 0.5,
        snippet: format!("snippet of {id}"),
        lexical_rank: Some(1),
        vector_rank: Some(1),
    }
}

fn in_memory() -> MultiTierCache {
    MultiTierCache::new(&CacheConfig::default(), None)
}

// ── Session isolation: s1 writes are invisible under s2 ───────────────────

#[test]
fn l1_session_isolation() {
    let cache = in_memory();
    let s1 = CacheScope::Session(SessionId::from("s1"));
    let s2 = CacheScope::Session(SessionId::from("s2"));
    cache.l1().put(&s1, "m", "what is a tombstone", vec![0.1, 0.2]);

    assert!(cache.l1().get(&s2, "m", "what is a tombstone").is_none());
    assert!(cache.l1().get(&CacheScope::Global, "m", "what is a tombstone").is_none());
    assert!(cache.l1().get(&s1, "m", "what is a tombstone").is_some());
}

proptest! {
    #[test]
    fn no_tier_leaks_across_sessions(
        a in "[a-z]{1,8}",
        b in "[a-z]{1,8}",
        query in "[a-z ]{1,24}",
    ) {
        prop_assume!(a != b);
        let cache = in_memory();
        let sa = CacheScope::Session(SessionId::from(a.as_str()));
        let sb = CacheScope::Session(SessionId::from(b.as_str()));

        cache.l1().put(&sa, "m", &query, vec![1.0]);
        prop_assert!(cache.l1().get(&sb, "m", &query).is_none());

        let request = RetrievalRequest::new(query.clone(), 3);
        let ka = keys::result_key(&sa, &request);
        let kb = keys::result_key(&sb, &request);
        cache.l3().put(ka, vec![passage("d")], 1, cache.l3().generation());
        prop_assert!(cache.l3().get(&kb).is_none());
    }
}

// ── Coherency: invalidate_document reaches L2 and L3 ──────────────────────

#[test]
fn invalidate_document_clears_l2_and_l3() {
    let dir = tempfile::tempdir().unwrap();
    let cache = MultiTierCache::new(&CacheConfig::default(), Some(dir.path()));
    cache.l2().put("doc-1", "c", "m", "hash", vec![1.0, 2.0]);

    let request = RetrievalRequest::new("query", 5);
    let key = keys::result_key(&CacheScope::Global, &request);
    let g = cache.l3().generation();
    assert!(cache.l3().put(key.clone(), vec![passage("doc-1")], 1, g));

    assert_eq!(cache.invalidate_document("doc-1"), 2); // hot + persistent

    assert!(cache.l2().get("doc-1", "m", "hash").is_none());
    assert!(cache.l3().get(&key).is_none());
}

#[test]
fn invalidate_collection_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let cache = MultiTierCache::new(&CacheConfig::default(), Some(dir.path()));
        cache.l2().put("a", "books", "m", "h", vec![1.0]);
        cache.l2().put("b", "papers", "m", "h", vec![2.0]);
    }
    let cache = MultiTierCache::new(&CacheConfig::default(), Some(dir.path()));
    cache.invalidate_collection("books");
    assert!(cache.l2().get("a", "m", "h").is_none());
    assert_eq!(cache.l2().get("b", "m", "h"), Some(vec![2.0]));
}

// ── Concurrent readers and writers never see torn values ──────────────────

#[test]
fn concurrent_l1_access_is_consistent() {
    let cache = in_memory();
    std::thread::scope(|s| {
        for t in 0..8u32 {
            let cache = &cache;
            s.spawn(move || {
                for i in 0..200u32 {
                    let q = format!("q{}", i % 20);
                    let v = vec![t as f32; 16];
                    cache.l1().put(&CacheScope::Global, "m", &q, v);
                    if let Some(got) = cache.l1().get(&CacheScope::Global, "m", &q) {
                        assert_eq!(got.len(), 16);
                        assert!(got.iter().all(|x| *x == got[0]), "torn read");
                    }
                }
            });
        }
    });
}

// ── Purge scope and tuning ────────────────────────────────────────────────

#[test]
fn purge_scope_and_apply_tuning() {
    let cache = in_memory();
    let s = CacheScope::Session(SessionId::from("s"));
    cache.l1().put(&s, "m", "q", vec![1.0]);
    let key = keys::result_key(&s, &RetrievalRequest::new("q", 1));
    cache.l3().put(key.clone(), vec![passage("d")], 1, cache.l3().generation());

    assert_eq!(cache.purge_scope(&s), 2);
    assert!(cache.l3().get(&key).is_none());

    cache.apply_tuning(64, false);
    let stats = cache.stats();
    assert_eq!(stats.l1_capacity, 64);
    assert!(!stats.l3_enabled);
}

#[test]
fn stats_track_hits_and_misses() {
    let cache = in_memory();
    cache.l1().put(&CacheScope::Global, "m", "q", vec![1.0]);
    cache.l1().get(&CacheScope::Global, "m", "q");
    cache.l1().get(&CacheScope::Global, "m", "other");
    let stats = cache.stats();
    assert_eq!(stats.l1.hits, 1);
    assert_eq!(stats.l1.misses, 1);
    assert_eq!(stats.l1.hit_rate(), 0.5);
    assert!(!stats.l2_persistent_degraded);
}
