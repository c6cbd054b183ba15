use std::collections::HashSet;

use quarry_core::{QuarryError, SessionId};
use quarry_session::SessionManager;

// ── Lifecycle: create, get, expire ────────────────────────────────────────

#[test]
fn create_get_expire_lifecycle() {
    let manager = SessionManager::new(3_600);
    let session = manager.create();
    assert_eq!(manager.count(), 1);

    let fetched = manager.get(&session.session_id).unwrap();
    assert_eq!(fetched.session_id, session.session_id);
    assert_eq!(fetched.ttl_secs, 3_600);

    assert!(manager.expire(&session.session_id).is_some());
    assert!(manager.get(&session.session_id).is_none());
    assert!(manager.expire(&session.session_id).is_none());
}

// ── Unknown and expired ids are rejected ──────────────────────────────────

#[test]
fn require_rejects_unknown_and_expired() {
    let manager = SessionManager::new(3_600);
    let err = manager.require(&SessionId::from("nope")).unwrap_err();
    assert!(matches!(
        err,
        QuarryError::Retrieval(quarry_core::errors::RetrievalError::SessionNotFound { .. })
    ));

    let short = manager.create_with_ttl(0);
    assert!(manager.require(&short.session_id).is_err());
}

// ── Cleanup sweeps only expired sessions ──────────────────────────────────

#[test]
fn cleanup_removes_only_expired_sessions() {
    let manager = SessionManager::new(3_600);
    let live = manager.create();
    let dead_a = manager.create_with_ttl(0);
    let dead_b = manager.create_with_ttl(0);

    let removed: HashSet<SessionId> = manager.cleanup_expired().into_iter().collect();
    assert_eq!(removed.len(), 2);
    assert!(removed.contains(&dead_a.session_id));
    assert!(removed.contains(&dead_b.session_id));
    assert!(manager.get(&live.session_id).is_some());
    assert_eq!(manager.count(), 1);
}

// ── Ids are unpredictable and unique across many creations ────────────────

#[test]
fn session_ids_are_unique() {
    let manager = SessionManager::new(60);
    let ids: HashSet<SessionId> = (0..1_000).map(|_| manager.create().session_id).collect();
    assert_eq!(ids.len(), 1_000);
}

// ── Concurrent access from many threads ───────────────────────────────────

#[test]
fn concurrent_create_and_touch() {
    let manager = SessionManager::new(60);
    std::thread::scope(|s| {
        for _ in 0..8 {
            let manager = manager.clone();
            s.spawn(move || {
                for _ in 0..50 {
                    let session = manager.create();
                    assert!(manager.touch(&session.session_id).is_some());
                }
            });
        }
    });
    assert_eq!(manager.count(), 400);
}
