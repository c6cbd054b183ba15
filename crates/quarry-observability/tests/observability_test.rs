use chrono::Utc;
use quarry_core::models::DegradationEvent;
use quarry_observability::{DegradationTracker, RecoveryStatus};

// ── Degradation episodes across components ────────────────────────────────

#[test]
fn tracker_keeps_components_independent() {
    let mut tracker = DegradationTracker::new();
    for component in ["vector_store", "lexical_index"] {
        tracker.record(DegradationEvent {
            component: component.to_string(),
            failure: "unavailable".to_string(),
            fallback_used: "other path".to_string(),
            timestamp: Utc::now(),
        });
    }
    tracker.mark_recovered("lexical_index");

    let statuses: Vec<_> = tracker
        .events()
        .map(|t| (t.event.component.as_str(), t.recovery_status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("vector_store", RecoveryStatus::Active),
            ("lexical_index", RecoveryStatus::Recovered),
        ]
    );
    assert_eq!(tracker.count_recent("vector_store", 60), 1);
}

// ── Span macros and subscriber init are usable from other crates ──────────

#[test]
fn spans_and_init_are_callable() {
    quarry_observability::init_tracing_with_filter("debug");
    // A second install must not panic.
    assert!(!quarry_observability::init_tracing());

    let span = quarry_observability::retrieval_span!("rust ownership", 5);
    let _guard = span.enter();
    quarry_observability::events::cache_invalidated("doc:1", 2, 7);
}
