//! Structured log events for key system operations.
//!
//! Each function emits a `tracing` event with structured fields.

/// Log a circuit transition to OPEN.
pub fn circuit_opened(dependency: &str, failure_count: u32) {
    tracing::warn!(
        event = "circuit_opened",
        dependency = %dependency,
        failure_count = failure_count,
        "circuit opened"
    );
}

/// Log a circuit transition to HALF_OPEN.
pub fn circuit_half_open(dependency: &str) {
    tracing::info!(
        event = "circuit_half_open",
        dependency = %dependency,
        "circuit half-open, admitting trial call"
    );
}

/// Log a circuit transition back to CLOSED.
pub fn circuit_closed(dependency: &str) {
    tracing::info!(
        event = "circuit_closed",
        dependency = %dependency,
        "circuit closed"
    );
}

/// Log a degradation trigger event.
pub fn degradation_triggered(component: &str, failure: &str, fallback: &str) {
    tracing::warn!(
        event = "degradation_triggered",
        component = %component,
        failure = %failure,
        fallback = %fallback,
        "degradation triggered"
    );
}

/// Log recovery from a degradation.
pub fn degradation_recovered(component: &str) {
    tracing::info!(
        event = "degradation_recovered",
        component = %component,
        "degradation recovered"
    );
}

/// Log a new index version being published.
pub fn index_published(version: u64, live_docs: usize, segments: usize) {
    tracing::debug!(
        event = "index_published",
        version = version,
        live_docs = live_docs,
        segments = segments,
        "index version published"
    );
}

/// Log a compaction completion event.
pub fn compaction_completed(version: u64, dropped_postings: usize, duration_ms: u64) {
    tracing::info!(
        event = "compaction_completed",
        version = version,
        dropped_postings = dropped_postings,
        duration_ms = duration_ms,
        "compaction completed"
    );
}

/// Log an abandoned compaction. The previous version stays current.
pub fn compaction_abandoned(reason: &str) {
    tracing::warn!(
        event = "compaction_abandoned",
        reason = %reason,
        "compaction abandoned"
    );
}

/// Log a cache invalidation.
pub fn cache_invalidated(target: &str, removed: usize, generation: u64) {
    tracing::debug!(
        event = "cache_invalidated",
        target = %target,
        removed = removed,
        generation = generation,
        "cache invalidated"
    );
}

/// Log the persistent cache tier dropping to hot-only operation.
pub fn cache_persistent_degraded(reason: &str) {
    tracing::warn!(
        event = "cache_persistent_degraded",
        reason = %reason,
        "persistent cache tier unavailable, continuing with hot tier only"
    );
}

/// Log a persisted unit discarded and rebuilt after failing its load check.
pub fn corrupted_unit_rebuilt(unit: &str, details: &str) {
    tracing::warn!(
        event = "corrupted_unit_rebuilt",
        unit = %unit,
        details = %details,
        "corrupted unit rebuilt from scratch"
    );
}

/// Log a reservation that could not be granted immediately.
pub fn reservation_queued(operation_id: &str, priority: u8, queue_len: usize) {
    tracing::debug!(
        event = "reservation_queued",
        operation_id = %operation_id,
        priority = priority,
        queue_len = queue_len,
        "reservation queued"
    );
}

/// Log a starvation promotion.
pub fn reservation_promoted(operation_id: &str, priority: u8) {
    tracing::debug!(
        event = "reservation_promoted",
        operation_id = %operation_id,
        priority = priority,
        "queued reservation promoted"
    );
}

/// Log tuning recommendations applied to live components.
pub fn tuning_applied(mode: &str, batch_size: usize, cache_size: u64, workers: usize) {
    tracing::info!(
        event = "tuning_applied",
        mode = %mode,
        batch_size = batch_size,
        cache_size = cache_size,
        workers = workers,
        "tuning recommendations applied"
    );
}

/// Log tuning recommendations without applying them.
pub fn tuning_suggested(mode: &str, batch_size: usize, cache_size: u64, workers: usize) {
    tracing::info!(
        event = "tuning_suggested",
        mode = %mode,
        batch_size = batch_size,
        cache_size = cache_size,
        workers = workers,
        "tuning recommendations available"
    );
}
