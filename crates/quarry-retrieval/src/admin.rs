//! Administrative surface: invalidation, statistics, tuning, sessions, health.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use quarry_cache::{CacheStats, MultiTierCache};
use quarry_core::models::{CacheScope, Dependency, DocId, Session, SessionId};
use quarry_governor::{LedgerSnapshot, ResourceGovernor};
use quarry_index::{IncrementalLexicalIndex, IndexStats};
use quarry_observability::TrackedDegradation;
use quarry_resilience::{CircuitState, ResilienceStats, ResilienceWrapper};
use quarry_tuner::{ITuningTarget, TunerHandle, TuningRecommendations};

use crate::retriever::HybridRetriever;

/// What an `invalidate` call targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationTarget {
    Document(DocId),
    Collection(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    /// Serving, but at least one path or tier is down.
    Degraded,
    /// No retrieval method can serve.
    Unavailable,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub circuits: BTreeMap<Dependency, CircuitState>,
    pub resilience: ResilienceStats,
    pub ledger: LedgerSnapshot,
    pub index: IndexStats,
    pub cache: CacheStats,
    pub degradations: Vec<TrackedDegradation>,
    pub sessions: usize,
    /// Removed documents whose vectors are still in the vector store.
    pub pending_vector_removals: usize,
}

/// Applies tuner output to the retriever's components.
pub(crate) struct RetrieverTuning {
    pub(crate) cache: Arc<MultiTierCache>,
    pub(crate) governor: ResourceGovernor,
    pub(crate) batch_size: Arc<AtomicUsize>,
}

impl ITuningTarget for RetrieverTuning {
    fn apply_tuning(&self, rec: &TuningRecommendations) {
        self.cache.apply_tuning(rec.cache_size, rec.result_cache_enabled);
        self.governor.set_max_concurrent(rec.worker_count.max(1));
        self.batch_size.store(rec.batch_size.max(1), Ordering::Relaxed);
        debug!(
            mode = %rec.mode,
            cache_size = rec.cache_size,
            workers = rec.worker_count,
            batch_size = rec.batch_size,
            "retriever tuning applied"
        );
    }
}

impl HybridRetriever {
    /// Drop every cache entry derived from a document or a collection.
    /// Returns the number of L2 rows removed.
    pub fn invalidate(&self, target: &InvalidationTarget) -> usize {
        match target {
            InvalidationTarget::Document(id) => self.cache.invalidate_document(id),
            InvalidationTarget::Collection(name) => self.cache.invalidate_collection(name),
        }
    }

    pub fn get_cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Recommendations for the current workload. Nothing is applied.
    pub fn get_tuning_recommendations(&self) -> TuningRecommendations {
        self.tuner.recommendations()
    }

    /// One tuner analysis tick; applied when auto-apply is configured.
    pub fn run_tuning(&self) -> TuningRecommendations {
        self.tuner.analyze()
    }

    /// Start periodic tuning. `None` if the thread could not be spawned.
    pub fn start_tuner(&self) -> Option<TunerHandle> {
        self.tuner.spawn_loop()
    }

    pub fn create_session(&self) -> Session {
        self.sessions.create()
    }

    /// End a session and purge its cache scope.
    pub fn end_session(&self, session_id: &SessionId) -> bool {
        let ended = self.sessions.expire(session_id).is_some();
        self.cache
            .purge_scope(&CacheScope::Session(session_id.clone()));
        ended
    }

    /// Sweep sessions past their TTL and purge their cache scopes.
    pub fn purge_expired_sessions(&self) -> usize {
        let expired = self.sessions.cleanup_expired();
        for id in &expired {
            self.cache.purge_scope(&CacheScope::Session(id.clone()));
        }
        expired.len()
    }

    pub fn health(&self) -> HealthReport {
        let circuits = self.resilience.circuit_states();
        let degradations = self.degradations.lock().active_degradations();
        let cache = self.cache.stats();
        let pending_vector_removals = self.pending_removals.lock().len();

        let is_open = |dep: Dependency| circuits.get(&dep) == Some(&CircuitState::Open);
        let vector_down = is_open(Dependency::Embedding) || is_open(Dependency::VectorStore);
        let status = if vector_down && is_open(Dependency::LexicalIndex) {
            HealthStatus::Unavailable
        } else if circuits.values().any(|s| *s != CircuitState::Closed)
            || !degradations.is_empty()
            || cache.l2_persistent_degraded
            || pending_vector_removals > 0
        {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthReport {
            status,
            circuits,
            resilience: self.resilience.stats(),
            ledger: self.governor.snapshot(),
            index: self.index.stats(),
            cache,
            degradations,
            sessions: self.sessions.count(),
            pending_vector_removals,
        }
    }

    pub fn index(&self) -> &IncrementalLexicalIndex {
        &self.index
    }

    pub fn cache(&self) -> &MultiTierCache {
        &self.cache
    }

    pub fn governor(&self) -> &ResourceGovernor {
        &self.governor
    }

    pub fn resilience(&self) -> &ResilienceWrapper {
        &self.resilience
    }

    pub fn tuner(&self) -> &quarry_tuner::AdaptiveTuner {
        &self.tuner
    }
}
