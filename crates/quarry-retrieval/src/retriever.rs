//! HybridRetriever: the entry point that ties every subsystem together.
//!
//! retrieve: L3 lookup → governor reservation → lexical ∥ vector search
//! (each behind the resilience layer) → weighted RRF → L3 write.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use quarry_cache::{keys, MultiTierCache};
use quarry_core::errors::{DependencyError, IndexError, QuarryResult, RetrievalError};
use quarry_core::models::{
    CacheScope, DegradationEvent, Dependency, DocId, Filters, RetrievalMethod, RetrievalRequest,
    RetrievalResponse, RetrievedPassage, VectorHit,
};
use quarry_core::traits::{IEmbeddingService, IVectorStore};
use quarry_core::{QuarryConfig, QuarryError};
use quarry_governor::{ResourceGovernor, ResourceRequest};
use quarry_index::{CompactionHandle, IncrementalLexicalIndex, LexicalSearchResult, RecoveryReport};
use quarry_observability::{retrieval_span, DegradationTracker};
use quarry_resilience::ResilienceWrapper;
use quarry_session::SessionManager;
use quarry_tuner::AdaptiveTuner;

use crate::admin::RetrieverTuning;
use crate::fusion::{fuse, FusionWeights};

/// Degradation components reported by the retriever.
pub mod components {
    pub const LEXICAL_SEARCH: &str = "lexical_search";
    pub const VECTOR_SEARCH: &str = "vector_search";
    pub const VECTOR_INGEST: &str = "vector_ingest";
}

/// Result of one retrieval path.
enum Path<T> {
    Skipped,
    Served(T),
    Unavailable(QuarryError),
}

impl<T> Path<T> {
    /// Unavailability is absorbed; anything else propagates.
    fn from_result(result: Option<QuarryResult<T>>) -> QuarryResult<Self> {
        match result {
            None => Ok(Self::Skipped),
            Some(Ok(value)) => Ok(Self::Served(value)),
            Some(Err(err)) if err.is_unavailable() => Ok(Self::Unavailable(err)),
            Some(Err(err)) => Err(err),
        }
    }
}

/// Hybrid lexical + vector retriever.
///
/// Every collaborator is an explicit instance owned here; two retrievers in
/// the same process share nothing.
pub struct HybridRetriever {
    pub(crate) config: QuarryConfig,
    pub(crate) embedder: Arc<dyn IEmbeddingService>,
    pub(crate) vector_store: Arc<dyn IVectorStore>,
    pub(crate) cache: Arc<MultiTierCache>,
    pub(crate) index: IncrementalLexicalIndex,
    pub(crate) governor: ResourceGovernor,
    pub(crate) resilience: ResilienceWrapper,
    pub(crate) tuner: Arc<AdaptiveTuner>,
    pub(crate) sessions: SessionManager,
    pub(crate) degradations: Mutex<DegradationTracker>,
    /// Embedding batch size; the tuner may change it.
    pub(crate) batch_size: Arc<AtomicUsize>,
    pub(crate) pending_recovery: Mutex<Option<RecoveryReport>>,
    pub(crate) compaction: Mutex<Option<CompactionHandle>>,
    /// Removed from the index but still in the vector store.
    pub(crate) pending_removals: Mutex<BTreeSet<DocId>>,
}

impl HybridRetriever {
    /// Build a retriever with a tuner probing the local host.
    pub fn new(
        config: QuarryConfig,
        embedder: Arc<dyn IEmbeddingService>,
        vector_store: Arc<dyn IVectorStore>,
    ) -> QuarryResult<Self> {
        let tuner = AdaptiveTuner::new(config.tuner.clone());
        Self::with_tuner(config, embedder, vector_store, tuner)
    }

    /// Build a retriever around a caller-supplied tuner.
    ///
    /// Opens the persisted index and L2 store when `data_dir` is set. Units
    /// dropped during the index load are remembered for [`recover`](Self::recover).
    pub fn with_tuner(
        config: QuarryConfig,
        embedder: Arc<dyn IEmbeddingService>,
        vector_store: Arc<dyn IVectorStore>,
        tuner: AdaptiveTuner,
    ) -> QuarryResult<Self> {
        config.validate()?;

        let cache_dir = config.cache_dir();
        let cache = Arc::new(MultiTierCache::new(&config.cache, cache_dir.as_deref()));

        let (index, recovery) = match config.index_dir() {
            Some(dir) => {
                let (index, report) = IncrementalLexicalIndex::open(config.index.clone(), &dir)?;
                if report.is_clean() {
                    (index, None)
                } else {
                    warn!(
                        dropped = report.dropped_segments.len(),
                        to_reingest = report.documents_to_reingest.len(),
                        manifest_rebuilt = report.manifest_rebuilt,
                        "index recovered with losses; call recover() to re-ingest"
                    );
                    (index, Some(report))
                }
            }
            None => (IncrementalLexicalIndex::new(config.index.clone()), None),
        };

        let governor = ResourceGovernor::new(&config.governor);
        let resilience = ResilienceWrapper::new(&config.resilience);
        let sessions = SessionManager::new(config.session_ttl_secs);
        let batch_size = Arc::new(AtomicUsize::new(config.retrieval.ingest_batch_size.max(1)));

        let tuner = Arc::new(tuner);
        tuner.add_target(Arc::new(RetrieverTuning {
            cache: Arc::clone(&cache),
            governor: governor.clone(),
            batch_size: Arc::clone(&batch_size),
        }));

        info!(
            persistent = config.data_dir.is_some(),
            index_version = index.version(),
            embedder = embedder.name(),
            "hybrid retriever ready"
        );

        Ok(Self {
            config,
            embedder,
            vector_store,
            cache,
            index,
            governor,
            resilience,
            tuner,
            sessions,
            degradations: Mutex::new(DegradationTracker::new()),
            batch_size,
            pending_recovery: Mutex::new(recovery),
            compaction: Mutex::new(None),
            pending_removals: Mutex::new(BTreeSet::new()),
        })
    }

    /// Answer a query.
    ///
    /// Falls back to a single method when the other is unavailable and
    /// flags the response as degraded. Fails with `AllMethodsUnavailable`
    /// only when no requested method can serve.
    pub fn retrieve(&self, request: &RetrievalRequest) -> QuarryResult<RetrievalResponse> {
        let request = self.normalize(request)?;
        let _span = retrieval_span!(request.query, request.top_k).entered();

        if let Some(session_id) = &request.session_id {
            self.sessions.require(session_id)?;
        }
        self.tuner.workload().record_query();

        let scope = CacheScope::from_session(request.session_id.as_ref());
        let key = keys::result_key(&scope, &request);
        let generation = self.cache.l3().generation();
        if let Some(hit) = self.cache.l3().get(&key) {
            debug!(results = hit.results.len(), "result cache hit");
            return Ok(RetrievalResponse {
                results: hit.results,
                degraded: false,
                degraded_reason: None,
                from_cache: true,
                method_used: request.method,
                index_version: hit.index_version,
            });
        }

        let retrieval = &self.config.retrieval;
        let _reservation = self.governor.acquire(ResourceRequest::anonymous(
            "query",
            retrieval.query_memory_mb,
            retrieval.query_cpu_percent,
            retrieval.query_priority,
        ))?;

        let started = Instant::now();
        let response = self.search_and_fuse(&request, &scope)?;
        self.tuner.workload().record_query_latency(started.elapsed());
        if !response.degraded {
            self.cache
                .l3()
                .put(key, response.results.clone(), response.index_version, generation);
        }
        Ok(response)
    }

    /// Shorthand for a global-scope hybrid query.
    pub fn search(&self, query: &str, top_k: usize) -> QuarryResult<RetrievalResponse> {
        self.retrieve(&RetrievalRequest::new(query, top_k))
    }

    fn normalize(&self, request: &RetrievalRequest) -> QuarryResult<RetrievalRequest> {
        if request.query.trim().is_empty() {
            return Err(RetrievalError::InvalidQuery {
                reason: "query is empty".to_string(),
            }
            .into());
        }
        if request.top_k == 0 {
            return Err(RetrievalError::InvalidQuery {
                reason: "top_k must be > 0".to_string(),
            }
            .into());
        }
        let mut request = request.clone();
        request.top_k = request.top_k.min(self.config.retrieval.max_top_k);
        Ok(request)
    }

    fn search_and_fuse(
        &self,
        request: &RetrievalRequest,
        scope: &CacheScope,
    ) -> QuarryResult<RetrievalResponse> {
        let limit = request
            .top_k
            .saturating_mul(self.config.retrieval.candidate_multiplier);
        let (want_lexical, want_vector) = match request.method {
            RetrievalMethod::Hybrid => (true, true),
            RetrievalMethod::LexicalOnly => (true, false),
            RetrievalMethod::VectorOnly => (false, true),
        };

        let (lexical, vector) = thread::scope(|s| {
            let lexical = want_lexical
                .then(|| s.spawn(|| self.lexical_path(&request.query, limit, &request.filters)));
            let vector = want_vector
                .then(|| self.vector_path(scope, &request.query, limit, &request.filters));
            let lexical = lexical.map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
            });
            (lexical, vector)
        });
        let lexical = Path::from_result(lexical)?;
        let vector = Path::from_result(vector)?;

        let (lexical, vector, method_used, degraded_reason) = match (lexical, vector) {
            (Path::Served(l), Path::Served(v)) => {
                self.note_healthy(components::LEXICAL_SEARCH);
                self.note_healthy(components::VECTOR_SEARCH);
                (Some(l), v, RetrievalMethod::Hybrid, None)
            }
            (Path::Served(l), Path::Skipped) => {
                self.note_healthy(components::LEXICAL_SEARCH);
                (Some(l), Vec::new(), RetrievalMethod::LexicalOnly, None)
            }
            (Path::Skipped, Path::Served(v)) => {
                self.note_healthy(components::VECTOR_SEARCH);
                (None, v, RetrievalMethod::VectorOnly, None)
            }
            (Path::Served(l), Path::Unavailable(err)) => {
                self.note_healthy(components::LEXICAL_SEARCH);
                let reason = self.note_fallback(components::VECTOR_SEARCH, &err, "lexical_only");
                (Some(l), Vec::new(), RetrievalMethod::LexicalOnly, Some(reason))
            }
            (Path::Unavailable(err), Path::Served(v)) => {
                self.note_healthy(components::VECTOR_SEARCH);
                let reason = self.note_fallback(components::LEXICAL_SEARCH, &err, "vector_only");
                (None, v, RetrievalMethod::VectorOnly, Some(reason))
            }
            (lexical, vector) => {
                if let Path::Unavailable(err) = &lexical {
                    warn!(component = components::LEXICAL_SEARCH, error = %err, "retrieval path unavailable");
                }
                if let Path::Unavailable(err) = &vector {
                    warn!(component = components::VECTOR_SEARCH, error = %err, "retrieval path unavailable");
                }
                return Err(RetrievalError::AllMethodsUnavailable.into());
            }
        };

        let snapshot = self.index.snapshot();
        let index_version = lexical.as_ref().map_or(snapshot.version, |l| l.version);

        let mut snippets: HashMap<String, String> = HashMap::new();
        let lexical_ids: Vec<String> = lexical
            .map(|result| {
                result
                    .hits
                    .into_iter()
                    .map(|hit| {
                        snippets.insert(hit.doc_id.clone(), hit.snippet);
                        hit.doc_id
                    })
                    .collect()
            })
            .unwrap_or_default();

        // Only documents live in the index may surface, whatever the vector
        // store still holds.
        let vector_ids: Vec<String> = vector
            .into_iter()
            .filter_map(|hit| {
                let (_, doc) = snapshot.locate(&hit.doc_id)?;
                snippets
                    .entry(hit.doc_id.clone())
                    .or_insert_with(|| doc.snippet.clone());
                Some(hit.doc_id)
            })
            .collect();

        let weights = FusionWeights {
            k: self.config.retrieval.rrf_k,
            lexical: self.config.retrieval.lexical_weight,
            vector: self.config.retrieval.vector_weight,
        };
        let results: Vec<RetrievedPassage> = fuse(&lexical_ids, &vector_ids, weights)
            .into_iter()
            .take(request.top_k)
            .map(|c| RetrievedPassage {
                snippet: snippets.remove(&c.doc_id).unwrap_or_default(),
                doc_id: c.doc_id,
                score: c.score,
                lexical_rank: c.lexical_rank,
                vector_rank: c.vector_rank,
            })
            .collect();

        debug!(
            results = results.len(),
            lexical = lexical_ids.len(),
            vector = vector_ids.len(),
            method = %method_used,
            degraded = degraded_reason.is_some(),
            "retrieval fused"
        );

        Ok(RetrievalResponse {
            results,
            degraded: degraded_reason.is_some(),
            degraded_reason,
            from_cache: false,
            method_used,
            index_version,
        })
    }

    fn lexical_path(
        &self,
        query: &str,
        limit: usize,
        filters: &Filters,
    ) -> QuarryResult<LexicalSearchResult> {
        self.resilience.call(Dependency::LexicalIndex, || {
            self.index.search(query, limit, filters).map_err(|err| match err {
                QuarryError::Index(IndexError::NotReady { state }) => {
                    DependencyError::transient(Dependency::LexicalIndex, format!("index {state}"))
                        .into()
                }
                other => other,
            })
        })
    }

    fn vector_path(
        &self,
        scope: &CacheScope,
        query: &str,
        limit: usize,
        filters: &Filters,
    ) -> QuarryResult<Vec<VectorHit>> {
        let embedding = self.query_embedding(scope, query)?;
        let hits = self.resilience.call(Dependency::VectorStore, || {
            self.vector_store.search(&embedding, limit, filters)
        })?;
        self.flush_pending_removals();
        Ok(hits)
    }

    /// Query embedding through L1, keyed by the caller's scope.
    fn query_embedding(&self, scope: &CacheScope, query: &str) -> QuarryResult<Vec<f32>> {
        let model = self.embedder.name();
        if let Some(embedding) = self.cache.l1().get(scope, model, query) {
            return Ok(embedding);
        }
        let embedding = self
            .resilience
            .call(Dependency::Embedding, || self.embedder.embed(query))?;
        self.cache.l1().put(scope, model, query, embedding.clone());
        Ok(embedding)
    }

    /// Record a fallback and return the reason shown to the caller.
    pub(crate) fn note_fallback(&self, component: &str, err: &QuarryError, fallback: &str) -> String {
        let reason = format!("{component} unavailable: {err}");
        self.degradations.lock().record(DegradationEvent {
            component: component.to_string(),
            failure: err.to_string(),
            fallback_used: fallback.to_string(),
            timestamp: Utc::now(),
        });
        reason
    }

    pub(crate) fn note_healthy(&self, component: &str) {
        let mut tracker = self.degradations.lock();
        if tracker.is_degraded(component) {
            tracker.mark_recovered(component);
        }
    }
}
