use serde::{Deserialize, Serialize};

use super::defaults;

/// Hybrid retrieval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// RRF k-value for rank fusion.
    pub rrf_k: u32,
    pub lexical_weight: f64,
    pub vector_weight: f64,
    /// Each method fetches `top_k * candidate_multiplier` candidates.
    pub candidate_multiplier: usize,
    pub max_top_k: usize,
    /// Reservation requested per query.
    pub query_memory_mb: u64,
    pub query_cpu_percent: u32,
    pub query_priority: u8,
    /// Reservation requested per ingestion call.
    pub ingest_memory_mb: u64,
    pub ingest_cpu_percent: u32,
    pub ingest_priority: u8,
    /// Embedding batch size used until the tuner recommends otherwise.
    pub ingest_batch_size: usize,
    /// Reservation held by a background compaction for its whole run.
    pub compaction_memory_mb: u64,
    pub compaction_cpu_percent: u32,
    pub compaction_priority: u8,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: defaults::DEFAULT_RRF_K,
            lexical_weight: defaults::DEFAULT_LEXICAL_WEIGHT,
            vector_weight: defaults::DEFAULT_VECTOR_WEIGHT,
            candidate_multiplier: defaults::DEFAULT_CANDIDATE_MULTIPLIER,
            max_top_k: defaults::DEFAULT_MAX_TOP_K,
            query_memory_mb: defaults::DEFAULT_QUERY_MEMORY_MB,
            query_cpu_percent: defaults::DEFAULT_QUERY_CPU_PERCENT,
            query_priority: defaults::DEFAULT_QUERY_PRIORITY,
            ingest_memory_mb: defaults::DEFAULT_INGEST_MEMORY_MB,
            ingest_cpu_percent: defaults::DEFAULT_INGEST_CPU_PERCENT,
            ingest_priority: defaults::DEFAULT_INGEST_PRIORITY,
            ingest_batch_size: defaults::DEFAULT_INGEST_BATCH_SIZE,
            compaction_memory_mb: defaults::DEFAULT_COMPACTION_MEMORY_MB,
            compaction_cpu_percent: defaults::DEFAULT_COMPACTION_CPU_PERCENT,
            compaction_priority: defaults::DEFAULT_COMPACTION_PRIORITY,
        }
    }
}
