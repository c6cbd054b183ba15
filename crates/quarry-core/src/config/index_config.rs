use serde::{Deserialize, Serialize};

use super::defaults;

/// Incremental lexical index configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Dead-document ratio above which compaction is triggered.
    pub fragmentation_threshold: f64,
    /// Documents per staging segment; also the cancellation granularity.
    pub segment_max_docs: usize,
    /// BM25 term-frequency saturation.
    pub bm25_k1: f64,
    /// BM25 length normalisation.
    pub bm25_b: f64,
    /// Persist segments under the data dir.
    pub persist: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            fragmentation_threshold: defaults::DEFAULT_FRAGMENTATION_THRESHOLD,
            segment_max_docs: defaults::DEFAULT_SEGMENT_MAX_DOCS,
            bm25_k1: defaults::DEFAULT_BM25_K1,
            bm25_b: defaults::DEFAULT_BM25_B,
            persist: defaults::DEFAULT_INDEX_PERSIST,
        }
    }
}
