use std::collections::BTreeMap;

use crate::errors::QuarryResult;
use crate::models::{DocId, Filters, VectorHit};

/// Vector-similarity collaborator.
pub trait IVectorStore: Send + Sync {
    fn upsert(
        &self,
        id: &DocId,
        vector: &[f32],
        collection: &str,
        metadata: &BTreeMap<String, String>,
    ) -> QuarryResult<()>;

    /// Ranked by descending similarity.
    fn search(&self, vector: &[f32], top_k: usize, filters: &Filters)
        -> QuarryResult<Vec<VectorHit>>;

    fn remove(&self, ids: &[DocId]) -> QuarryResult<()>;
}
