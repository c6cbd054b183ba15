use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;

use quarry_core::errors::QuarryResult;
use quarry_core::models::{DocId, Filters, VectorHit};
use quarry_core::traits::IVectorStore;

struct Stored {
    vector: Vec<f32>,
    collection: String,
    metadata: BTreeMap<String, String>,
}

/// Exact dot-product search over a map. Ties break on ascending id.
#[derive(Default)]
pub struct InMemoryVectorStore {
    entries: RwLock<HashMap<DocId, Stored>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }
}

impl IVectorStore for InMemoryVectorStore {
    fn upsert(
        &self,
        id: &DocId,
        vector: &[f32],
        collection: &str,
        metadata: &BTreeMap<String, String>,
    ) -> QuarryResult<()> {
        self.entries.write().insert(
            id.clone(),
            Stored {
                vector: vector.to_vec(),
                collection: collection.to_string(),
                metadata: metadata.clone(),
            },
        );
        Ok(())
    }

    fn search(&self, vector: &[f32], top_k: usize, filters: &Filters) -> QuarryResult<Vec<VectorHit>> {
        let entries = self.entries.read();
        let mut hits: Vec<VectorHit> = entries
            .iter()
            .filter(|(_, s)| filters.matches(&s.collection, &s.metadata))
            .map(|(id, s)| VectorHit {
                doc_id: id.clone(),
                score: s.vector.iter().zip(vector).map(|(a, b)| a * b).sum(),
            })
            .filter(|h| h.score > 0.0)
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.doc_id.cmp(&b.doc_id)));
        hits.truncate(top_k);
        Ok(hits)
    }

    fn remove(&self, ids: &[DocId]) -> QuarryResult<()> {
        let mut entries = self.entries.write();
        for id in ids {
            entries.remove(id);
        }
        Ok(())
    }
}
