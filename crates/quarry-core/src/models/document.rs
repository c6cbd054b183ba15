use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Stable identifier of a document as supplied by the ingestion collaborator.
pub type DocId = String;

/// A pre-parsed, pre-chunked record handed to the core for indexing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub collection: String,
    pub text: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Document {
    pub fn new(
        id: impl Into<DocId>,
        collection: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            collection: collection.into(),
            text: text.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// blake3 hex digest over collection, text, and metadata.
    ///
    /// Two records with the same id and the same hash are the same content,
    /// which lets re-adds be skipped.
    pub fn content_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        write_field(&mut hasher, self.collection.as_bytes());
        write_field(&mut hasher, self.text.as_bytes());
        for (k, v) in &self.metadata {
            write_field(&mut hasher, k.as_bytes());
            write_field(&mut hasher, v.as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }

    /// Rough in-memory footprint, used for workload profiling.
    pub fn size_bytes(&self) -> usize {
        self.id.len()
            + self.collection.len()
            + self.text.len()
            + self
                .metadata
                .iter()
                .map(|(k, v)| k.len() + v.len())
                .sum::<usize>()
    }
}

/// Length-prefixed write so adjacent fields cannot alias.
pub(crate) fn write_field(hasher: &mut blake3::Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}
