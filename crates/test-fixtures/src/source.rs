use std::collections::BTreeMap;

use parking_lot::RwLock;

use quarry_core::errors::QuarryResult;
use quarry_core::models::{DocId, Document};
use quarry_core::traits::IDocumentSource;

#[derive(Default)]
pub struct InMemoryDocumentSource {
    docs: RwLock<BTreeMap<DocId, Document>>,
}

impl InMemoryDocumentSource {
    pub fn new(docs: impl IntoIterator<Item = Document>) -> Self {
        Self {
            docs: RwLock::new(docs.into_iter().map(|d| (d.id.clone(), d)).collect()),
        }
    }

    pub fn insert(&self, doc: Document) {
        self.docs.write().insert(doc.id.clone(), doc);
    }
}

impl IDocumentSource for InMemoryDocumentSource {
    fn fetch(&self, ids: &[DocId]) -> QuarryResult<Vec<Document>> {
        let docs = self.docs.read();
        Ok(ids.iter().filter_map(|id| docs.get(id).cloned()).collect())
    }

    fn list_ids(&self) -> QuarryResult<Vec<DocId>> {
        Ok(self.docs.read().keys().cloned().collect())
    }
}
