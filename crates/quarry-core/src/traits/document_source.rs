use crate::errors::QuarryResult;
use crate::models::{DocId, Document};

/// Read access to the ingestion collaborator's records.
///
/// Used to re-ingest documents whose index unit had to be dropped on load.
pub trait IDocumentSource: Send + Sync {
    /// Fetch the listed documents. Unknown ids are skipped.
    fn fetch(&self, ids: &[DocId]) -> QuarryResult<Vec<Document>>;

    /// Every document id the source can supply. Used when the whole index
    /// has to be rebuilt.
    fn list_ids(&self) -> QuarryResult<Vec<DocId>>;
}
