//! Ingestion, removal, and recovery on the retriever.
//!
//! The lexical index is the source of truth for which documents are live.
//! Vectors follow it: a vector-store outage leaves documents searchable by
//! keyword and reports them as pending.

use std::collections::HashMap;
use std::sync::atomic::Ordering;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use quarry_core::errors::{DependencyError, QuarryResult};
use quarry_core::models::{Dependency, DocId, Document};
use quarry_core::traits::IDocumentSource;
use quarry_core::CancellationToken;
use quarry_governor::ResourceRequest;
use quarry_index::CompactionReport;
use quarry_observability::ingestion_span;

use crate::retriever::{components, HybridRetriever};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Index version after the add.
    pub version: u64,
    pub added: Vec<DocId>,
    pub replaced: Vec<DocId>,
    pub unchanged: Vec<DocId>,
    /// Documents whose vectors reached the vector store.
    pub embedded: usize,
    /// Embeddings served by L2 instead of the embedding service.
    pub embedding_cache_hits: usize,
    /// Indexed lexically but not yet in the vector store. Re-ingest them.
    pub vector_pending: Vec<DocId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemovalReport {
    pub version: u64,
    pub removed: Vec<DocId>,
    /// False when the vector store could not be reached; the documents are
    /// still excluded from results.
    pub vector_store_updated: bool,
    pub compaction_started: bool,
}

impl HybridRetriever {
    /// Index, embed, and store `docs`.
    ///
    /// Changed documents have their cache entries invalidated before the new
    /// version is published. Unchanged documents are still embedded (an L2
    /// hit in the common case) so an earlier vector-store outage heals on
    /// re-ingest.
    pub fn ingest(&self, docs: &[Document], cancel: &CancellationToken) -> QuarryResult<IngestReport> {
        let _span = ingestion_span!(docs.len()).entered();
        if docs.is_empty() {
            return Ok(IngestReport {
                version: self.index.version(),
                ..IngestReport::default()
            });
        }

        let retrieval = &self.config.retrieval;
        let _reservation = self.governor.acquire(ResourceRequest::anonymous(
            "ingest",
            retrieval.ingest_memory_mb,
            retrieval.ingest_cpu_percent,
            retrieval.ingest_priority,
        ))?;

        let docs = last_wins(docs);
        for doc in &docs {
            if let Some(existing) = self.index.document(&doc.id) {
                if existing.content_hash != doc.content_hash() {
                    self.cache.invalidate_document(&doc.id);
                }
            }
        }

        let added = self.index.add_documents(
            &docs.iter().map(|d| (*d).clone()).collect::<Vec<_>>(),
            cancel,
        )?;
        {
            let mut pending = self.pending_removals.lock();
            for doc in &docs {
                pending.remove(&doc.id);
            }
        }
        self.cache.invalidate_results();
        self.tuner
            .workload()
            .record_ingested_sizes(docs.iter().map(|d| d.size_bytes()));

        let mut report = IngestReport {
            version: added.version,
            added: added.added,
            replaced: added.replaced,
            unchanged: added.unchanged,
            ..IngestReport::default()
        };

        let batch_size = self.batch_size.load(Ordering::Relaxed).max(1);
        let mut chunks = docs.chunks(batch_size);
        for chunk in chunks.by_ref() {
            if cancel.is_cancelled() {
                report.vector_pending.extend(chunk.iter().map(|d| d.id.clone()));
                break;
            }
            self.store_vectors(chunk, &mut report)?;
        }
        for rest in chunks {
            report.vector_pending.extend(rest.iter().map(|d| d.id.clone()));
        }

        if report.vector_pending.is_empty() {
            self.note_healthy(components::VECTOR_INGEST);
            self.flush_pending_removals();
        }
        info!(
            version = report.version,
            added = report.added.len(),
            replaced = report.replaced.len(),
            unchanged = report.unchanged.len(),
            embedded = report.embedded,
            pending = report.vector_pending.len(),
            "ingestion complete"
        );
        Ok(report)
    }

    /// Embed one batch through L2 and upsert it.
    fn store_vectors(&self, batch: &[&Document], report: &mut IngestReport) -> QuarryResult<()> {
        let vectors = match self.document_embeddings(batch, report) {
            Ok(vectors) => vectors,
            Err(err) if err.is_unavailable() => {
                self.note_fallback(components::VECTOR_INGEST, &err, "lexical_only");
                report.vector_pending.extend(batch.iter().map(|d| d.id.clone()));
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        for (doc, vector) in batch.iter().zip(vectors) {
            let upserted = self.resilience.call(Dependency::VectorStore, || {
                self.vector_store
                    .upsert(&doc.id, &vector, &doc.collection, &doc.metadata)
            });
            match upserted {
                Ok(()) => report.embedded += 1,
                Err(err) if err.is_unavailable() => {
                    self.note_fallback(components::VECTOR_INGEST, &err, "lexical_only");
                    report.vector_pending.push(doc.id.clone());
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Vectors for `batch` in order, embedding only the L2 misses.
    fn document_embeddings(
        &self,
        batch: &[&Document],
        report: &mut IngestReport,
    ) -> QuarryResult<Vec<Vec<f32>>> {
        let model = self.embedder.name().to_string();
        let hashes: Vec<String> = batch.iter().map(|d| d.content_hash()).collect();

        let mut vectors: Vec<Option<Vec<f32>>> = batch
            .iter()
            .zip(&hashes)
            .map(|(doc, hash)| self.cache.l2().get(&doc.id, &model, hash))
            .collect();
        report.embedding_cache_hits += vectors.iter().filter(|v| v.is_some()).count();

        let missing: Vec<usize> = (0..batch.len()).filter(|&i| vectors[i].is_none()).collect();
        if !missing.is_empty() {
            let texts: Vec<String> = missing.iter().map(|&i| batch[i].text.clone()).collect();
            let embedded = self
                .resilience
                .call(Dependency::Embedding, || self.embedder.embed_batch(&texts))?;
            if embedded.len() != texts.len() {
                return Err(DependencyError::permanent(
                    Dependency::Embedding,
                    format!("{} vectors returned for {} texts", embedded.len(), texts.len()),
                )
                .into());
            }
            for (&i, vector) in missing.iter().zip(embedded) {
                let doc = batch[i];
                self.cache
                    .l2()
                    .put(&doc.id, &doc.collection, &model, &hashes[i], vector.clone());
                vectors[i] = Some(vector);
            }
            debug!(embedded = missing.len(), cached = batch.len() - missing.len(), "batch embedded");
        }

        Ok(vectors.into_iter().flatten().collect())
    }

    /// Remove documents everywhere.
    ///
    /// The index tombstone is what hides them from results, so they vanish
    /// at once even if the vector store is down and before compaction runs.
    pub fn remove_documents(&self, ids: &[DocId]) -> QuarryResult<RemovalReport> {
        let removed = self.index.remove_documents(ids)?;
        for id in &removed.removed {
            self.cache.invalidate_document(id);
        }
        self.cache.invalidate_results();

        let vector_store_updated = if removed.removed.is_empty() {
            true
        } else {
            let mut pending = self.pending_removals.lock();
            pending.extend(removed.removed.iter().cloned());
            let batch: Vec<DocId> = pending.iter().cloned().collect();
            match self
                .resilience
                .call(Dependency::VectorStore, || self.vector_store.remove(&batch))
            {
                Ok(()) => {
                    pending.clear();
                    true
                }
                Err(err) if err.is_unavailable() => {
                    warn!(error = %err, pending = pending.len(), "vector store removal deferred");
                    false
                }
                Err(err) => return Err(err),
            }
        };

        let compaction_started = self.start_compaction();

        Ok(RemovalReport {
            version: removed.version,
            removed: removed.removed,
            vector_store_updated,
            compaction_started,
        })
    }

    /// Ids removed from the index whose vectors could not be deleted yet.
    pub fn pending_vector_removals(&self) -> Vec<DocId> {
        self.pending_removals.lock().iter().cloned().collect()
    }

    /// Retry deferred vector-store removals.
    ///
    /// The set stays locked across the call so a concurrent re-ingest of the
    /// same id cannot have its fresh vector deleted.
    pub(crate) fn flush_pending_removals(&self) {
        let mut pending = self.pending_removals.lock();
        if pending.is_empty() {
            return;
        }
        let ids: Vec<DocId> = pending.iter().cloned().collect();
        match self
            .resilience
            .call(Dependency::VectorStore, || self.vector_store.remove(&ids))
        {
            Ok(()) => {
                pending.clear();
                info!(removed = ids.len(), "deferred vector removals applied");
            }
            Err(err) => debug!(error = %err, pending = ids.len(), "deferred vector removals still pending"),
        }
    }

    /// Start a background compaction when the index is fragmented.
    ///
    /// The compaction thread reserves resources at compaction priority before
    /// rebuilding anything and holds the reservation until it finishes.
    fn start_compaction(&self) -> bool {
        let mut slot = self.compaction.lock();
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }
        let retrieval = &self.config.retrieval;
        let governor = self.governor.clone();
        let limits = governor.limits();
        let request = ResourceRequest::anonymous(
            "compaction",
            retrieval.compaction_memory_mb.min(limits.max_memory_mb),
            retrieval.compaction_cpu_percent.min(limits.max_cpu_percent),
            retrieval.compaction_priority,
        );
        match self
            .index
            .rebuild_if_fragmented_with(move || governor.acquire(request))
        {
            Some(handle) => {
                *slot = Some(handle);
                true
            }
            None => false,
        }
    }

    /// Block until the last background compaction finishes.
    pub fn wait_for_compaction(&self) -> Option<QuarryResult<CompactionReport>> {
        let handle = self.compaction.lock().take()?;
        Some(handle.wait())
    }

    /// What the index load dropped, if anything is still awaiting recovery.
    pub fn pending_recovery(&self) -> Option<quarry_index::RecoveryReport> {
        self.pending_recovery.lock().clone()
    }

    /// Re-ingest documents whose persisted index units were dropped on load.
    ///
    /// A rebuilt manifest means the whole index restarted empty, so every id
    /// the source knows is fetched.
    pub fn recover(
        &self,
        source: &dyn IDocumentSource,
        cancel: &CancellationToken,
    ) -> QuarryResult<IngestReport> {
        let Some(pending) = self.pending_recovery.lock().take() else {
            return Ok(IngestReport {
                version: self.index.version(),
                ..IngestReport::default()
            });
        };

        let result = (|| {
            let ids = if pending.manifest_rebuilt {
                source.list_ids()?
            } else {
                pending.documents_to_reingest.clone()
            };
            let docs = source.fetch(&ids)?;
            info!(requested = ids.len(), fetched = docs.len(), "re-ingesting dropped documents");
            self.ingest(&docs, cancel)
        })();

        if result.is_err() {
            *self.pending_recovery.lock() = Some(pending);
        }
        result
    }
}

/// Collapse duplicate ids, keeping the last record at the first position.
fn last_wins(docs: &[Document]) -> Vec<&Document> {
    let mut slot: HashMap<&str, usize> = HashMap::new();
    let mut out: Vec<&Document> = Vec::with_capacity(docs.len());
    for doc in docs {
        match slot.get(doc.id.as_str()) {
            Some(&i) => out[i] = doc,
            None => {
                slot.insert(&doc.id, out.len());
                out.push(doc);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_wins_keeps_first_position_and_last_content() {
        let docs = vec![
            Document::new("a", "c", "one"),
            Document::new("b", "c", "two"),
            Document::new("a", "c", "three"),
        ];
        let kept = last_wins(&docs);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].id, "a");
        assert_eq!(kept[0].text, "three");
        assert_eq!(kept[1].id, "b");
    }
}
