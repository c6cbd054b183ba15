//! IncrementalLexicalIndex: differential add/remove over immutable
//! segments, atomic version publication, background compaction.
//!
//! Mutations are serialised by a writer lock and never touch the published
//! version: they build the next `IndexVersion` beside it and swap the
//! pointer as the last step. Readers never take the writer lock.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use quarry_core::config::IndexConfig;
use quarry_core::errors::{IndexError, QuarryResult};
use quarry_core::models::{DocId, Document, Filters};
use quarry_core::CancellationToken;
use quarry_observability::{compaction_span, events};

use crate::persist::{IndexStore, RecoveryReport};
use crate::search::{search_version, Bm25Params, LexicalSearchResult};
use crate::segment::Segment;
use crate::version::{IndexState, IndexVersion, Tombstone};

/// Outcome of `add_documents`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddReport {
    /// Version current after the call.
    pub version: u64,
    pub added: Vec<DocId>,
    /// Already indexed with different content; old copy tombstoned.
    pub replaced: Vec<DocId>,
    /// Already indexed with identical content; skipped.
    pub unchanged: Vec<DocId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoveReport {
    pub version: u64,
    pub removed: Vec<DocId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompactionReport {
    pub version: u64,
    pub segments_rewritten: usize,
    pub segments_dropped: usize,
    pub postings_dropped: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub state: IndexState,
    pub version: u64,
    pub segments: usize,
    pub live_docs: usize,
    pub physical_docs: usize,
    pub tombstones: usize,
    pub postings: usize,
    pub fragmentation_ratio: f64,
}

/// Stored view of one live document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocSummary {
    pub doc_id: DocId,
    pub collection: String,
    pub content_hash: String,
    pub snippet: String,
}

/// A compaction running on its own thread.
pub struct CompactionHandle {
    join: JoinHandle<QuarryResult<CompactionReport>>,
    cancel: CancellationToken,
}

impl CompactionHandle {
    /// Ask the compaction to stop at the next segment boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Block until the compaction finishes.
    pub fn wait(self) -> QuarryResult<CompactionReport> {
        self.join.join().map_err(|_| IndexError::CompactionFailed {
            reason: "compaction thread panicked".to_string(),
        })?
    }
}

struct Inner {
    config: IndexConfig,
    current: RwLock<Arc<IndexVersion>>,
    writer: Mutex<()>,
    store: Option<IndexStore>,
    next_segment_id: AtomicU64,
    staging: AtomicBool,
    compacting: AtomicBool,
}

/// Resets a busy flag on every exit path.
struct FlagGuard<'a>(&'a AtomicBool);

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Cloning shares the same index.
#[derive(Clone)]
pub struct IncrementalLexicalIndex {
    inner: Arc<Inner>,
}

impl IncrementalLexicalIndex {
    /// In-memory index.
    pub fn new(config: IndexConfig) -> Self {
        Self::from_parts(config, IndexVersion::default(), 1, None)
    }

    /// Index persisted under `dir`, recovering whatever is there.
    pub fn open(config: IndexConfig, dir: &Path) -> QuarryResult<(Self, RecoveryReport)> {
        let store = IndexStore::open(dir)?;
        let mut loaded = store.load()?;
        if !loaded.report.is_clean() {
            // Record the dropped units so the next open starts clean.
            loaded.version.version += 1;
            loaded.report.version = loaded.version.version;
            store.write_manifest(&loaded.version, loaded.next_segment_id)?;
        }
        debug!(
            dir = %dir.display(),
            version = loaded.version.version,
            segments = loaded.version.segments.len(),
            "lexical index opened"
        );
        let index = Self::from_parts(
            config,
            loaded.version,
            loaded.next_segment_id,
            Some(store),
        );
        Ok((index, loaded.report))
    }

    fn from_parts(
        config: IndexConfig,
        version: IndexVersion,
        next_segment_id: u64,
        store: Option<IndexStore>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                current: RwLock::new(Arc::new(version)),
                writer: Mutex::new(()),
                store,
                next_segment_id: AtomicU64::new(next_segment_id),
                staging: AtomicBool::new(false),
                compacting: AtomicBool::new(false),
            }),
        }
    }

    /// The currently published version. Holding it pins it.
    pub fn snapshot(&self) -> Arc<IndexVersion> {
        Arc::clone(&self.inner.current.read())
    }

    pub fn state(&self) -> IndexState {
        let published = self.snapshot().version > 0;
        let staging = self.inner.staging.load(Ordering::SeqCst);
        match (published, staging) {
            (false, true) => IndexState::Building,
            (false, false) => IndexState::Empty,
            _ if self.inner.compacting.load(Ordering::SeqCst) => IndexState::Compacting,
            (true, true) => IndexState::Updating,
            (true, false) => IndexState::Ready,
        }
    }

    pub fn version(&self) -> u64 {
        self.snapshot().version
    }

    pub fn fragmentation_ratio(&self) -> f64 {
        self.snapshot().fragmentation_ratio()
    }

    pub fn needs_compaction(&self) -> bool {
        self.fragmentation_ratio() > self.inner.config.fragmentation_threshold
    }

    pub fn stats(&self) -> IndexStats {
        let v = self.snapshot();
        IndexStats {
            state: self.state(),
            version: v.version,
            segments: v.segments.len(),
            live_docs: v.live_docs(),
            physical_docs: v.physical_docs,
            tombstones: v.tombstones.len(),
            postings: v.posting_count(),
            fragmentation_ratio: v.fragmentation_ratio(),
        }
    }

    pub fn document(&self, doc_id: &str) -> Option<DocSummary> {
        let v = self.snapshot();
        v.locate(doc_id).map(|(_, d)| DocSummary {
            doc_id: doc_id.to_string(),
            collection: d.collection.clone(),
            content_hash: d.content_hash.clone(),
            snippet: d.snippet.clone(),
        })
    }

    /// Rank live documents for `query` against the current version.
    ///
    /// Fails with `NotReady` only while the very first build is staging.
    pub fn search(
        &self,
        query: &str,
        top_k: usize,
        filters: &Filters,
    ) -> QuarryResult<LexicalSearchResult> {
        let version = self.snapshot();
        if version.version == 0 && self.inner.staging.load(Ordering::SeqCst) {
            return Err(IndexError::NotReady {
                state: IndexState::Building.to_string(),
            }
            .into());
        }
        let params = Bm25Params {
            k1: self.inner.config.bm25_k1,
            b: self.inner.config.bm25_b,
        };
        Ok(LexicalSearchResult {
            version: version.version,
            hits: search_version(&version, query, top_k, filters, params),
        })
    }

    /// Index `docs` into new segments and publish them as one version.
    ///
    /// Re-adding an id with identical content is a no-op; with different
    /// content the old copy is tombstoned. Cancellation is checked between
    /// segments and leaves the current version untouched.
    pub fn add_documents(
        &self,
        docs: &[Document],
        cancel: &CancellationToken,
    ) -> QuarryResult<AddReport> {
        for doc in docs {
            if doc.id.trim().is_empty() {
                return Err(IndexError::InvalidDocument {
                    doc_id: doc.id.clone(),
                    reason: "empty document id".to_string(),
                }
                .into());
            }
        }

        let _writer = self.inner.writer.lock();
        self.inner.staging.store(true, Ordering::SeqCst);
        let _staging = FlagGuard(&self.inner.staging);
        let current = self.snapshot();

        // Last record per id wins within one batch.
        let mut order: Vec<&Document> = Vec::with_capacity(docs.len());
        let mut slot: HashMap<&str, usize> = HashMap::with_capacity(docs.len());
        for doc in docs {
            match slot.get(doc.id.as_str()) {
                Some(&i) => order[i] = doc,
                None => {
                    slot.insert(doc.id.as_str(), order.len());
                    order.push(doc);
                }
            }
        }

        let mut report = AddReport::default();
        let mut shadowed: Vec<(Tombstone, u64)> = Vec::new();
        let mut to_index: Vec<Document> = Vec::new();
        for doc in order {
            match current.locate(&doc.id) {
                Some((_, meta)) if meta.content_hash == doc.content_hash() => {
                    report.unchanged.push(doc.id.clone());
                }
                Some((seg, meta)) => {
                    shadowed.push((
                        Tombstone {
                            segment_id: seg.id,
                            doc_id: doc.id.clone(),
                        },
                        meta.length as u64,
                    ));
                    report.replaced.push(doc.id.clone());
                    to_index.push(doc.clone());
                }
                None => {
                    report.added.push(doc.id.clone());
                    to_index.push(doc.clone());
                }
            }
        }

        if to_index.is_empty() {
            report.version = current.version;
            return Ok(report);
        }

        let chunk_size = self.inner.config.segment_max_docs.max(1);
        let mut new_segments = Vec::with_capacity(to_index.len().div_ceil(chunk_size));
        for chunk in to_index.chunks(chunk_size) {
            if cancel.is_cancelled() {
                return Err(cancelled("add_documents"));
            }
            let id = self.inner.next_segment_id.fetch_add(1, Ordering::SeqCst);
            new_segments.push(Arc::new(Segment::build(id, chunk)));
        }
        if cancel.is_cancelled() {
            return Err(cancelled("add_documents"));
        }

        let mut tombstones = (*current.tombstones).clone();
        let mut live_length = current.live_length;
        for (tomb, length) in shadowed {
            live_length = live_length.saturating_sub(length);
            tombstones.insert(tomb);
        }
        live_length += new_segments.iter().map(|s| s.total_length()).sum::<u64>();
        let mut segments = current.segments.clone();
        segments.extend(new_segments.iter().cloned());

        let next = IndexVersion {
            version: current.version + 1,
            segments,
            tombstones: Arc::new(tombstones),
            physical_docs: current.physical_docs
                + new_segments.iter().map(|s| s.doc_count()).sum::<usize>(),
            live_length,
        };
        report.version = self.publish(next, &new_segments, &[])?.version;
        Ok(report)
    }

    /// Tombstone documents. Physical removal waits for compaction.
    pub fn remove_documents(&self, ids: &[DocId]) -> QuarryResult<RemoveReport> {
        let _writer = self.inner.writer.lock();
        self.inner.staging.store(true, Ordering::SeqCst);
        let _staging = FlagGuard(&self.inner.staging);
        let current = self.snapshot();

        let mut tombstones = (*current.tombstones).clone();
        let mut live_length = current.live_length;
        let mut removed = Vec::new();
        for id in ids {
            if let Some((seg, meta)) = current.locate(id) {
                let tomb = Tombstone {
                    segment_id: seg.id,
                    doc_id: id.clone(),
                };
                if tombstones.insert(tomb) {
                    live_length = live_length.saturating_sub(meta.length as u64);
                    removed.push(id.clone());
                }
            }
        }
        if removed.is_empty() {
            return Ok(RemoveReport {
                version: current.version,
                removed,
            });
        }

        let next = IndexVersion {
            version: current.version + 1,
            segments: current.segments.clone(),
            tombstones: Arc::new(tombstones),
            physical_docs: current.physical_docs,
            live_length,
        };
        let version = self.publish(next, &[], &[])?.version;
        Ok(RemoveReport { version, removed })
    }

    /// Rewrite every segment that holds tombstones, then publish.
    ///
    /// Runs beside readers and writers: segments are rebuilt from a snapshot
    /// without the writer lock, which is taken only to merge with whatever
    /// was published meanwhile. Cancellation or failure publishes nothing.
    pub fn compact(&self, cancel: &CancellationToken) -> QuarryResult<CompactionReport> {
        if self
            .inner
            .compacting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(IndexError::CompactionFailed {
                reason: "compaction already running".to_string(),
            }
            .into());
        }
        let _compacting = FlagGuard(&self.inner.compacting);
        let started = Instant::now();
        let snapshot = self.snapshot();
        let span = compaction_span!(snapshot.version);
        let _enter = span.enter();

        let mut dead_by_segment: HashMap<u64, HashSet<DocId>> = HashMap::new();
        for tomb in snapshot.tombstones.iter() {
            dead_by_segment
                .entry(tomb.segment_id)
                .or_default()
                .insert(tomb.doc_id.clone());
        }
        if dead_by_segment.is_empty() {
            return Ok(CompactionReport {
                version: snapshot.version,
                ..CompactionReport::default()
            });
        }

        let mut rewritten: HashMap<u64, Option<Arc<Segment>>> = HashMap::new();
        let mut postings_dropped = 0;
        for seg in &snapshot.segments {
            let Some(dead) = dead_by_segment.get(&seg.id) else {
                continue;
            };
            if cancel.is_cancelled() {
                events::compaction_abandoned("cancelled");
                return Err(cancelled("compaction"));
            }
            let replacement = if dead.len() >= seg.doc_count() {
                None
            } else {
                let id = self.inner.next_segment_id.fetch_add(1, Ordering::SeqCst);
                Some(Arc::new(seg.without(id, dead)))
            };
            postings_dropped += seg.posting_count()
                - replacement.as_ref().map_or(0, |r| r.posting_count());
            rewritten.insert(seg.id, replacement);
        }
        if cancel.is_cancelled() {
            events::compaction_abandoned("cancelled");
            return Err(cancelled("compaction"));
        }

        let _writer = self.inner.writer.lock();
        let current = self.snapshot();
        let mut segments = Vec::with_capacity(current.segments.len());
        let mut new_segments = Vec::new();
        let mut retired = Vec::new();
        for seg in &current.segments {
            match rewritten.get(&seg.id) {
                Some(Some(replacement)) => {
                    segments.push(Arc::clone(replacement));
                    new_segments.push(Arc::clone(replacement));
                    retired.push(seg.id);
                }
                Some(None) => retired.push(seg.id),
                None => segments.push(Arc::clone(seg)),
            }
        }

        // Tombstones on rewritten segments either went away with the
        // physical copy or, if added after the snapshot, move to the
        // replacement, which still holds that document.
        let mut tombstones = HashSet::with_capacity(current.tombstones.len());
        for tomb in current.tombstones.iter() {
            match rewritten.get(&tomb.segment_id) {
                None => {
                    tombstones.insert(tomb.clone());
                }
                Some(replacement) => {
                    let physically_gone = dead_by_segment
                        .get(&tomb.segment_id)
                        .is_some_and(|dead| dead.contains(&tomb.doc_id));
                    if let (false, Some(r)) = (physically_gone, replacement) {
                        tombstones.insert(Tombstone {
                            segment_id: r.id,
                            doc_id: tomb.doc_id.clone(),
                        });
                    }
                }
            }
        }

        let next = IndexVersion {
            version: current.version + 1,
            physical_docs: segments.iter().map(|s| s.doc_count()).sum(),
            segments,
            tombstones: Arc::new(tombstones),
            live_length: current.live_length,
        };
        let published = self.publish(next, &new_segments, &retired)?;

        let report = CompactionReport {
            version: published.version,
            segments_rewritten: new_segments.len(),
            segments_dropped: retired.len() - new_segments.len(),
            postings_dropped,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        events::compaction_completed(report.version, report.postings_dropped, report.duration_ms);
        Ok(report)
    }

    /// Start a background compaction if the dead ratio is over threshold
    /// and none is running.
    pub fn rebuild_if_fragmented(&self) -> Option<CompactionHandle> {
        self.rebuild_if_fragmented_with(|| Ok(()))
    }

    /// Like [`rebuild_if_fragmented`](Self::rebuild_if_fragmented), but the
    /// compaction thread first calls `admit` and holds its result until the
    /// compaction ends. An `admit` error aborts the run before any work.
    pub fn rebuild_if_fragmented_with<G, F>(&self, admit: F) -> Option<CompactionHandle>
    where
        F: FnOnce() -> QuarryResult<G> + Send + 'static,
        G: 'static,
    {
        if !self.needs_compaction() || self.inner.compacting.load(Ordering::SeqCst) {
            return None;
        }
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let index = self.clone();
        match std::thread::Builder::new()
            .name("quarry-compaction".to_string())
            .spawn(move || {
                let _admitted = admit()?;
                index.compact(&token)
            }) {
            Ok(join) => Some(CompactionHandle { join, cancel }),
            Err(e) => {
                warn!(error = %e, "failed to spawn compaction thread");
                None
            }
        }
    }

    /// Persist (when configured), then swap the pointer. Nothing is visible
    /// to readers unless every write succeeded.
    fn publish(
        &self,
        next: IndexVersion,
        new_segments: &[Arc<Segment>],
        retired: &[u64],
    ) -> QuarryResult<Arc<IndexVersion>> {
        if let Some(store) = &self.inner.store {
            for seg in new_segments {
                store.write_segment(seg)?;
            }
            store.write_manifest(&next, self.inner.next_segment_id.load(Ordering::SeqCst))?;
        }
        let next = Arc::new(next);
        *self.inner.current.write() = Arc::clone(&next);
        if let Some(store) = &self.inner.store {
            for id in retired {
                store.remove_segment(*id);
            }
        }
        events::index_published(next.version, next.live_docs(), next.segments.len());
        Ok(next)
    }
}

fn cancelled(operation: &str) -> quarry_core::QuarryError {
    IndexError::Cancelled {
        operation: operation.to_string(),
    }
    .into()
}
