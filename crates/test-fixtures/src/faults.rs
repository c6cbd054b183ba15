//! Fault injection around the in-memory collaborators.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use quarry_core::errors::{DependencyError, QuarryResult};
use quarry_core::models::{DocId, Dependency, Filters, VectorHit};
use quarry_core::traits::{IEmbeddingService, IVectorStore};

use crate::embedder::HashEmbedder;
use crate::vector_store::InMemoryVectorStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultMode {
    Healthy,
    /// Every call times out.
    Timeout,
    /// The next `n` calls time out, then calls succeed.
    TimeoutNext(u32),
    /// Every call is rejected as invalid.
    Reject,
}

/// Shared, switchable failure schedule with a call counter.
#[derive(Clone)]
pub struct FaultPlan {
    dependency: Dependency,
    mode: Arc<Mutex<FaultMode>>,
    calls: Arc<AtomicU64>,
}

impl FaultPlan {
    pub fn new(dependency: Dependency) -> Self {
        Self {
            dependency,
            mode: Arc::new(Mutex::new(FaultMode::Healthy)),
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn set(&self, mode: FaultMode) {
        *self.mode.lock() = mode;
    }

    /// Calls that reached the collaborator, failed or not.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> QuarryResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut mode = self.mode.lock();
        match *mode {
            FaultMode::Healthy => Ok(()),
            FaultMode::Timeout => Err(DependencyError::transient(self.dependency, "timeout").into()),
            FaultMode::TimeoutNext(n) => {
                *mode = if n <= 1 { FaultMode::Healthy } else { FaultMode::TimeoutNext(n - 1) };
                Err(DependencyError::transient(self.dependency, "timeout").into())
            }
            FaultMode::Reject => {
                Err(DependencyError::permanent(self.dependency, "request rejected").into())
            }
        }
    }
}

pub struct FaultyEmbedder {
    inner: HashEmbedder,
    plan: FaultPlan,
}

impl FaultyEmbedder {
    pub fn new(inner: HashEmbedder) -> Self {
        Self {
            inner,
            plan: FaultPlan::new(Dependency::Embedding),
        }
    }

    pub fn plan(&self) -> FaultPlan {
        self.plan.clone()
    }
}

impl IEmbeddingService for FaultyEmbedder {
    fn embed(&self, text: &str) -> QuarryResult<Vec<f32>> {
        self.plan.check()?;
        self.inner.embed(text)
    }

    fn embed_batch(&self, texts: &[String]) -> QuarryResult<Vec<Vec<f32>>> {
        self.plan.check()?;
        self.inner.embed_batch(texts)
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

pub struct FaultyVectorStore {
    inner: Arc<InMemoryVectorStore>,
    plan: FaultPlan,
}

impl FaultyVectorStore {
    pub fn new(inner: Arc<InMemoryVectorStore>) -> Self {
        Self {
            inner,
            plan: FaultPlan::new(Dependency::VectorStore),
        }
    }

    pub fn plan(&self) -> FaultPlan {
        self.plan.clone()
    }

    pub fn inner(&self) -> &Arc<InMemoryVectorStore> {
        &self.inner
    }
}

impl IVectorStore for FaultyVectorStore {
    fn upsert(
        &self,
        id: &DocId,
        vector: &[f32],
        collection: &str,
        metadata: &BTreeMap<String, String>,
    ) -> QuarryResult<()> {
        self.plan.check()?;
        self.inner.upsert(id, vector, collection, metadata)
    }

    fn search(&self, vector: &[f32], top_k: usize, filters: &Filters) -> QuarryResult<Vec<VectorHit>> {
        self.plan.check()?;
        self.inner.search(vector, top_k, filters)
    }

    fn remove(&self, ids: &[DocId]) -> QuarryResult<()> {
        self.plan.check()?;
        self.inner.remove(ids)
    }
}
