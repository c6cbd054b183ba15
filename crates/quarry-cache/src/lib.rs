//! # quarry-cache
//!
//! Three independently evicting tiers behind one coordinator:
//!
//! - **L1** query embeddings, in memory, LRU, session-scoped keys.
//! - **L2** document embeddings, a hot LRU in memory over a SQLite file.
//! - **L3** fused retrieval results with TTL and generation-based coherence.
//!
//! Every tier is an optimization. A miss, or a failed persistent tier, is
//! always recoverable by recomputation.

pub mod coordinator;
pub mod entry;
pub mod keys;
pub mod l1_query;
pub mod l2_document;
pub mod l3_result;
pub mod persistent;
pub mod stats;

pub use coordinator::MultiTierCache;
pub use entry::CacheEntry;
pub use l1_query::L1QueryCache;
pub use l2_document::{DocEmbedding, L2DocumentCache};
pub use l3_result::{CachedResult, L3ResultCache};
pub use persistent::PersistentStore;
pub use stats::{CacheStats, TierStats};
