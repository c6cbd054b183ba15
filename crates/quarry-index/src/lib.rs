//! # quarry-index
//!
//! Keyword index that is updated differentially instead of rebuilt.
//!
//! - Immutable [`Segment`]s hold postings; deletions are tombstones.
//! - Each mutation publishes a new [`IndexVersion`] by pointer swap.
//! - Readers pin the version they started with.
//! - Compaction rewrites fragmented segments in the background.

pub mod index;
pub mod persist;
pub mod search;
pub mod segment;
pub mod tokenizer;
pub mod version;

pub use index::{
    AddReport, CompactionHandle, CompactionReport, DocSummary, IncrementalLexicalIndex,
    IndexStats, RemoveReport,
};
pub use persist::RecoveryReport;
pub use search::{LexicalHit, LexicalSearchResult};
pub use segment::{Posting, Segment};
pub use version::{IndexState, IndexVersion, Tombstone};
