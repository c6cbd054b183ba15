//! Published index snapshots.
//!
//! An `IndexVersion` is immutable. Readers clone the `Arc` and keep using it
//! for the whole query, however many versions get published meanwhile; the
//! version is freed when its last reader drops it.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use quarry_core::models::DocId;

use crate::segment::{Segment, SegmentDoc};

/// A physically present but logically deleted (segment, document) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tombstone {
    pub segment_id: u64,
    pub doc_id: DocId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    /// Nothing has ever been published.
    Empty,
    /// First build in progress; nothing to serve yet.
    Building,
    Ready,
    /// A mutation is staging; reads use the previous version.
    Updating,
    /// Background compaction running; reads use the previous version.
    Compacting,
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Empty => "empty",
            Self::Building => "building",
            Self::Ready => "ready",
            Self::Updating => "updating",
            Self::Compacting => "compacting",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default)]
pub struct IndexVersion {
    pub version: u64,
    pub segments: Vec<Arc<Segment>>,
    /// Pending-delete set. Compaction drains it.
    pub tombstones: Arc<HashSet<Tombstone>>,
    /// Documents across all segments, dead or alive.
    pub physical_docs: usize,
    /// Sum of live document lengths, for BM25 length normalization.
    pub live_length: u64,
}

impl IndexVersion {
    pub fn live_docs(&self) -> usize {
        self.physical_docs.saturating_sub(self.tombstones.len())
    }

    /// Dead fraction of physical documents.
    pub fn fragmentation_ratio(&self) -> f64 {
        if self.physical_docs == 0 {
            0.0
        } else {
            self.tombstones.len() as f64 / self.physical_docs as f64
        }
    }

    pub fn avg_doc_length(&self) -> f64 {
        let live = self.live_docs();
        if live == 0 {
            0.0
        } else {
            self.live_length as f64 / live as f64
        }
    }

    pub fn is_live(&self, segment_id: u64, doc_id: &str) -> bool {
        !self.tombstones.contains(&Tombstone {
            segment_id,
            doc_id: doc_id.to_string(),
        })
    }

    /// The segment holding the live copy of `doc_id`, if any.
    ///
    /// At most one copy is live: re-adding a document tombstones the old one.
    pub fn locate(&self, doc_id: &str) -> Option<(&Arc<Segment>, &SegmentDoc)> {
        self.segments.iter().rev().find_map(|seg| {
            seg.docs
                .get(doc_id)
                .filter(|_| self.is_live(seg.id, doc_id))
                .map(|d| (seg, d))
        })
    }

    pub fn posting_count(&self) -> usize {
        self.segments.iter().map(|s| s.posting_count()).sum()
    }
}
