//! Immutable lexical segments.
//!
//! A segment maps term → posting list for a fixed set of documents and is
//! never modified after construction. Deletions live in the version's
//! tombstone set; compaction writes a replacement segment.

use std::collections::{BTreeMap, HashMap, HashSet};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use quarry_core::constants::SNIPPET_MAX_CHARS;
use quarry_core::models::{DocId, Document};

use crate::tokenizer::tokenize;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    pub tf: u32,
    pub positions: Vec<u32>,
}

/// Per-document data carried by a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentDoc {
    pub length: u32,
    pub content_hash: String,
    pub collection: String,
    pub metadata: BTreeMap<String, String>,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    /// Allocated from a monotonic counter: a later segment has a larger id.
    pub id: u64,
    pub postings: HashMap<String, Vec<Posting>>,
    pub docs: HashMap<DocId, SegmentDoc>,
}

impl Segment {
    /// Build a segment from `docs`. Tokenization runs in parallel.
    ///
    /// Callers pass at most one record per id.
    pub fn build(id: u64, docs: &[Document]) -> Self {
        let analysed: Vec<(DocId, SegmentDoc, HashMap<String, Vec<u32>>)> = docs
            .par_iter()
            .map(|doc| {
                let tokens = tokenize(&doc.text);
                let mut terms: HashMap<String, Vec<u32>> = HashMap::new();
                for (term, pos) in &tokens {
                    terms.entry(term.clone()).or_default().push(*pos);
                }
                let meta = SegmentDoc {
                    length: tokens.len() as u32,
                    content_hash: doc.content_hash(),
                    collection: doc.collection.clone(),
                    metadata: doc.metadata.clone(),
                    snippet: snippet(&doc.text),
                };
                (doc.id.clone(), meta, terms)
            })
            .collect();

        let mut postings: HashMap<String, Vec<Posting>> = HashMap::new();
        let mut seg_docs = HashMap::with_capacity(analysed.len());
        for (doc_id, meta, terms) in analysed {
            for (term, positions) in terms {
                postings.entry(term).or_default().push(Posting {
                    doc_id: doc_id.clone(),
                    tf: positions.len() as u32,
                    positions,
                });
            }
            seg_docs.insert(doc_id, meta);
        }
        for list in postings.values_mut() {
            list.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
        }

        Self {
            id,
            postings,
            docs: seg_docs,
        }
    }

    /// Copy of this segment without `dead` documents, under a new id.
    pub fn without(&self, new_id: u64, dead: &HashSet<DocId>) -> Self {
        let postings = self
            .postings
            .iter()
            .filter_map(|(term, list)| {
                let kept: Vec<Posting> = list
                    .iter()
                    .filter(|p| !dead.contains(&p.doc_id))
                    .cloned()
                    .collect();
                (!kept.is_empty()).then(|| (term.clone(), kept))
            })
            .collect();
        let docs = self
            .docs
            .iter()
            .filter(|(id, _)| !dead.contains(*id))
            .map(|(id, d)| (id.clone(), d.clone()))
            .collect();
        Self {
            id: new_id,
            postings,
            docs,
        }
    }

    pub fn doc_count(&self) -> usize {
        self.docs.len()
    }

    pub fn posting_count(&self) -> usize {
        self.postings.values().map(Vec::len).sum()
    }

    pub fn total_length(&self) -> u64 {
        self.docs.values().map(|d| d.length as u64).sum()
    }
}

/// Leading text of a document, cut on a char boundary.
pub fn snippet(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(SNIPPET_MAX_CHARS) {
        Some((idx, _)) => trimmed[..idx].to_string(),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_records_tf_and_positions() {
        let docs = vec![
            Document::new("a", "c", "apple banana apple"),
            Document::new("b", "c", "banana"),
        ];
        let seg = Segment::build(1, &docs);
        let apple = &seg.postings["apple"];
        assert_eq!(apple.len(), 1);
        assert_eq!(apple[0].tf, 2);
        assert_eq!(apple[0].positions, vec![0, 2]);
        assert_eq!(seg.postings["banana"].len(), 2);
        assert_eq!(seg.docs["a"].length, 3);
    }

    #[test]
    fn without_drops_dead_docs_and_empty_terms() {
        let docs = vec![
            Document::new("a", "c", "apple"),
            Document::new("b", "c", "banana"),
        ];
        let seg = Segment::build(1, &docs);
        let dead: HashSet<DocId> = ["a".to_string()].into_iter().collect();
        let compacted = seg.without(2, &dead);
        assert_eq!(compacted.id, 2);
        assert!(!compacted.postings.contains_key("apple"));
        assert_eq!(compacted.doc_count(), 1);
    }

    #[test]
    fn snippet_respects_char_boundaries() {
        let text = "é".repeat(SNIPPET_MAX_CHARS + 10);
        assert_eq!(snippet(&text).chars().count(), SNIPPET_MAX_CHARS);
    }
}
