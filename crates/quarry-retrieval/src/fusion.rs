//! Weighted Reciprocal Rank Fusion: score = Σ wᵢ/(k + rankᵢ)
//!
//! Ranks are 1-based. Ordering is fully deterministic: fused score
//! descending, then better vector rank (absent ranks last), then ascending
//! document id.

use std::cmp::Ordering;
use std::collections::HashMap;

use quarry_core::models::DocId;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    pub k: u32,
    pub lexical: f64,
    pub vector: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            k: 60,
            lexical: 1.0,
            vector: 1.0,
        }
    }
}

/// A candidate after fusion.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedCandidate {
    pub doc_id: DocId,
    pub score: f64,
    pub lexical_rank: Option<usize>,
    pub vector_rank: Option<usize>,
}

/// Fuse the lexical and vector rankings.
///
/// Each list is ordered best-first. A document listed twice in the same
/// list keeps its first (best) rank.
pub fn fuse(lexical: &[DocId], vector: &[DocId], weights: FusionWeights) -> Vec<FusedCandidate> {
    let mut by_id: HashMap<&str, FusedCandidate> = HashMap::new();
    let k = f64::from(weights.k);

    for (i, id) in lexical.iter().enumerate() {
        let rank = i + 1;
        let entry = by_id.entry(id.as_str()).or_insert_with(|| blank(id));
        if entry.lexical_rank.is_none() {
            entry.lexical_rank = Some(rank);
            entry.score += weights.lexical / (k + rank as f64);
        }
    }
    for (i, id) in vector.iter().enumerate() {
        let rank = i + 1;
        let entry = by_id.entry(id.as_str()).or_insert_with(|| blank(id));
        if entry.vector_rank.is_none() {
            entry.vector_rank = Some(rank);
            entry.score += weights.vector / (k + rank as f64);
        }
    }

    let mut fused: Vec<FusedCandidate> = by_id.into_values().collect();
    fused.sort_by(compare);
    fused
}

fn blank(id: &DocId) -> FusedCandidate {
    FusedCandidate {
        doc_id: id.clone(),
        score: 0.0,
        lexical_rank: None,
        vector_rank: None,
    }
}

fn compare(a: &FusedCandidate, b: &FusedCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| match (a.vector_rank, b.vector_rank) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.doc_id.cmp(&b.doc_id))
}
