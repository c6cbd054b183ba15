//! BM25 scoring against one published version.

use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use quarry_core::models::{DocId, Filters};

use crate::tokenizer::query_terms;
use crate::version::IndexVersion;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexicalHit {
    pub doc_id: DocId,
    pub score: f64,
    pub snippet: String,
}

/// Result of one search, tagged with the version it read.
#[derive(Debug, Clone, Default)]
pub struct LexicalSearchResult {
    pub version: u64,
    pub hits: Vec<LexicalHit>,
}

#[derive(Debug, Clone, Copy)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
}

/// Rank live documents of `version` for `query`.
///
/// Ordering is by descending score, then ascending document id.
pub fn search_version(
    version: &IndexVersion,
    query: &str,
    top_k: usize,
    filters: &Filters,
    params: Bm25Params,
) -> Vec<LexicalHit> {
    let terms = query_terms(query);
    if terms.is_empty() || top_k == 0 || version.live_docs() == 0 {
        return Vec::new();
    }

    let n = version.live_docs() as f64;
    let avgdl = version.avg_doc_length().max(1.0);

    // Document frequency over live postings only.
    let idf: Vec<(String, f64)> = terms
        .into_iter()
        .map(|term| {
            let df = version
                .segments
                .iter()
                .filter_map(|seg| seg.postings.get(&term).map(|list| (seg.id, list)))
                .map(|(seg_id, list)| {
                    list.iter()
                        .filter(|p| version.is_live(seg_id, &p.doc_id))
                        .count()
                })
                .sum::<usize>() as f64;
            let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
            (term, idf)
        })
        .filter(|(_, idf)| *idf > 0.0)
        .collect();

    let mut hits: Vec<LexicalHit> = version
        .segments
        .par_iter()
        .flat_map_iter(|seg| {
            let mut scores: HashMap<&str, f64> = HashMap::new();
            for (term, idf) in &idf {
                let Some(list) = seg.postings.get(term) else {
                    continue;
                };
                for posting in list {
                    if !version.is_live(seg.id, &posting.doc_id) {
                        continue;
                    }
                    let Some(doc) = seg.docs.get(&posting.doc_id) else {
                        continue;
                    };
                    if !filters.matches(&doc.collection, &doc.metadata) {
                        continue;
                    }
                    let tf = posting.tf as f64;
                    let norm = params.k1 * (1.0 - params.b + params.b * doc.length as f64 / avgdl);
                    *scores.entry(posting.doc_id.as_str()).or_default() +=
                        idf * tf * (params.k1 + 1.0) / (tf + norm);
                }
            }
            scores
                .into_iter()
                .map(|(doc_id, score)| LexicalHit {
                    doc_id: doc_id.to_string(),
                    score,
                    snippet: seg
                        .docs
                        .get(doc_id)
                        .map(|d| d.snippet.clone())
                        .unwrap_or_default(),
                })
                .collect::<Vec<_>>()
        })
        .collect();

    hits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.doc_id.cmp(&b.doc_id))
    });
    hits.truncate(top_k);
    hits
}
