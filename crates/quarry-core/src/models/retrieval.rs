use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::document::DocId;
use super::session::SessionId;

/// Restricts which documents a retrieval may return.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Filters {
    pub collection: Option<String>,
    /// Every pair must match exactly.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Filters {
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: Some(collection.into()),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.collection.is_none() && self.metadata.is_empty()
    }

    pub fn matches(&self, collection: &str, metadata: &BTreeMap<String, String>) -> bool {
        if let Some(c) = &self.collection {
            if c != collection {
                return false;
            }
        }
        self.metadata
            .iter()
            .all(|(k, v)| metadata.get(k).is_some_and(|m| m == v))
    }

    /// Canonical string used in cache fingerprints.
    ///
    /// Every value is length-prefixed, so no choice of collection name or
    /// metadata text can make two different filter sets encode the same.
    pub fn canonical(&self) -> String {
        let mut out = String::new();
        match &self.collection {
            Some(c) => push_field(&mut out, 'c', c),
            None => out.push('-'),
        }
        for (k, v) in &self.metadata {
            push_field(&mut out, 'k', k);
            push_field(&mut out, 'v', v);
        }
        out
    }
}

fn push_field(out: &mut String, tag: char, value: &str) {
    out.push(tag);
    out.push_str(&value.len().to_string());
    out.push(':');
    out.push_str(value);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMethod {
    #[default]
    Hybrid,
    LexicalOnly,
    VectorOnly,
}

impl fmt::Display for RetrievalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Hybrid => "hybrid",
            Self::LexicalOnly => "lexical_only",
            Self::VectorOnly => "vector_only",
        };
        f.write_str(s)
    }
}

/// Input to `retrieve`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalRequest {
    pub query: String,
    #[serde(default)]
    pub filters: Filters,
    pub top_k: usize,
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub method: RetrievalMethod,
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>, top_k: usize) -> Self {
        Self {
            query: query.into(),
            filters: Filters::default(),
            top_k,
            session_id: None,
            method: RetrievalMethod::Hybrid,
        }
    }

    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_method(mut self, method: RetrievalMethod) -> Self {
        self.method = method;
        self
    }
}

/// One ranked passage in a retrieval response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub doc_id: DocId,
    pub score: f64,
    pub snippet: String,
    /// 1-based rank in the lexical list, if it appeared there.
    pub lexical_rank: Option<usize>,
    /// 1-based rank in the vector list, if it appeared there.
    pub vector_rank: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResponse {
    pub results: Vec<RetrievedPassage>,
    /// Set when a retrieval path was unavailable and a fallback served the query.
    pub degraded: bool,
    pub degraded_reason: Option<String>,
    pub from_cache: bool,
    /// Method that actually produced the results.
    pub method_used: RetrievalMethod,
    pub index_version: u64,
}

/// A hit returned by the vector-store collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
    pub doc_id: DocId,
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_match_collection_and_metadata() {
        let mut meta = BTreeMap::new();
        meta.insert("lang".to_string(), "en".to_string());
        let f = Filters::collection("docs").with_metadata("lang", "en");
        assert!(f.matches("docs", &meta));
        assert!(!f.matches("other", &meta));
        assert!(!Filters::default().with_metadata("lang", "de").matches("docs", &meta));
        assert!(Filters::default().matches("anything", &BTreeMap::new()));
    }

    #[test]
    fn canonical_is_order_independent() {
        let a = Filters::default().with_metadata("a", "1").with_metadata("b", "2");
        let b = Filters::default().with_metadata("b", "2").with_metadata("a", "1");
        assert_eq!(a.canonical(), b.canonical());
    }

    #[test]
    fn canonical_separates_collection_from_metadata() {
        let nested = Filters::collection("a").with_metadata("x", "1");
        let flat = Filters::collection("a;x=1");
        assert_ne!(nested.canonical(), flat.canonical());

        let split = Filters::default().with_metadata("k", "v1:v");
        let shifted = Filters::default().with_metadata("k", "v").with_metadata("1:v", "");
        assert_ne!(split.canonical(), shifted.canonical());
        assert_ne!(Filters::collection("").canonical(), Filters::default().canonical());
    }
}
