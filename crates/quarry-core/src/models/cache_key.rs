use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::document::write_field;
use super::session::SessionId;
use crate::constants::GLOBAL_SCOPE;

/// Cache levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheTier {
    /// Query embeddings.
    L1,
    /// Document embeddings (hot memory + persistent).
    L2,
    /// Fused retrieval results.
    L3,
}

impl fmt::Display for CacheTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::L1 => "l1",
            Self::L2 => "l2",
            Self::L3 => "l3",
        };
        f.write_str(s)
    }
}

/// Key space a cache entry lives in. No lookup crosses scopes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheScope {
    Global,
    Session(SessionId),
}

impl CacheScope {
    pub fn from_session(session: Option<&SessionId>) -> Self {
        match session {
            Some(id) => Self::Session(id.clone()),
            None => Self::Global,
        }
    }

    /// Stable textual tag; also the value mixed into fingerprints.
    pub fn tag(&self) -> String {
        match self {
            Self::Global => GLOBAL_SCOPE.to_string(),
            Self::Session(id) => format!("session:{id}"),
        }
    }
}

/// Deterministic fingerprint of (scope, identity, parameters).
///
/// The scope is kept alongside the digest so equality can never succeed
/// across scopes, even on a digest collision, and so scopes can be purged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub scope: CacheScope,
    pub fingerprint: String,
}

impl CacheKey {
    pub fn builder(scope: CacheScope, namespace: &str) -> CacheKeyBuilder {
        CacheKeyBuilder {
            scope,
            namespace: namespace.to_string(),
            parts: Vec::new(),
            params: BTreeMap::new(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope.tag(), self.fingerprint)
    }
}

pub struct CacheKeyBuilder {
    scope: CacheScope,
    namespace: String,
    parts: Vec<String>,
    params: BTreeMap<String, String>,
}

impl CacheKeyBuilder {
    /// Append an identity component (query text, document id).
    pub fn part(mut self, part: impl Into<String>) -> Self {
        self.parts.push(part.into());
        self
    }

    /// Add a named parameter. Order of insertion does not matter.
    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(name.into(), value.to_string());
        self
    }

    pub fn build(self) -> CacheKey {
        let mut hasher = blake3::Hasher::new();
        write_field(&mut hasher, self.scope.tag().as_bytes());
        write_field(&mut hasher, self.namespace.as_bytes());
        hasher.update(&(self.parts.len() as u64).to_le_bytes());
        for part in &self.parts {
            write_field(&mut hasher, part.as_bytes());
        }
        for (k, v) in &self.params {
            write_field(&mut hasher, k.as_bytes());
            write_field(&mut hasher, v.as_bytes());
        }
        CacheKey {
            scope: self.scope,
            fingerprint: hasher.finalize().to_hex().to_string(),
        }
    }
}
