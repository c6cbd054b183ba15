use std::fmt;

use serde::{Deserialize, Serialize};

/// External collaborators whose calls are guarded by the resilience layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dependency {
    Embedding,
    VectorStore,
    LexicalIndex,
    Generation,
}

impl Dependency {
    pub const ALL: [Dependency; 4] = [
        Dependency::Embedding,
        Dependency::VectorStore,
        Dependency::LexicalIndex,
        Dependency::Generation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Embedding => "embedding",
            Self::VectorStore => "vector_store",
            Self::LexicalIndex => "lexical_index",
            Self::Generation => "generation",
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
