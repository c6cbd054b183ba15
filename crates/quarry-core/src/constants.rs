/// Quarry version string.
pub const QUARRY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// On-disk schema version for the L2 document-embedding store.
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// On-disk schema version for lexical index segments and manifest.
pub const INDEX_SCHEMA_VERSION: u32 = 1;

/// Scope label used when no session is attached to a request.
pub const GLOBAL_SCOPE: &str = "global";

/// Maximum characters kept as a document snippet.
pub const SNIPPET_MAX_CHARS: usize = 240;
