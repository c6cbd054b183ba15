// Single source of truth for all default values.
// These are tunable starting points, validated empirically per deployment.

// --- Sessions ---
pub const DEFAULT_SESSION_TTL_SECS: u64 = 3_600; // 1 hour

// --- Cache ---
pub const DEFAULT_L1_CAPACITY: u64 = 500;
pub const DEFAULT_L2_HOT_CAPACITY: u64 = 1_000;
pub const DEFAULT_L2_TOTAL_CAPACITY: u64 = 5_000;
pub const DEFAULT_L3_CAPACITY: u64 = 1_000;
pub const DEFAULT_L3_TTL_SECS: u64 = 300; // 5 minutes
pub const DEFAULT_RESULT_CACHE_ENABLED: bool = true;
pub const DEFAULT_L2_PERSISTENT: bool = true;
pub const DEFAULT_L2_DB_FILENAME: &str = "doc_embeddings.db";

// --- Lexical index ---
pub const DEFAULT_FRAGMENTATION_THRESHOLD: f64 = 0.5;
pub const DEFAULT_SEGMENT_MAX_DOCS: usize = 1_000;
pub const DEFAULT_BM25_K1: f64 = 1.2;
pub const DEFAULT_BM25_B: f64 = 0.75;
pub const DEFAULT_INDEX_PERSIST: bool = true;

// --- Governor ---
pub const DEFAULT_MAX_MEMORY_MB: u64 = 8_192; // 8 GB
pub const DEFAULT_MAX_CPU_PERCENT: u32 = 100;
pub const DEFAULT_MAX_CONCURRENT: usize = 8;
pub const DEFAULT_PROMOTION_AFTER_MS: u64 = 5_000;
pub const DEFAULT_ADMISSION_TIMEOUT_MS: u64 = 30_000;

// --- Resilience ---
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 100;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 5_000;
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_JITTER_RATIO: f64 = 0.2;
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_FAILURE_WINDOW_MS: u64 = 60_000;
pub const DEFAULT_COOLDOWN_MS: u64 = 60_000;

// --- Tuner ---
pub const DEFAULT_ANALYSIS_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_HISTORY_WINDOW_SECS: u64 = 300; // 5 minutes
pub const DEFAULT_AUTO_APPLY: bool = false;
pub const DEFAULT_BULK_INGESTION_RATE: f64 = 50.0; // docs/min
pub const DEFAULT_INTERACTIVE_QUERY_RATE: f64 = 10.0; // queries/min
pub const DEFAULT_HISTORY_MAX_EVENTS: usize = 10_000;

// --- Retrieval ---
pub const DEFAULT_RRF_K: u32 = 60;
pub const DEFAULT_LEXICAL_WEIGHT: f64 = 1.0;
pub const DEFAULT_VECTOR_WEIGHT: f64 = 1.0;
pub const DEFAULT_CANDIDATE_MULTIPLIER: usize = 4;
pub const DEFAULT_MAX_TOP_K: usize = 1_000;
pub const DEFAULT_QUERY_MEMORY_MB: u64 = 64;
pub const DEFAULT_QUERY_CPU_PERCENT: u32 = 10;
pub const DEFAULT_QUERY_PRIORITY: u8 = 1;
pub const DEFAULT_INGEST_PRIORITY: u8 = 3;
pub const DEFAULT_INGEST_MEMORY_MB: u64 = 256;
pub const DEFAULT_INGEST_CPU_PERCENT: u32 = 25;
pub const DEFAULT_INGEST_BATCH_SIZE: usize = 64;
pub const DEFAULT_COMPACTION_MEMORY_MB: u64 = 512;
pub const DEFAULT_COMPACTION_CPU_PERCENT: u32 = 50;
pub const DEFAULT_COMPACTION_PRIORITY: u8 = 5;
