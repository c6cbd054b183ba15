/// Lexical index errors.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("index not ready: state {state}")]
    NotReady { state: String },

    #[error("index operation cancelled: {operation}")]
    Cancelled { operation: String },

    #[error("compaction failed: {reason}")]
    CompactionFailed { reason: String },

    #[error("invalid document {doc_id}: {reason}")]
    InvalidDocument { doc_id: String, reason: String },
}
