/// Retrieval orchestration errors.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("all retrieval methods unavailable")]
    AllMethodsUnavailable,

    #[error("invalid query: {reason}")]
    InvalidQuery { reason: String },

    #[error("session not found or expired: {session_id}")]
    SessionNotFound { session_id: String },
}
