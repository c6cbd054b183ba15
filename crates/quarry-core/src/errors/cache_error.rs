/// Cache subsystem errors.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("persistent tier unavailable: {reason}")]
    PersistentUnavailable { reason: String },

    #[error("stored embedding for {fingerprint} is malformed: {reason}")]
    MalformedEntry { fingerprint: String, reason: String },
}
