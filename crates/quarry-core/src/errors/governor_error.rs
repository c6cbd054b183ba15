/// Resource governor errors.
#[derive(Debug, thiserror::Error)]
pub enum GovernorError {
    #[error("resource limit exceeded: {resource} requested {requested}, configured maximum {limit}")]
    ResourceLimitExceeded {
        resource: &'static str,
        requested: u64,
        limit: u64,
    },

    #[error("operation {operation_id} already holds or awaits a reservation")]
    DuplicateOperation { operation_id: String },

    #[error("reservation for {operation_id} not granted within {waited_ms}ms")]
    AdmissionTimeout { operation_id: String, waited_ms: u64 },
}
