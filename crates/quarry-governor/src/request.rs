use serde::{Deserialize, Serialize};

/// A claim on resources for one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub operation_id: String,
    pub memory_mb: u64,
    pub cpu_percent: u32,
    /// Lower is served first.
    pub priority: u8,
}

impl ResourceRequest {
    pub fn new(
        operation_id: impl Into<String>,
        memory_mb: u64,
        cpu_percent: u32,
        priority: u8,
    ) -> Self {
        Self {
            operation_id: operation_id.into(),
            memory_mb,
            cpu_percent,
            priority,
        }
    }

    /// Request under a freshly generated operation id.
    pub fn anonymous(prefix: &str, memory_mb: u64, cpu_percent: u32, priority: u8) -> Self {
        let id = format!("{prefix}-{}", uuid::Uuid::new_v4().simple());
        Self::new(id, memory_mb, cpu_percent, priority)
    }
}
