use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque, unpredictable session identifier (128 random bits).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Fresh random id from a v4 UUID.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A caller session. Scopes every cache key touched on its behalf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub ttl_secs: u64,
}

impl Session {
    pub fn new(ttl_secs: u64) -> Self {
        let now = Utc::now();
        Self {
            session_id: SessionId::generate(),
            created_at: now,
            last_accessed: now,
            ttl_secs,
        }
    }

    /// Idle expiry: TTL counts from the last access.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let idle_ms = now
            .signed_duration_since(self.last_accessed)
            .num_milliseconds();
        let ttl_ms = i64::try_from(self.ttl_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
        idle_ms >= ttl_ms
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn ids_are_unique_and_128_bit() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn expiry_counts_from_last_access() {
        let mut s = Session::new(10);
        let now = Utc::now();
        s.last_accessed = now - Duration::seconds(5);
        assert!(!s.is_expired_at(now));
        s.last_accessed = now - Duration::seconds(11);
        assert!(s.is_expired_at(now));
    }
}
