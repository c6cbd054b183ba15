//! SessionManager: concurrent per-session access via DashMap.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;

use quarry_core::errors::{QuarryResult, RetrievalError};
use quarry_core::{Session, SessionId};

/// Thread-safe session table.
///
/// Cloning shares the same table. One instance per process is typical, but
/// nothing stops tests from creating as many as they like.
#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<DashMap<SessionId, Session>>,
    default_ttl_secs: u64,
}

impl SessionManager {
    pub fn new(default_ttl_secs: u64) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            default_ttl_secs,
        }
    }

    /// Create a session with the default TTL.
    pub fn create(&self) -> Session {
        self.create_with_ttl(self.default_ttl_secs)
    }

    pub fn create_with_ttl(&self, ttl_secs: u64) -> Session {
        let session = Session::new(ttl_secs);
        self.sessions
            .insert(session.session_id.clone(), session.clone());
        debug!(session_id = %session.session_id, ttl_secs, "session created");
        session
    }

    /// Snapshot of a live session. Does not refresh it.
    pub fn get(&self, session_id: &SessionId) -> Option<Session> {
        let session = self.sessions.get(session_id).map(|r| r.clone())?;
        if session.is_expired() {
            self.sessions.remove(session_id);
            return None;
        }
        Some(session)
    }

    /// Refresh `last_accessed` and return the updated session.
    ///
    /// An expired session is removed and reported as absent.
    pub fn touch(&self, session_id: &SessionId) -> Option<Session> {
        let now = Utc::now();
        let mut entry = self.sessions.get_mut(session_id)?;
        if entry.is_expired_at(now) {
            drop(entry);
            self.sessions.remove(session_id);
            debug!(session_id = %session_id, "session expired on access");
            return None;
        }
        entry.last_accessed = now;
        Some(entry.clone())
    }

    /// `touch`, failing with `SessionNotFound` for unknown or expired ids.
    pub fn require(&self, session_id: &SessionId) -> QuarryResult<Session> {
        self.touch(session_id).ok_or_else(|| {
            RetrievalError::SessionNotFound {
                session_id: session_id.to_string(),
            }
            .into()
        })
    }

    /// End a session explicitly.
    pub fn expire(&self, session_id: &SessionId) -> Option<Session> {
        let removed = self.sessions.remove(session_id).map(|(_, s)| s);
        if removed.is_some() {
            debug!(session_id = %session_id, "session expired");
        }
        removed
    }

    /// Remove every session past its TTL and return their ids so the caller
    /// can purge the matching cache scopes.
    pub fn cleanup_expired(&self) -> Vec<SessionId> {
        let now = Utc::now();
        let expired: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|r| r.is_expired_at(now))
            .map(|r| r.key().clone())
            .collect();
        for id in &expired {
            self.sessions.remove(id);
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "expired sessions cleaned up");
        }
        expired
    }

    /// Number of tracked sessions (expired ones count until swept).
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|r| r.key().clone()).collect()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(quarry_core::config::defaults::DEFAULT_SESSION_TTL_SECS)
    }
}
