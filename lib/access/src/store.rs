//! Session persistence.
//!
//! The store is the authority on which sessions exist and in which state.
//! It does not evaluate expiry; the gate closes expired sessions lazily on
//! read. Concurrent `touch` calls on one session are last-write-wins.

use async_trait::async_trait;
use csdt_core::{Result, SessionId, SubjectId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::StoreError;
use crate::session::{Session, SessionState, SessionToken};

/// Storage backend for sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the most recently started active session of a subject.
    ///
    /// Expiration is not checked here.
    async fn find_active(&self, subject_id: SubjectId)
    -> Result<Option<Session>, StoreError>;

    /// Returns the session a bearer token belongs to, in whatever state.
    async fn find_by_token(
        &self,
        token: &SessionToken,
    ) -> Result<Option<Session>, StoreError>;

    /// Persists a newly opened session.
    async fn insert(&self, session: &Session) -> Result<(), StoreError>;

    /// Persists the session's activity metadata and nothing else.
    async fn touch(&self, session: &Session) -> Result<(), StoreError>;

    /// Marks a session closed.
    async fn close(&self, session_id: SessionId) -> Result<(), StoreError>;
}

/// Sessions kept in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
}

impl MemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a stored session by id, for inspection.
    #[must_use]
    pub fn get(&self, session_id: SessionId) -> Option<Session> {
        self.sessions
            .read()
            .ok()
            .and_then(|sessions| sessions.get(&session_id).cloned())
    }

    /// Number of stored sessions, including closed ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or_default()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Backend {
        details: e.to_string(),
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn find_active(
        &self,
        subject_id: SubjectId,
    ) -> Result<Option<Session>, StoreError> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        Ok(sessions
            .values()
            .filter(|s| s.subject_id() == subject_id && s.state() == SessionState::Active)
            .max_by_key(|s| s.started_at())
            .cloned())
    }

    async fn find_by_token(
        &self,
        token: &SessionToken,
    ) -> Result<Option<Session>, StoreError> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        Ok(sessions.values().find(|s| s.token() == token).cloned())
    }

    async fn insert(&self, session: &Session) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        if sessions.values().any(|s| s.token() == session.token()) {
            return Err(StoreError::DuplicateToken.into());
        }
        sessions.insert(session.id(), session.clone());
        Ok(())
    }

    async fn touch(&self, session: &Session) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        if let Some(stored) = sessions.get_mut(&session.id()) {
            stored.copy_activity_from(session);
        }
        Ok(())
    }

    async fn close(&self, session_id: SessionId) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        if let Some(stored) = sessions.get_mut(&session_id) {
            stored.close();
        }
        Ok(())
    }
}
