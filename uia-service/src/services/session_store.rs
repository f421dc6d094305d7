//! Session persistence for in-progress auth attempts.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use rand::{Rng, distributions::Alphanumeric};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::{AuthSession, StageType};

/// Length of generated session identifiers.
const SESSION_ID_LEN: usize = 24;

#[derive(Error, Debug)]
pub enum SessionStoreError {
    #[error("Unknown session")]
    UnknownSession,

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Storage backend for auth sessions.
///
/// Implementations must synchronize per session: `complete_stage` is a
/// monotonic union, and two concurrent submissions against the same session
/// must both land.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a session around the operation's parameter snapshot.
    async fn create(&self, params: Map<String, Value>) -> Result<AuthSession, SessionStoreError>;

    /// Fetch a live session, refreshing its activity timestamp. Expired and
    /// unknown ids are indistinguishable to callers.
    async fn get(&self, id: &str) -> Result<Option<AuthSession>, SessionStoreError>;

    /// Record a passed stage. Re-recording the same stage replaces its
    /// payload but never removes earlier completions.
    async fn complete_stage(
        &self,
        id: &str,
        stage: StageType,
        result: Value,
    ) -> Result<(), SessionStoreError>;

    /// Attach server-private data to a session.
    async fn set_data(&self, id: &str, key: &str, value: Value) -> Result<(), SessionStoreError>;

    /// Read server-private data back.
    async fn get_data(&self, id: &str, key: &str) -> Result<Option<Value>, SessionStoreError>;

    /// Drop expired sessions, returning how many were removed.
    async fn purge_expired(&self) -> usize;

    /// Number of live sessions, for health reporting.
    async fn session_count(&self) -> usize;
}

/// Process-local store. Sessions live in a concurrent map and die either on
/// inactivity or with the process.
pub struct InMemorySessionStore {
    sessions: DashMap<String, AuthSession>,
    ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    fn random_session_id() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SESSION_ID_LEN)
            .map(char::from)
            .collect()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, params: Map<String, Value>) -> Result<AuthSession, SessionStoreError> {
        // Creation doubles as an opportunistic sweep so an idle deployment
        // does not accumulate dead sessions between purge ticks.
        let now = Utc::now();
        self.sessions.retain(|_, s| !s.is_expired(self.ttl, now));

        let mut id = Self::random_session_id();
        while self.sessions.contains_key(&id) {
            id = Self::random_session_id();
        }

        let session = AuthSession::new(id.clone(), params);
        self.sessions.insert(id, session.clone());
        Ok(session)
    }

    async fn get(&self, id: &str) -> Result<Option<AuthSession>, SessionStoreError> {
        let now = Utc::now();
        if let Some(mut entry) = self.sessions.get_mut(id) {
            if entry.is_expired(self.ttl, now) {
                drop(entry);
                self.sessions.remove(id);
                return Ok(None);
            }
            entry.last_active_at = now;
            return Ok(Some(entry.clone()));
        }
        Ok(None)
    }

    async fn complete_stage(
        &self,
        id: &str,
        stage: StageType,
        result: Value,
    ) -> Result<(), SessionStoreError> {
        let now = Utc::now();
        match self.sessions.get_mut(id) {
            Some(mut entry) if !entry.is_expired(self.ttl, now) => {
                entry.last_active_at = now;
                entry.completed.insert(stage, result);
                Ok(())
            }
            Some(entry) => {
                drop(entry);
                self.sessions.remove(id);
                Err(SessionStoreError::UnknownSession)
            }
            None => Err(SessionStoreError::UnknownSession),
        }
    }

    async fn set_data(&self, id: &str, key: &str, value: Value) -> Result<(), SessionStoreError> {
        let now = Utc::now();
        match self.sessions.get_mut(id) {
            Some(mut entry) if !entry.is_expired(self.ttl, now) => {
                entry.last_active_at = now;
                entry.data.insert(key.to_string(), value);
                Ok(())
            }
            Some(entry) => {
                drop(entry);
                self.sessions.remove(id);
                Err(SessionStoreError::UnknownSession)
            }
            None => Err(SessionStoreError::UnknownSession),
        }
    }

    async fn get_data(&self, id: &str, key: &str) -> Result<Option<Value>, SessionStoreError> {
        let now = Utc::now();
        match self.sessions.get(id) {
            Some(entry) if !entry.is_expired(self.ttl, now) => Ok(entry.data.get(key).cloned()),
            Some(_) | None => Err(SessionStoreError::UnknownSession),
        }
    }

    async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !s.is_expired(self.ttl, now));
        before - self.sessions.len()
    }

    async fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
