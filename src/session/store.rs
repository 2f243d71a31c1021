// Session store
//
// The only shared mutable structure in the service. Each session is mutated
// by its own build task; the store only has to make insert, lookup and the
// iterate guard safe under concurrent requests. `SessionStore` is the seam
// for an externally persisted store in multi-process deployments.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;

use super::types::{BuildSession, BuildStatus};
use crate::forge::LoopObserver;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session {id} is {actual}, expected {expected}")]
    InvalidTransition {
        id: String,
        expected: BuildStatus,
        actual: BuildStatus,
    },

    #[error("Session {0} already has a build in progress")]
    AlreadyActive(String),

    /// Malformed create/iterate request (missing prompt, bad id)
    #[error("{0}")]
    InvalidRequest(String),
}

pub trait SessionStore: Send + Sync {
    /// Register a new session. Replaces a finished session with the same id;
    /// rejects one that is still generating or iterating.
    fn insert_new(&self, session: BuildSession) -> Result<(), SessionError>;

    fn get(&self, id: &str) -> Option<BuildSession>;

    /// Overwrite a stored session
    fn put(&self, session: BuildSession);

    /// Apply `f` to the stored session and return the result
    fn update(
        &self,
        id: &str,
        f: &mut dyn FnMut(&mut BuildSession),
    ) -> Result<BuildSession, SessionError>;

    /// Atomically move `id` from `from` to `to`
    fn transition(
        &self,
        id: &str,
        from: BuildStatus,
        to: BuildStatus,
    ) -> Result<BuildSession, SessionError>;

    fn append_log(&self, id: &str, message: &str) -> Result<(), SessionError> {
        self.update(id, &mut |s| s.push_log(message)).map(|_| ())
    }
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<String, BuildSession>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionStore for InMemorySessionStore {
    fn insert_new(&self, session: BuildSession) -> Result<(), SessionError> {
        match self.sessions.entry(session.id.clone()) {
            Entry::Occupied(mut existing) => {
                if !existing.get().status.is_terminal() {
                    return Err(SessionError::AlreadyActive(session.id));
                }
                existing.insert(session);
            }
            Entry::Vacant(slot) => {
                slot.insert(session);
            }
        }
        Ok(())
    }

    fn get(&self, id: &str) -> Option<BuildSession> {
        self.sessions.get(id).map(|s| s.clone())
    }

    fn put(&self, session: BuildSession) {
        self.sessions.insert(session.id.clone(), session);
    }

    fn update(
        &self,
        id: &str,
        f: &mut dyn FnMut(&mut BuildSession),
    ) -> Result<BuildSession, SessionError> {
        let mut session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        f(&mut session);
        Ok(session.clone())
    }

    fn transition(
        &self,
        id: &str,
        from: BuildStatus,
        to: BuildStatus,
    ) -> Result<BuildSession, SessionError> {
        let mut session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        if session.status != from {
            return Err(SessionError::InvalidTransition {
                id: id.to_string(),
                expected: from,
                actual: session.status,
            });
        }
        session.status = to;
        session.push_log(format!("Status: {} -> {}", from, to));
        Ok(session.clone())
    }
}

/// Routes loop progress into one session's log
pub struct SessionReporter {
    store: Arc<dyn SessionStore>,
    id: String,
}

impl SessionReporter {
    pub fn new(store: Arc<dyn SessionStore>, id: impl Into<String>) -> Self {
        Self {
            store,
            id: id.into(),
        }
    }
}

impl LoopObserver for SessionReporter {
    fn log(&self, message: &str) {
        tracing::info!(session = %self.id, "{}", message);
        if let Err(e) = self.store.append_log(&self.id, message) {
            tracing::warn!("Dropping session log line: {}", e);
        }
    }

    fn iteration(&self, iteration: usize) {
        if let Err(e) = self.store.update(&self.id, &mut |s| s.iteration = iteration) {
            tracing::warn!("Dropping iteration update: {}", e);
        }
    }
}
