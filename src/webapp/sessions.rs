//! Transport session registry
//!
//! One registry per transport kind. Each maps a session id to the session's
//! credential, its spend counter and the transport's outbound channel.
//! Sessions are created only after the credential has been validated.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::mpsc;

use crate::mcp::{Credential, CredentialContext, SessionBudget};

/// Buffered server-to-client messages per stream
pub const STREAM_BUFFER: usize = 32;

pub struct Session<T> {
    pub id: Arc<str>,
    pub credential: Credential,
    pub budget: Arc<SessionBudget>,
    pub transport: T,
}

impl<T> Session<T> {
    pub fn new(id: impl Into<Arc<str>>, credential: Credential, max_spend: f64, transport: T) -> Self {
        Self {
            id: id.into(),
            credential,
            budget: Arc::new(SessionBudget::new(max_spend)),
            transport,
        }
    }

    /// Context for handling one message of this session
    pub fn context(&self) -> CredentialContext {
        CredentialContext::new(self.id.clone(), self.credential.clone(), self.budget.clone())
    }
}

/// Legacy stream: responses are pushed onto the open event stream
pub struct SseTransport {
    pub tx: mpsc::Sender<Value>,
}

/// Session-oriented transport: requests are answered inline. An optional
/// event stream can be attached for server-initiated messages.
#[derive(Default)]
pub struct StreamableTransport {
    push: Mutex<Option<mpsc::Sender<Value>>>,
}

impl StreamableTransport {
    /// Attach the server-push stream. Fails while another one is still open.
    pub fn attach_stream(&self) -> Option<mpsc::Receiver<Value>> {
        let mut push = self.push.lock().unwrap_or_else(PoisonError::into_inner);
        if push.as_ref().is_some_and(|tx| !tx.is_closed()) {
            return None;
        }
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        *push = Some(tx);
        Some(rx)
    }

    #[cfg(test)]
    fn has_stream(&self) -> bool {
        let push = self.push.lock().unwrap_or_else(PoisonError::into_inner);
        push.as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

struct Entry<T> {
    session: Arc<Session<T>>,
    last_seen: Instant,
}

pub struct SessionRegistry<T> {
    sessions: Arc<Mutex<HashMap<Arc<str>, Entry<T>>>>,
}

impl<T> Clone for SessionRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            sessions: self.sessions.clone(),
        }
    }
}

impl<T> Default for SessionRegistry<T> {
    fn default() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T> SessionRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Arc<str>, Entry<T>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, session: Session<T>) -> Arc<Session<T>> {
        let session = Arc::new(session);
        self.lock().insert(
            session.id.clone(),
            Entry {
                session: session.clone(),
                last_seen: Instant::now(),
            },
        );
        tracing::debug!(session = %session.id, wallet = %session.credential.address(), "Session created");
        session
    }

    /// Look up a session and mark it as used
    pub fn get(&self, id: &str) -> Option<Arc<Session<T>>> {
        let mut sessions = self.lock();
        let entry = sessions.get_mut(id)?;
        entry.last_seen = Instant::now();
        Some(entry.session.clone())
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Session<T>>> {
        let removed = self.lock().remove(id).map(|e| e.session);
        if let Some(session) = &removed {
            tracing::debug!(session = %session.id, spent = session.budget.spent_usd(), "Session closed");
        }
        removed
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop sessions unused for longer than `idle`, returning their ids
    pub fn evict_idle(&self, idle: Duration) -> Vec<Arc<str>> {
        let mut sessions = self.lock();
        let expired: Vec<Arc<str>> = sessions
            .iter()
            .filter(|(_, e)| e.last_seen.elapsed() > idle)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            sessions.remove(id);
        }
        expired
    }
}

/// Removes a session when dropped, tying its lifetime to a stream
pub struct SessionGuard<T> {
    registry: SessionRegistry<T>,
    id: Arc<str>,
}

impl<T> SessionGuard<T> {
    pub fn new(registry: SessionRegistry<T>, id: Arc<str>) -> Self {
        Self { registry, id }
    }
}

impl<T> Drop for SessionGuard<T> {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
    }
}
