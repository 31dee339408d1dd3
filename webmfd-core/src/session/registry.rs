//! Process-wide table of live panel sessions

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::key::SessionKey;
use crate::transport::TransportChannel;
use crate::widget::PanelWidget;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Registered and forwarding events
    Active,
    /// Teardown sent; about to leave the registry
    TornDown,
}

/// One panel's binding to the server
pub struct Session {
    key: SessionKey,
    widget: Weak<dyn PanelWidget>,
    channel: Arc<dyn TransportChannel>,
    state: RwLock<SessionState>,
    opened_at: DateTime<Utc>,
}

impl Session {
    fn new(
        key: SessionKey,
        widget: Weak<dyn PanelWidget>,
        channel: Arc<dyn TransportChannel>,
    ) -> Self {
        Self {
            key,
            widget,
            channel,
            state: RwLock::new(SessionState::Active),
            opened_at: Utc::now(),
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// The host's widget, if the host still holds it
    pub fn widget(&self) -> Option<Arc<dyn PanelWidget>> {
        self.widget.upgrade()
    }

    pub fn channel(&self) -> &Arc<dyn TransportChannel> {
        &self.channel
    }

    pub fn state(&self) -> SessionState {
        self.state.read().map(|s| *s).unwrap_or(SessionState::TornDown)
    }

    /// Mark the session torn down; false if it already was
    ///
    /// Check and transition happen under one write guard, so exactly one
    /// of several concurrent closers wins.
    pub(crate) fn begin_teardown(&self) -> bool {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *state == SessionState::TornDown {
            return false;
        }
        *state = SessionState::TornDown;
        true
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.key)
            .field("transport", &self.channel.kind())
            .field("state", &self.state())
            .field("opened_at", &self.opened_at)
            .finish()
    }
}

/// Key-to-session map; at most one session per key
///
/// Uses a std lock because lookups happen inside synchronous channel
/// handlers.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionKey, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session under `key`
    pub fn register(
        &self,
        key: SessionKey,
        widget: Weak<dyn PanelWidget>,
        channel: Arc<dyn TransportChannel>,
    ) -> Result<Arc<Session>, SessionError> {
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if sessions.contains_key(&key) {
            return Err(SessionError::DuplicateKey(key.to_string()));
        }

        let session = Arc::new(Session::new(key.clone(), widget, channel));
        sessions.insert(key, Arc::clone(&session));
        Ok(session)
    }

    pub fn lookup(&self, key: &SessionKey) -> Option<Arc<Session>> {
        self.read().get(key).cloned()
    }

    pub fn contains(&self, key: &SessionKey) -> bool {
        self.read().contains_key(key)
    }

    /// Remove a session; removing an absent key is a no-op
    pub fn remove(&self, key: &SessionKey) -> Option<Arc<Session>> {
        self.sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(key)
    }

    /// Keys of all live sessions, sorted
    pub fn keys(&self) -> Vec<SessionKey> {
        let mut keys: Vec<SessionKey> = self.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<SessionKey, Arc<Session>>> {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
