//! In-memory conversation sessions.
//!
//! Keeps a rolling window of recent turns per client-supplied id so that
//! follow-up requests do not need to resend full history. Sessions are a
//! cache, not a system of record: they are never persisted and expire after
//! a period of inactivity.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use peopole_core::config::SessionConfig;
use peopole_core::types::{ChatMessage, Lang, Role, Stage};

// =============================================================================
// Session
// =============================================================================

/// Snapshot of one user's conversation window.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub last_active_at: DateTime<Utc>,
    pub stage: Stage,
    pub lang: Lang,
}

impl Session {
    fn new(id: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            messages: Vec::new(),
            last_active_at: now,
            stage: Stage::Unknown,
            lang: Lang::En,
        }
    }

    /// Whether this session is kept by the store.
    pub fn is_ephemeral(&self) -> bool {
        self.id.is_none()
    }

    pub fn user_message_count(&self) -> usize {
        self.messages.iter().filter(|m| m.role == Role::User).count()
    }
}

// =============================================================================
// SessionStore
// =============================================================================

/// Per-id session map with a bounded message window and idle expiry.
///
/// Concurrent requests on the same id are not ordered; the last write wins.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    max_messages: usize,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(max_messages: usize, ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_messages: max_messages.max(1),
            ttl,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            config.max_messages,
            Duration::minutes(i64::from(config.ttl_minutes)),
        )
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Return the session for `id`, creating it if needed.
    ///
    /// An absent or blank id yields a fresh ephemeral session that is not
    /// retained.
    pub fn get_or_create(&self, id: Option<&str>) -> Session {
        let now = Utc::now();
        let Some(id) = normalize_id(id) else {
            return Session::new(None, now);
        };

        let mut sessions = self.lock();
        let session = sessions.entry(id.to_string()).or_insert_with(|| {
            debug!(session_id = %id, "Session created");
            Session::new(Some(id.to_string()), now)
        });
        session.last_active_at = now;
        session.clone()
    }

    /// Append a turn, keeping only the most recent `max_messages`.
    ///
    /// No-op for an absent or blank id.
    pub fn append(&self, id: Option<&str>, role: Role, content: &str) {
        self.append_at(id, role, content, Utc::now());
    }

    fn append_at(&self, id: Option<&str>, role: Role, content: &str, now: DateTime<Utc>) {
        let Some(id) = normalize_id(id) else {
            return;
        };

        let mut sessions = self.lock();
        let session = sessions
            .entry(id.to_string())
            .or_insert_with(|| Session::new(Some(id.to_string()), now));
        session.messages.push(ChatMessage {
            role,
            content: content.to_string(),
        });
        if session.messages.len() > self.max_messages {
            let excess = session.messages.len() - self.max_messages;
            session.messages.drain(..excess);
        }
        session.last_active_at = now;
    }

    /// Record the stage and language the user most recently chose.
    pub fn set_profile(&self, id: Option<&str>, stage: Stage, lang: Lang) {
        let Some(id) = normalize_id(id) else {
            return;
        };
        if let Some(session) = self.lock().get_mut(id) {
            session.stage = stage;
            session.lang = lang;
            session.last_active_at = Utc::now();
        }
    }

    /// Drop sessions idle for longer than the TTL.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    /// Drop sessions whose last activity is older than `now - ttl`.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.ttl;
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, s| s.last_active_at >= cutoff);
        let removed = before - sessions.len();
        if removed > 0 {
            debug!(removed, remaining = sessions.len(), "Swept idle sessions");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

fn normalize_id(id: Option<&str>) -> Option<&str> {
    id.map(str::trim).filter(|id| !id.is_empty())
}
