//! Host-side chat history seam.
//!
//! The user-visible message history (titles, rendered transcripts) belongs
//! to the embedding host, not to the graph. The orchestrator writes user
//! and assistant messages through this trait; everything else about the
//! store is the host's business. [`InMemoryHistory`] serves tests and
//! hosts that do not persist chat history themselves.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// One user-visible chat session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    /// Thread id, shared with the graph.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// One stored chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRecord {
    /// `"user"` or `"assistant"`.
    pub role: String,
    /// Message text.
    pub content: String,
    /// When the message was stored.
    pub created_at: DateTime<Utc>,
}

impl ChatRecord {
    /// Create a user record stamped now.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_owned(),
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// Create an assistant record stamped now.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_owned(),
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Host-side chat history operations.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Create a session. Creating an existing id is an error.
    async fn create(&self, thread_id: &str, title: &str) -> Result<ChatSession>;

    /// List sessions, most recently updated first.
    async fn list(&self) -> Result<Vec<ChatSession>>;

    /// Load a session's messages in insertion order.
    async fn load(&self, thread_id: &str) -> Result<Vec<ChatRecord>>;

    /// Append a message, creating the session implicitly if needed.
    async fn append(&self, thread_id: &str, record: ChatRecord) -> Result<()>;

    /// Rename a session.
    async fn update_title(&self, thread_id: &str, title: &str) -> Result<()>;

    /// Delete a session and its messages.
    async fn delete(&self, thread_id: &str) -> Result<()>;
}

#[derive(Debug, Default)]
struct SessionData {
    session: Option<ChatSession>,
    records: Vec<ChatRecord>,
}

/// History store keeping everything in process memory.
#[derive(Debug, Default)]
pub struct InMemoryHistory {
    sessions: Mutex<HashMap<String, SessionData>>,
}

impl InMemoryHistory {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, SessionData>>> {
        self.sessions
            .lock()
            .map_err(|e| EngineError::internal(format!("history lock poisoned: {e}")))
    }

    fn new_session(thread_id: &str, title: &str) -> ChatSession {
        let now = Utc::now();
        ChatSession {
            id: thread_id.to_owned(),
            title: title.to_owned(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistory {
    async fn create(&self, thread_id: &str, title: &str) -> Result<ChatSession> {
        let mut sessions = self.lock()?;
        let data = sessions.entry(thread_id.to_owned()).or_default();
        if data.session.is_some() {
            return Err(EngineError::internal(format!(
                "session '{thread_id}' already exists"
            )));
        }
        let session = Self::new_session(thread_id, title);
        data.session = Some(session.clone());
        Ok(session)
    }

    async fn list(&self) -> Result<Vec<ChatSession>> {
        let sessions = self.lock()?;
        let mut all: Vec<ChatSession> = sessions
            .values()
            .filter_map(|d| d.session.clone())
            .collect();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(all)
    }

    async fn load(&self, thread_id: &str) -> Result<Vec<ChatRecord>> {
        let sessions = self.lock()?;
        Ok(sessions
            .get(thread_id)
            .map(|d| d.records.clone())
            .unwrap_or_default())
    }

    async fn append(&self, thread_id: &str, record: ChatRecord) -> Result<()> {
        let mut sessions = self.lock()?;
        let data = sessions.entry(thread_id.to_owned()).or_default();
        if data.session.is_none() {
            data.session = Some(Self::new_session(thread_id, "New chat"));
        }
        if let Some(session) = &mut data.session {
            session.updated_at = Utc::now();
        }
        data.records.push(record);
        Ok(())
    }

    async fn update_title(&self, thread_id: &str, title: &str) -> Result<()> {
        let mut sessions = self.lock()?;
        let session = sessions
            .get_mut(thread_id)
            .and_then(|d| d.session.as_mut())
            .ok_or_else(|| EngineError::internal(format!("unknown session '{thread_id}'")))?;
        session.title = title.to_owned();
        session.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, thread_id: &str) -> Result<()> {
        self.lock()?.remove(thread_id);
        Ok(())
    }
}
