use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::messages::Message;

const PREVIEW_CHARS: usize = 80;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("unknown session `{0}`")]
    UnknownSession(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConversationSession {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub transcript: Vec<Message>,
}

/// Identity of a resolved session, returned by `get_or_create` so callers
/// learn both the id and the creation time in one call.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionHandle {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SessionSummary {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub message_count: usize,
    pub last_message_preview: Option<String>,
}

/// Process-lifetime registry of chat sessions. State lives only in memory;
/// a restart starts empty. The single write lock serializes appends within a
/// session while reads and distinct sessions proceed concurrently.
#[derive(Default)]
pub struct ConversationStore {
    sessions: RwLock<HashMap<String, ConversationSession>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the given id when it is known; otherwise allocates a fresh
    /// session with an empty transcript.
    pub async fn get_or_create(&self, session_id: Option<&str>) -> SessionHandle {
        let mut sessions = self.sessions.write().await;

        if let Some(id) = session_id {
            if let Some(session) = sessions.get(id) {
                return SessionHandle {
                    session_id: session.session_id.clone(),
                    created_at: session.created_at,
                };
            }
        }

        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();
        sessions.insert(
            id.clone(),
            ConversationSession {
                session_id: id.clone(),
                created_at,
                transcript: Vec::new(),
            },
        );
        tracing::debug!(event_name = "session.created", session_id = %id, "session created");
        SessionHandle { session_id: id, created_at }
    }

    pub async fn get(&self, session_id: &str) -> Result<Vec<Message>, StoreError> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .map(|session| session.transcript.clone())
            .ok_or_else(|| StoreError::UnknownSession(session_id.to_string()))
    }

    pub async fn session(&self, session_id: &str) -> Result<ConversationSession, StoreError> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| StoreError::UnknownSession(session_id.to_string()))
    }

    /// Extends the transcript all-or-nothing: either every message in the
    /// batch becomes visible or none does.
    pub async fn append(
        &self,
        session_id: &str,
        messages: Vec<Message>,
    ) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::UnknownSession(session_id.to_string()))?;
        session.transcript.extend(messages);
        Ok(())
    }

    /// Removal is idempotent-failing: deleting an absent id errors instead of
    /// silently succeeding, so a double delete reports `UnknownSession`.
    pub async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        sessions
            .remove(session_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::UnknownSession(session_id.to_string()))
    }

    pub async fn list(&self) -> Vec<SessionSummary> {
        let sessions = self.sessions.read().await;
        let mut summaries = sessions
            .values()
            .map(|session| SessionSummary {
                session_id: session.session_id.clone(),
                created_at: session.created_at,
                message_count: session.transcript.len(),
                last_message_preview: session.transcript.last().map(preview),
            })
            .collect::<Vec<_>>();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        summaries
    }
}

fn preview(message: &Message) -> String {
    let content = message.content();
    if content.chars().count() <= PREVIEW_CHARS {
        content.to_string()
    } else {
        let truncated = content.chars().take(PREVIEW_CHARS).collect::<String>();
        format!("{truncated}…")
    }
}
