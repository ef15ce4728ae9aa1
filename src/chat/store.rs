// src/chat/store.rs - Multi-session chat history
//
// Owns every ChatSession plus a "current" pointer. Once any session exists,
// the pointer always resolves; delete repairs it before returning.
// Retention evicts the oldest non-system messages past the per-session cap
// and never touches system messages.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use super::{now_ms, ChatMessage, ChatSession, Role};
use crate::infra::errors::NovelerError;
use crate::infra::fs::write_private;

pub const DEFAULT_SESSION_TITLE: &str = "Default chat";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreLimits {
    pub max_messages_per_session: usize,
    pub max_context_messages: usize,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            max_messages_per_session: 100,
            max_context_messages: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStats {
    pub message_count: usize,
    pub user_message_count: usize,
    pub assistant_message_count: usize,
    pub last_activity: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub session_id: String,
    pub message: ChatMessage,
}

/// One session as exchanged by `export_session` / `import_session`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionExport {
    pub session: ChatSession,
    pub messages: Vec<ChatMessage>,
}

/// Persisted layout: `{sessions: [ChatSession], currentSessionId}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsSnapshot {
    pub sessions: Vec<ChatSession>,
    #[serde(default)]
    pub current_session_id: Option<String>,
}

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<String, ChatSession>,
    current: Option<String>,
    limits: StoreLimits,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: StoreLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    /// Make sure a default session exists and the current pointer resolves.
    pub fn initialize(&mut self) {
        if self.sessions.is_empty() {
            self.create_session(Some(DEFAULT_SESSION_TITLE));
        } else if self.current_id().is_none() {
            self.current = self.most_recent_id();
        }
    }

    pub fn limits(&self) -> StoreLimits {
        self.limits
    }

    pub fn set_limits(&mut self, limits: StoreLimits) {
        self.limits = limits;
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ChatSession> {
        self.sessions.get(id)
    }

    /// The current session id, if it resolves to a stored session.
    pub fn current_id(&self) -> Option<&str> {
        self.current
            .as_deref()
            .filter(|id| self.sessions.contains_key(*id))
    }

    /// Create a session and make it current.
    pub fn create_session(&mut self, title: Option<&str>) -> &ChatSession {
        let title = match title {
            Some(t) if !t.trim().is_empty() => t.to_string(),
            _ => format!("Chat {}", self.sessions.len() + 1),
        };
        let session = ChatSession::new(title);
        let id = session.id.clone();
        tracing::debug!(session = %id, title = %session.title, "Created chat session");
        self.sessions.insert(id.clone(), session);
        self.current = Some(id.clone());
        &self.sessions[&id]
    }

    /// The current session; creates a default one when there is none.
    pub fn current(&mut self) -> &ChatSession {
        let id = self.ensure_current();
        &self.sessions[&id]
    }

    fn ensure_current(&mut self) -> String {
        if let Some(id) = &self.current {
            if self.sessions.contains_key(id) {
                return id.clone();
            }
        }
        self.create_session(None).id.clone()
    }

    /// All sessions, most recently updated first.
    pub fn list_sessions(&self) -> Vec<&ChatSession> {
        let mut all: Vec<&ChatSession> = self.sessions.values().collect();
        all.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| b.id.cmp(&a.id))
        });
        all
    }

    fn most_recent_id(&self) -> Option<String> {
        self.list_sessions().first().map(|s| s.id.clone())
    }

    pub fn switch_to(&mut self, id: &str) -> bool {
        if self.sessions.contains_key(id) {
            self.current = Some(id.to_string());
            true
        } else {
            false
        }
    }

    pub fn delete_session(&mut self, id: &str) -> bool {
        if self.sessions.remove(id).is_none() {
            return false;
        }
        if self.current.as_deref() == Some(id) {
            self.current = self.most_recent_id();
        }
        tracing::debug!(session = %id, "Deleted chat session");
        true
    }

    /// Append to the current session, then apply retention.
    pub fn append_message(&mut self, message: ChatMessage) -> &ChatSession {
        let id = self.ensure_current();
        self.push_with_retention(&id, message);
        &self.sessions[&id]
    }

    /// Append to a specific session. `None` when the session no longer exists.
    pub fn append_message_to(
        &mut self,
        session_id: &str,
        message: ChatMessage,
    ) -> Option<&ChatSession> {
        if !self.sessions.contains_key(session_id) {
            return None;
        }
        self.push_with_retention(session_id, message);
        self.sessions.get(session_id)
    }

    fn push_with_retention(&mut self, session_id: &str, message: ChatMessage) {
        let cap = self.limits.max_messages_per_session;
        if let Some(session) = self.sessions.get_mut(session_id) {
            session.messages.push(message);
            session.touch();
            let evicted = enforce_retention(&mut session.messages, cap);
            if evicted > 0 {
                tracing::debug!(session = %session_id, evicted, "Evicted old messages");
            }
        }
    }

    /// Drop every non-system message from the current session.
    pub fn clear_current(&mut self) {
        let id = self.ensure_current();
        if let Some(session) = self.sessions.get_mut(&id) {
            session.messages.retain(ChatMessage::is_system);
            session.touch();
        }
    }

    pub fn update_session_title(&mut self, id: &str, title: &str) -> bool {
        match self.sessions.get_mut(id) {
            Some(session) => {
                session.title = title.to_string();
                session.touch();
                true
            }
            None => false,
        }
    }

    pub fn delete_message(&mut self, session_id: &str, message_id: &str) -> bool {
        let Some(session) = self.sessions.get_mut(session_id) else {
            return false;
        };
        match session.messages.iter().position(|m| m.id == message_id) {
            Some(index) => {
                session.messages.remove(index);
                session.touch();
                true
            }
            None => false,
        }
    }

    pub fn update_message(&mut self, session_id: &str, message_id: &str, content: &str) -> bool {
        let Some(session) = self.sessions.get_mut(session_id) else {
            return false;
        };
        match session.messages.iter_mut().find(|m| m.id == message_id) {
            Some(message) => {
                message.content = content.to_string();
                session.touch();
                true
            }
            None => false,
        }
    }

    /// Case-insensitive substring search over message content.
    pub fn search_messages(&self, query: &str, session_id: Option<&str>) -> Vec<SearchHit> {
        let needle = query.to_lowercase();
        let sessions: Vec<&ChatSession> = match session_id {
            Some(id) => self.sessions.get(id).into_iter().collect(),
            None => self.list_sessions(),
        };

        sessions
            .into_iter()
            .flat_map(|session| {
                session
                    .messages
                    .iter()
                    .filter(|m| m.content.to_lowercase().contains(&needle))
                    .map(|m| SearchHit {
                        session_id: session.id.clone(),
                        message: m.clone(),
                    })
            })
            .collect()
    }

    pub fn session_stats(&self, session_id: &str) -> Option<SessionStats> {
        let session = self.sessions.get(session_id)?;
        let count = |role: Role| session.messages.iter().filter(|m| m.role == role).count();
        Some(SessionStats {
            message_count: session.messages.len(),
            user_message_count: count(Role::User),
            assistant_message_count: count(Role::Assistant),
            last_activity: session.updated_at,
        })
    }

    pub fn export_session(&self, id: &str) -> Option<SessionExport> {
        let session = self.sessions.get(id)?;
        Some(SessionExport {
            session: session.clone(),
            messages: session.messages.clone(),
        })
    }

    /// Import one session. Refuses ids that already exist.
    pub fn import_session(&mut self, data: SessionExport) -> bool {
        if self.sessions.contains_key(&data.session.id) {
            return false;
        }
        let mut session = data.session;
        session.messages = data.messages;
        session.updated_at = now_ms();
        self.sessions.insert(session.id.clone(), session);
        true
    }

    pub fn export_all(&self) -> SessionsSnapshot {
        SessionsSnapshot {
            sessions: self.list_sessions().into_iter().cloned().collect(),
            current_session_id: self.current_id().map(str::to_string),
        }
    }

    /// Replace the whole store. Timestamps and message order are kept as-is.
    pub fn import_all(&mut self, snapshot: SessionsSnapshot) {
        self.sessions.clear();
        self.current = None;

        let first = snapshot.sessions.first().map(|s| s.id.clone());
        for session in snapshot.sessions {
            self.sessions.insert(session.id.clone(), session);
        }

        self.current = snapshot
            .current_session_id
            .filter(|id| self.sessions.contains_key(id))
            .or(first);
    }

    /// Load a snapshot and trim every session to the current cap.
    pub fn load_from(path: &Path, limits: StoreLimits) -> Result<Self, NovelerError> {
        let content = std::fs::read_to_string(path)?;
        let snapshot: SessionsSnapshot = serde_json::from_str(&content)?;
        let mut store = Self::with_limits(limits);
        store.import_all(snapshot);

        let cap = store.limits.max_messages_per_session;
        let mut trimmed = 0;
        for session in store.sessions.values_mut() {
            trimmed += enforce_retention(&mut session.messages, cap);
        }
        if trimmed > 0 {
            tracing::info!(evicted = trimmed, cap, "Trimmed loaded sessions to the retention cap");
        }
        tracing::info!(sessions = store.len(), path = %path.display(), "Loaded chat sessions");
        Ok(store)
    }

    /// Load when the file exists, otherwise start empty. Always initialized.
    pub fn load_or_default(path: &Path, limits: StoreLimits) -> Result<Self, NovelerError> {
        let mut store = if path.exists() {
            Self::load_from(path, limits)?
        } else {
            Self::with_limits(limits)
        };
        store.initialize();
        Ok(store)
    }

    pub async fn save_to(&self, path: &Path) -> Result<(), NovelerError> {
        self.export_all().save_to(path).await
    }
}

impl SessionsSnapshot {
    /// Owner-only atomic write as pretty JSON.
    pub async fn save_to(&self, path: &Path) -> Result<(), NovelerError> {
        let json = serde_json::to_string_pretty(self)?;
        write_private(path, json.as_bytes()).await?;
        tracing::debug!(sessions = self.sessions.len(), path = %path.display(), "Saved chat sessions");
        Ok(())
    }
}

/// Evict the oldest non-system messages until `messages.len() <= cap`
/// or no non-system message is left. Returns the eviction count.
pub fn enforce_retention(messages: &mut Vec<ChatMessage>, cap: usize) -> usize {
    if messages.len() <= cap {
        return 0;
    }
    let excess = messages.len() - cap;
    let evictable = messages.iter().filter(|m| !m.is_system()).count();
    let mut remaining = excess.min(evictable);
    let evicted = remaining;

    messages.retain(|m| {
        if remaining > 0 && !m.is_system() {
            remaining -= 1;
            false
        } else {
            true
        }
    });
    evicted
}
