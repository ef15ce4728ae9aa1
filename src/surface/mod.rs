// src/surface/mod.rs - Message contracts between the chat UI and the orchestrator
//
// Both directions are closed tagged unions discriminated by `type`.
// Inbound messages are validated here, before dispatch.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::chat::{ChatMessage, ChatSession, Role};
use crate::infra::config::{AiConfig, AiConfigUpdate};
use crate::infra::errors::NovelerError;

/// UI → orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InboundMessage {
    GetConfig,
    SaveConfig { config: AiConfigUpdate },
    Message { message: ChatMessage },
    Clear,
    NewSession,
    Stop,
}

impl InboundMessage {
    /// Parse and validate one raw message.
    pub fn parse(raw: &str) -> Result<Self, NovelerError> {
        let msg: InboundMessage = serde_json::from_str(raw)
            .map_err(|e| NovelerError::InvalidMessage(e.to_string()))?;
        msg.validate()
    }

    pub fn validate(self) -> Result<Self, NovelerError> {
        if let InboundMessage::Message { message } = &self {
            if message.role != Role::User {
                return Err(NovelerError::InvalidMessage(format!(
                    "chat messages from the UI must have role 'user', got '{}'",
                    message.role.as_str()
                )));
            }
            if message.content.trim().is_empty() {
                return Err(NovelerError::InvalidMessage("empty chat message".into()));
            }
            if message.id.is_empty() {
                return Err(NovelerError::InvalidMessage("chat message without id".into()));
            }
        }
        Ok(self)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::GetConfig => "getConfig",
            InboundMessage::SaveConfig { .. } => "saveConfig",
            InboundMessage::Message { .. } => "message",
            InboundMessage::Clear => "clear",
            InboundMessage::NewSession => "newSession",
            InboundMessage::Stop => "stop",
        }
    }
}

/// Session header sent with `sessionChanged`; messages travel alongside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub title: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<&ChatSession> for SessionInfo {
    fn from(s: &ChatSession) -> Self {
        Self {
            id: s.id.clone(),
            title: s.title.clone(),
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

/// Orchestrator → UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    #[serde(rename = "message")]
    Message { message: ChatMessage },

    /// Cumulative content of the in-flight reply.
    #[serde(rename = "stream", rename_all = "camelCase")]
    Stream {
        message_id: String,
        content: String,
        reasoning_content: String,
        is_complete: bool,
    },

    /// Terminal failure of a turn; `message` is the stored assistant error.
    #[serde(rename = "error", rename_all = "camelCase")]
    Error {
        message_id: String,
        message: ChatMessage,
    },

    #[serde(rename = "config")]
    Config { config: AiConfig },

    #[serde(rename = "cleared")]
    Cleared,

    #[serde(rename = "sessionChanged")]
    SessionChanged {
        session: SessionInfo,
        messages: Vec<ChatMessage>,
    },

    #[serde(rename = "theme-update", rename_all = "camelCase")]
    ThemeUpdate { theme_kind: Theme },
}

impl OutboundMessage {
    pub fn session_changed(session: &ChatSession) -> Self {
        OutboundMessage::SessionChanged {
            session: SessionInfo::from(session),
            messages: session.messages.clone(),
        }
    }

    /// Completed stream update or error event.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OutboundMessage::Stream {
                is_complete: true,
                ..
            } | OutboundMessage::Error { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

/// Host editor color theme kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ColorThemeKind {
    Light,
    Dark,
    HighContrast,
    HighContrastLight,
}

impl From<ColorThemeKind> for Theme {
    fn from(kind: ColorThemeKind) -> Self {
        match kind {
            ColorThemeKind::Dark | ColorThemeKind::HighContrast => Theme::Dark,
            ColorThemeKind::Light | ColorThemeKind::HighContrastLight => Theme::Light,
        }
    }
}

/// Sink for outbound messages. Posting never fails from the caller's view.
pub trait ChatSurface: Send + Sync {
    fn post(&self, message: OutboundMessage);
}

impl<F> ChatSurface for F
where
    F: Fn(OutboundMessage) + Send + Sync,
{
    fn post(&self, message: OutboundMessage) {
        self(message)
    }
}

/// Surface backed by an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSurface {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl ChannelSurface {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ChatSurface for ChannelSurface {
    fn post(&self, message: OutboundMessage) {
        if self.tx.send(message).is_err() {
            tracing::debug!("Chat surface closed, dropping outbound message");
        }
    }
}
