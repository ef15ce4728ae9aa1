// src/chat/context.rs - Bounded context window for upstream requests
//
// A read-only view over a session: every system message plus the most recent
// `cap` non-system messages. Stored history is never touched.

use serde::{Deserialize, Serialize};

use super::{ChatSession, Role};

/// `{role, content}` pair as submitted upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: Role,
    pub content: String,
}

impl ContextMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Build the message list for one request.
///
/// System messages come first, in their stored order, followed by the last
/// `cap` conversation messages. When the session has no system message,
/// `default_system_prompt` is prepended instead.
pub fn build_context(
    session: &ChatSession,
    cap: usize,
    default_system_prompt: &str,
) -> Vec<ContextMessage> {
    let mut system: Vec<ContextMessage> = session
        .messages
        .iter()
        .filter(|m| m.is_system())
        .map(|m| ContextMessage::new(m.role, m.content.clone()))
        .collect();

    let conversation: Vec<_> = session.messages.iter().filter(|m| !m.is_system()).collect();
    let skip = conversation.len().saturating_sub(cap);

    if system.is_empty() {
        system.push(ContextMessage::new(Role::System, default_system_prompt));
    }

    system.extend(
        conversation
            .into_iter()
            .skip(skip)
            .map(|m| ContextMessage::new(m.role, m.content.clone())),
    );
    system
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatMessage;

    fn session_with(messages: Vec<ChatMessage>) -> ChatSession {
        let mut s = ChatSession::new("t");
        s.messages = messages;
        s
    }

    #[test]
    fn test_injects_default_system_prompt() {
        let s = session_with(vec![ChatMessage::user("hello")]);
        let ctx = build_context(&s, 20, "be helpful");
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx[0], ContextMessage::new(Role::System, "be helpful"));
        assert_eq!(ctx[1], ContextMessage::new(Role::User, "hello"));
    }

    #[test]
    fn test_keeps_existing_system_messages_first() {
        let s = session_with(vec![
            ChatMessage::user("u1"),
            ChatMessage::system("rules"),
            ChatMessage::assistant("a1"),
        ]);
        let ctx = build_context(&s, 20, "unused");
        let contents: Vec<&str> = ctx.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["rules", "u1", "a1"]);
    }

    #[test]
    fn test_cap_keeps_most_recent() {
        let messages = (0..30)
            .map(|i| ChatMessage::user(format!("m{i}")))
            .collect();
        let s = session_with(messages);
        let ctx = build_context(&s, 20, "sys");
        assert_eq!(ctx.len(), 21);
        assert_eq!(ctx[1].content, "m10");
        assert_eq!(ctx[20].content, "m29");
        assert_eq!(s.messages.len(), 30);
    }

    #[test]
    fn test_empty_session_yields_only_system() {
        let s = session_with(vec![]);
        let ctx = build_context(&s, 20, "sys");
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn test_zero_cap_sends_system_only() {
        let s = session_with(vec![ChatMessage::system("s"), ChatMessage::user("u")]);
        let ctx = build_context(&s, 0, "x");
        assert_eq!(ctx, vec![ContextMessage::new(Role::System, "s")]);
    }
}
