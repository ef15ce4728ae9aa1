// src/stream/assembler.rs - Turns transport events into UI updates and a stored reply
//
// Every content or reasoning delta produces a `stream` update carrying the
// cumulative text. A turn ends exactly once, either as a completed reply
// (final update with `isComplete: true`, then the reply is stored) or as an
// error (a synthetic assistant message is stored and an `error` is posted).

use crate::chat::store::SessionStore;
use crate::chat::{generate_id, ChatMessage};
use crate::surface::{ChatSurface, OutboundMessage};

use super::frame::{FrameParser, StreamEvent};
use super::transport::TransportEvent;

/// Accumulated state of the in-flight reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamState {
    pub message_id: String,
    /// Session the turn was started from; the reply lands here even if the
    /// user switched sessions meanwhile.
    pub session_id: String,
    pub accumulated_content: String,
    pub accumulated_reasoning: String,
    pub is_complete: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Completed(ChatMessage),
    Errored(ChatMessage),
}

impl TurnOutcome {
    pub fn message(&self) -> &ChatMessage {
        match self {
            TurnOutcome::Completed(m) | TurnOutcome::Errored(m) => m,
        }
    }
}

/// Text stored and shown when a turn fails.
pub fn failure_text(detail: &str) -> String {
    format!(
        "Error calling the AI API: {detail}\n\nPlease check that your API configuration is correct."
    )
}

/// Store a failure for `session_id` and tell the surface. Also used for
/// turns that fail before any stream was opened.
pub fn report_failure(
    message_id: &str,
    session_id: &str,
    detail: &str,
    store: &mut SessionStore,
    surface: &dyn ChatSurface,
) -> ChatMessage {
    let mut message = ChatMessage::assistant(failure_text(detail));
    message.id = message_id.to_string();
    if store.append_message_to(session_id, message.clone()).is_none() {
        tracing::warn!(session = %session_id, "Session vanished before the error could be stored");
    }
    surface.post(OutboundMessage::Error {
        message_id: message_id.to_string(),
        message: message.clone(),
    });
    message
}

#[derive(Debug)]
pub struct ResponseAssembler {
    state: StreamState,
    parser: FrameParser,
}

impl ResponseAssembler {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self::with_message_id(generate_id(), session_id)
    }

    pub fn with_message_id(message_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            state: StreamState {
                message_id: message_id.into(),
                session_id: session_id.into(),
                accumulated_content: String::new(),
                accumulated_reasoning: String::new(),
                is_complete: false,
            },
            parser: FrameParser::new(),
        }
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    pub fn message_id(&self) -> &str {
        &self.state.message_id
    }

    pub fn session_id(&self) -> &str {
        &self.state.session_id
    }

    pub fn is_complete(&self) -> bool {
        self.state.is_complete
    }

    /// Feed one transport event. Returns the outcome once the turn ends;
    /// anything after that is ignored.
    pub fn handle(
        &mut self,
        event: TransportEvent,
        store: &mut SessionStore,
        surface: &dyn ChatSurface,
    ) -> Option<TurnOutcome> {
        if self.state.is_complete {
            return None;
        }
        let events = match event {
            TransportEvent::Chunk(bytes) => self.parser.feed(&bytes),
            TransportEvent::End => self.parser.finish(),
            TransportEvent::Error(detail) => return Some(self.fail(&detail, store, surface)),
        };
        for event in events {
            if let Some(outcome) = self.apply(event, store, surface) {
                return Some(outcome);
            }
        }
        None
    }

    fn apply(
        &mut self,
        event: StreamEvent,
        store: &mut SessionStore,
        surface: &dyn ChatSurface,
    ) -> Option<TurnOutcome> {
        match event {
            StreamEvent::ContentDelta(text) => {
                self.state.accumulated_content.push_str(&text);
                self.post_update(surface);
                None
            }
            StreamEvent::ReasoningDelta(text) => {
                self.state.accumulated_reasoning.push_str(&text);
                self.post_update(surface);
                None
            }
            StreamEvent::Done => Some(self.complete(store, surface)),
        }
    }

    fn post_update(&self, surface: &dyn ChatSurface) {
        surface.post(OutboundMessage::Stream {
            message_id: self.state.message_id.clone(),
            content: self.state.accumulated_content.clone(),
            reasoning_content: self.state.accumulated_reasoning.clone(),
            is_complete: self.state.is_complete,
        });
    }

    fn complete(&mut self, store: &mut SessionStore, surface: &dyn ChatSurface) -> TurnOutcome {
        self.state.is_complete = true;
        self.post_update(surface);

        let mut message = ChatMessage::assistant(self.state.accumulated_content.clone());
        message.id = self.state.message_id.clone();
        if !self.state.accumulated_reasoning.is_empty() {
            message.reasoning_content = Some(self.state.accumulated_reasoning.clone());
        }
        if store
            .append_message_to(&self.state.session_id, message.clone())
            .is_none()
        {
            tracing::warn!(
                session = %self.state.session_id,
                "Session vanished before the reply could be stored"
            );
        }
        tracing::debug!(
            message_id = %self.state.message_id,
            chars = self.state.accumulated_content.chars().count(),
            "Reply complete"
        );
        TurnOutcome::Completed(message)
    }

    fn fail(
        &mut self,
        detail: &str,
        store: &mut SessionStore,
        surface: &dyn ChatSurface,
    ) -> TurnOutcome {
        self.state.is_complete = true;
        tracing::warn!(message_id = %self.state.message_id, "Chat turn failed: {detail}");
        let message = report_failure(
            &self.state.message_id,
            &self.state.session_id,
            detail,
            store,
            surface,
        );
        TurnOutcome::Errored(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Role;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<OutboundMessage>>);

    impl ChatSurface for Recorder {
        fn post(&self, message: OutboundMessage) {
            self.0.lock().unwrap().push(message);
        }
    }

    impl Recorder {
        fn take(&self) -> Vec<OutboundMessage> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    fn frame(content: &str) -> TransportEvent {
        let line = format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        );
        TransportEvent::Chunk(line.into_bytes())
    }

    fn setup() -> (SessionStore, String, Recorder) {
        let mut store = SessionStore::new();
        let sid = store.current().id.clone();
        (store, sid, Recorder::default())
    }

    #[test]
    fn test_cumulative_updates_then_completion() {
        let (mut store, sid, surface) = setup();
        let mut asm = ResponseAssembler::with_message_id("m1", sid.clone());

        assert!(asm.handle(frame("Once"), &mut store, &surface).is_none());
        assert!(asm.handle(frame(" upon"), &mut store, &surface).is_none());
        let outcome = asm
            .handle(TransportEvent::Chunk(b"data: [DONE]\n".to_vec()), &mut store, &surface)
            .unwrap();

        let posted = surface.take();
        let contents: Vec<(String, bool)> = posted
            .iter()
            .map(|m| match m {
                OutboundMessage::Stream {
                    content,
                    is_complete,
                    ..
                } => (content.clone(), *is_complete),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(
            contents,
            vec![
                ("Once".to_string(), false),
                ("Once upon".to_string(), false),
                ("Once upon".to_string(), true),
            ]
        );

        let stored = &store.get(&sid).unwrap().messages;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, "m1");
        assert_eq!(stored[0].role, Role::Assistant);
        assert_eq!(stored[0].content, "Once upon");
        assert_eq!(stored[0].reasoning_content, None);
        assert_eq!(outcome, TurnOutcome::Completed(stored[0].clone()));
    }

    #[test]
    fn test_end_without_done_completes() {
        let (mut store, sid, surface) = setup();
        let mut asm = ResponseAssembler::new(sid.clone());
        asm.handle(frame("partial"), &mut store, &surface);
        let outcome = asm.handle(TransportEvent::End, &mut store, &surface);
        assert!(matches!(outcome, Some(TurnOutcome::Completed(_))));
        assert_eq!(store.get(&sid).unwrap().messages[0].content, "partial");
    }

    #[test]
    fn test_reasoning_is_kept_on_reply() {
        let (mut store, sid, surface) = setup();
        let mut asm = ResponseAssembler::new(sid.clone());
        let chunk = b"data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"hmm\"}}]}\n".to_vec();
        asm.handle(TransportEvent::Chunk(chunk), &mut store, &surface);
        asm.handle(frame("Answer"), &mut store, &surface);
        asm.handle(TransportEvent::End, &mut store, &surface);

        let reply = &store.get(&sid).unwrap().messages[0];
        assert_eq!(reply.reasoning_content.as_deref(), Some("hmm"));
        assert_eq!(asm.state().accumulated_reasoning, "hmm");
    }

    #[test]
    fn test_error_stores_synthetic_reply() {
        let (mut store, sid, surface) = setup();
        let mut asm = ResponseAssembler::with_message_id("m9", sid.clone());
        asm.handle(frame("half"), &mut store, &surface);
        surface.take();

        let outcome = asm
            .handle(TransportEvent::Error("connection reset".into()), &mut store, &surface)
            .unwrap();
        let TurnOutcome::Errored(message) = outcome else {
            panic!("expected error outcome");
        };
        assert!(message.content.starts_with("Error calling the AI API: connection reset"));

        let posted = surface.take();
        assert_eq!(posted.len(), 1);
        assert!(matches!(&posted[0], OutboundMessage::Error { message_id, .. } if message_id == "m9"));
        assert_eq!(store.get(&sid).unwrap().messages, vec![message]);
    }

    #[test]
    fn test_events_after_terminal_are_ignored() {
        let (mut store, sid, surface) = setup();
        let mut asm = ResponseAssembler::new(sid.clone());
        asm.handle(TransportEvent::End, &mut store, &surface);
        surface.take();

        assert!(asm.handle(frame("late"), &mut store, &surface).is_none());
        assert!(asm
            .handle(TransportEvent::Error("late".into()), &mut store, &surface)
            .is_none());
        assert!(surface.take().is_empty());
        assert_eq!(store.get(&sid).unwrap().messages.len(), 1);
    }

    #[test]
    fn test_reply_follows_originating_session() {
        let (mut store, sid, surface) = setup();
        let mut asm = ResponseAssembler::new(sid.clone());
        asm.handle(frame("for the first"), &mut store, &surface);

        let other = store.create_session(None).id.clone();
        asm.handle(TransportEvent::End, &mut store, &surface);

        assert_eq!(store.get(&sid).unwrap().messages.len(), 1);
        assert!(store.get(&other).unwrap().messages.is_empty());
    }
}
