// src/core/orchestrator.rs - Chat turn state machine
//
// One loop owns the session store and at most one in-flight turn. Inbound
// UI messages, host events and transport events are all handled on that
// loop, so store mutations never race.
//
//   Idle -> Requesting -> Streaming -> Completed | Errored | Cancelled -> Idle
//
// A turn that fails before a stream is open goes Requesting -> Errored.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::persist::{PersistJob, Persister};
use super::request::{build_request, resolve_target};
use crate::chat::context::build_context;
use crate::chat::prompts::{render_prompt, PromptContext, PromptKind};
use crate::chat::store::{SessionStore, StoreLimits};
use crate::chat::{generate_id, ChatMessage};
use crate::infra::config::{AiConfigUpdate, Config};
use crate::infra::errors::NovelerError;
use crate::stream::assembler::report_failure;
use crate::stream::{ChatTransport, ResponseAssembler, StreamHandle, TransportEvent, TurnOutcome};
use crate::surface::{ChatSurface, ColorThemeKind, InboundMessage, OutboundMessage, Theme};

/// Title for sessions opened from the UI or by a prompt command.
pub const NEW_SESSION_TITLE: &str = "New chat";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Requesting,
    Streaming,
    Completed,
    Errored,
    Cancelled,
}

/// Events raised by the host editor rather than the chat UI.
#[derive(Debug, Clone)]
pub enum HostEvent {
    ThemeChanged(ColorThemeKind),
    RunPrompt {
        kind: PromptKind,
        context: PromptContext,
    },
}

#[derive(Debug, Clone)]
pub enum SurfaceInput {
    Ui(InboundMessage),
    Host(HostEvent),
}

struct ActiveTurn {
    handle: StreamHandle,
    assembler: ResponseAssembler,
}

pub struct ChatOrchestrator {
    config: Config,
    config_path: Option<PathBuf>,
    sessions_path: Option<PathBuf>,
    persister: Option<Persister>,
    store: SessionStore,
    transport: Arc<dyn ChatTransport>,
    surface: Arc<dyn ChatSurface>,
    active: Option<ActiveTurn>,
    state: TurnState,
    last_outcome: Option<TurnState>,
    theme: Theme,
}

impl ChatOrchestrator {
    pub fn new(
        config: Config,
        mut store: SessionStore,
        transport: Arc<dyn ChatTransport>,
        surface: Arc<dyn ChatSurface>,
    ) -> Self {
        store.set_limits(StoreLimits {
            max_messages_per_session: config.chat.max_messages_per_session,
            max_context_messages: config.chat.max_context_messages,
        });
        store.initialize();
        Self {
            config,
            config_path: None,
            sessions_path: None,
            persister: None,
            store,
            transport,
            surface,
            active: None,
            state: TurnState::Idle,
            last_outcome: None,
            theme: Theme::default(),
        }
    }

    /// Persist `saveConfig` updates to this file. Needs a tokio runtime.
    pub fn with_config_path(mut self, path: PathBuf) -> Self {
        self.config_path = Some(path);
        self.persister.get_or_insert_with(Persister::spawn);
        self
    }

    /// Save the session store here after every change. Needs a tokio runtime.
    pub fn with_sessions_path(mut self, path: PathBuf) -> Self {
        self.sessions_path = Some(path);
        self.persister.get_or_insert_with(Persister::spawn);
        self
    }

    /// Wait for pending config and session writes to reach disk.
    pub async fn flush(&self) {
        if let Some(persister) = &self.persister {
            persister.flush().await;
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SessionStore {
        &mut self.store
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// How the most recent turn ended.
    pub fn last_outcome(&self) -> Option<TurnState> {
        self.last_outcome
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn is_streaming(&self) -> bool {
        self.active.is_some()
    }

    /// Post the current session so a freshly attached UI can render it.
    pub fn announce(&mut self) {
        let msg = OutboundMessage::session_changed(self.store.current());
        self.surface.post(msg);
        self.surface.post(OutboundMessage::ThemeUpdate {
            theme_kind: self.theme,
        });
    }

    pub fn dispatch(&mut self, input: SurfaceInput) {
        match input {
            SurfaceInput::Ui(msg) => self.handle_inbound(msg),
            SurfaceInput::Host(event) => self.handle_host(event),
        }
    }

    pub fn handle_inbound(&mut self, msg: InboundMessage) {
        tracing::debug!(kind = msg.kind(), "Inbound message");
        match msg {
            InboundMessage::GetConfig => self.surface.post(OutboundMessage::Config {
                config: self.config.ai.clone(),
            }),
            InboundMessage::SaveConfig { config } => self.save_config(config),
            InboundMessage::Message { message } => self.submit(message),
            InboundMessage::Clear => self.clear(),
            InboundMessage::NewSession => self.new_session(),
            InboundMessage::Stop => {
                self.stop();
            }
        }
    }

    pub fn handle_host(&mut self, event: HostEvent) {
        match event {
            HostEvent::ThemeChanged(kind) => self.set_theme(kind.into()),
            HostEvent::RunPrompt { kind, context } => self.run_prompt(kind, &context),
        }
    }

    /// Store a user message and start a turn for it. A turn still in flight
    /// is cancelled first.
    pub fn submit(&mut self, message: ChatMessage) {
        self.cancel_active("superseded by a new message");
        let session_id = self.store.append_message(message).id.clone();
        self.start_turn(session_id);
    }

    fn start_turn(&mut self, session_id: String) {
        self.transition(TurnState::Requesting);
        let message_id = generate_id();

        let target = match resolve_target(&self.config.ai) {
            Ok(t) => t,
            Err(e) => return self.fail_before_stream(&message_id, &session_id, &e),
        };
        let Some(session) = self.store.get(&session_id) else {
            tracing::warn!(session = %session_id, "Session vanished before the request was sent");
            return self.finish_turn(TurnState::Cancelled);
        };
        let context = build_context(
            session,
            self.config.chat.max_context_messages,
            &self.config.chat.system_prompt,
        );
        let request = build_request(&target, &context, &self.config.request);

        tracing::info!(
            provider = %target.provider_id,
            model = %target.model,
            messages = context.len(),
            "Starting chat turn"
        );

        match self.transport.open(request) {
            Ok(handle) => {
                self.active = Some(ActiveTurn {
                    handle,
                    assembler: ResponseAssembler::with_message_id(message_id, session_id),
                });
                self.transition(TurnState::Streaming);
            }
            Err(e) => self.fail_before_stream(&message_id, &session_id, &e),
        }
    }

    fn fail_before_stream(&mut self, message_id: &str, session_id: &str, err: &NovelerError) {
        if err.is_user_visible() {
            tracing::warn!("Chat turn failed before streaming: {err}");
        } else {
            tracing::error!("Chat turn failed before streaming: {err}");
        }
        report_failure(
            message_id,
            session_id,
            &err.to_string(),
            &mut self.store,
            &*self.surface,
        );
        self.finish_turn(TurnState::Errored);
    }

    /// Cancel the in-flight turn. Nothing further is posted or stored for it.
    /// Returns false when there was nothing to stop.
    pub fn stop(&mut self) -> bool {
        self.cancel_active("stopped")
    }

    fn cancel_active(&mut self, reason: &str) -> bool {
        let Some(turn) = self.active.take() else {
            return false;
        };
        turn.handle.stop();
        tracing::info!(message_id = %turn.assembler.message_id(), reason, "Chat turn cancelled");
        self.finish_turn(TurnState::Cancelled);
        true
    }

    /// Feed one transport event to the active turn.
    pub fn on_transport_event(&mut self, event: Option<TransportEvent>) {
        let Some(turn) = self.active.as_mut() else {
            return;
        };
        let Some(event) = event else {
            self.active = None;
            return self.finish_turn(TurnState::Cancelled);
        };
        if let Some(outcome) = turn.assembler.handle(event, &mut self.store, &*self.surface) {
            self.active = None;
            let end = match outcome {
                TurnOutcome::Completed(_) => TurnState::Completed,
                TurnOutcome::Errored(_) => TurnState::Errored,
            };
            self.finish_turn(end);
        }
    }

    /// Wait for and handle one transport event. False when no turn is active.
    pub async fn pump(&mut self) -> bool {
        let Some(turn) = self.active.as_mut() else {
            return false;
        };
        let event = turn.handle.next().await;
        self.on_transport_event(event);
        true
    }

    /// Drive the active turn to its end.
    pub async fn run_to_completion(&mut self) {
        while self.pump().await {}
    }

    /// Main loop. Returns when `inbound` closes, after the turn in flight
    /// (if any) has ended and pending writes are flushed.
    pub async fn run(mut self, mut inbound: mpsc::Receiver<SurfaceInput>) -> Self {
        loop {
            tokio::select! {
                input = inbound.recv() => match input {
                    Some(input) => self.dispatch(input),
                    None => break,
                },
                event = next_event(&mut self.active), if self.active.is_some() => {
                    self.on_transport_event(event);
                }
            }
        }
        if self.is_streaming() {
            tracing::debug!("Input closed; finishing the active turn");
            self.run_to_completion().await;
        }
        self.flush().await;
        self
    }

    pub fn new_session(&mut self) {
        let msg = OutboundMessage::session_changed(self.store.create_session(Some(NEW_SESSION_TITLE)));
        self.surface.post(msg);
        self.persist_sessions();
    }

    /// Make another stored session current.
    pub fn switch_session(&mut self, id: &str) -> Result<(), NovelerError> {
        if !self.store.switch_to(id) {
            return Err(NovelerError::SessionNotFound(id.to_string()));
        }
        let msg = OutboundMessage::session_changed(self.store.current());
        self.surface.post(msg);
        self.persist_sessions();
        Ok(())
    }

    pub fn clear(&mut self) {
        self.store.clear_current();
        self.surface.post(OutboundMessage::Cleared);
        self.persist_sessions();
    }

    pub fn save_config(&mut self, update: AiConfigUpdate) {
        self.config.ai.apply(update);
        if let (Some(path), Some(persister)) = (&self.config_path, &self.persister) {
            persister.submit(PersistJob::Config {
                path: path.clone(),
                config: Box::new(self.config.clone()),
            });
        }
        self.surface.post(OutboundMessage::Config {
            config: self.config.ai.clone(),
        });
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
        self.surface.post(OutboundMessage::ThemeUpdate { theme_kind: theme });
    }

    /// Render an editor command's prompt and send it as a new conversation.
    pub fn run_prompt(&mut self, kind: PromptKind, context: &PromptContext) {
        self.cancel_active("superseded by a prompt command");
        let text = match render_prompt(&self.config.ai.prompts, kind, context) {
            Ok(t) => t,
            Err(e) => {
                let session_id = self.store.current().id.clone();
                self.transition(TurnState::Requesting);
                return self.fail_before_stream(&generate_id(), &session_id, &e);
            }
        };
        tracing::info!(command = %kind, "Running prompt command");

        self.new_session();
        let message = ChatMessage::user(text);
        self.surface.post(OutboundMessage::Message {
            message: message.clone(),
        });
        self.submit(message);
    }

    fn finish_turn(&mut self, end: TurnState) {
        self.last_outcome = Some(end);
        self.transition(end);
        self.transition(TurnState::Idle);
        self.persist_sessions();
    }

    fn transition(&mut self, to: TurnState) {
        if self.state != to {
            tracing::trace!(from = ?self.state, to = ?to, "Turn state");
            self.state = to;
        }
    }

    fn persist_sessions(&self) {
        if let (Some(path), Some(persister)) = (&self.sessions_path, &self.persister) {
            persister.submit(PersistJob::Sessions {
                path: path.clone(),
                snapshot: self.store.export_all(),
            });
        }
    }
}

async fn next_event(active: &mut Option<ActiveTurn>) -> Option<TransportEvent> {
    match active {
        Some(turn) => turn.handle.next().await,
        None => std::future::pending().await,
    }
}
