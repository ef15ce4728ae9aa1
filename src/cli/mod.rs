// src/cli/mod.rs - CLI definition (clap derive)

pub mod ask;
pub mod bridge;
pub mod chat;
pub mod sessions;
pub mod terminal;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::chat::prompts::PromptKind;
use crate::chat::store::{SessionStore, StoreLimits};
use crate::core::ChatOrchestrator;
use crate::infra::config::Config;
use crate::infra::paths;
use crate::stream::HttpTransport;
use crate::surface::ChatSurface;

#[derive(Parser)]
#[command(name = "noveler", about = "Novel-writing assistant with streaming AI chat", version)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Default log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Interactive chat in the terminal
    Chat,
    /// JSON-lines bridge for an editor webview (stdin in, stdout out)
    Bridge,
    /// Run one editor AI command against a document
    Ask {
        /// randomName, wordReplace, continueWriting or characterDesign
        command: PromptKind,
        /// Document to read (stdin when omitted)
        #[arg(long)]
        file: Option<PathBuf>,
        /// Zero-based cursor line, picks the paragraph
        #[arg(long, default_value_t = 0)]
        line: usize,
        /// Selection as LINE:CHAR..LINE:CHAR (zero-based)
        #[arg(long)]
        selection: Option<String>,
    },
    /// Inspect, export or import stored chat sessions
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },
}

#[derive(Subcommand, Clone)]
pub enum SessionsAction {
    /// List sessions, most recent first
    List,
    /// Write every session as JSON
    Export {
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Merge sessions from an export file; existing ids are skipped
    Import { file: PathBuf },
}

pub fn store_limits(config: &Config) -> StoreLimits {
    StoreLimits {
        max_messages_per_session: config.chat.max_messages_per_session,
        max_context_messages: config.chat.max_context_messages,
    }
}

/// Orchestrator wired to the real HTTP transport and the on-disk session file.
pub fn build_orchestrator(
    config: Config,
    config_path: PathBuf,
    surface: Arc<dyn ChatSurface>,
) -> anyhow::Result<ChatOrchestrator> {
    let transport = HttpTransport::new(Duration::from_secs(config.request.connect_timeout_secs))?;
    let sessions_path = paths::sessions_file_path();
    let store = SessionStore::load_or_default(&sessions_path, store_limits(&config))?;

    Ok(
        ChatOrchestrator::new(config, store, Arc::new(transport), surface)
            .with_config_path(config_path)
            .with_sessions_path(sessions_path),
    )
}
