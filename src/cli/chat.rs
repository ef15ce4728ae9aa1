// src/cli/chat.rs - Interactive REPL

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use super::terminal::TerminalSurface;
use crate::chat::ChatMessage;
use crate::core::ChatOrchestrator;
use crate::infra::config::Config;
use crate::util::preview;

enum Flow {
    Continue,
    Quit,
}

/// Run the interactive chat REPL.
pub async fn run_chat(config: Config, config_path: PathBuf) -> anyhow::Result<()> {
    let mut orch = super::build_orchestrator(config, config_path, Arc::new(TerminalSurface::new()))?;

    let title = orch.store_mut().current().title.clone();
    eprintln!(
        "noveler v{} | session: {} | /help for commands\n",
        env!("CARGO_PKG_VERSION"),
        title
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        let Some(input) = lines.next_line().await? else {
            break;
        };
        let trimmed = input.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == "quit" || trimmed == "exit" {
            break;
        }
        if trimmed.starts_with('/') {
            match handle_slash_command(trimmed, &mut orch) {
                Flow::Continue => continue,
                Flow::Quit => break,
            }
        }

        orch.submit(ChatMessage::user(trimmed));
        while orch.is_streaming() {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    orch.stop();
                    eprintln!("\n[stopped]");
                }
                _ = orch.pump() => {}
            }
        }
    }

    orch.flush().await;
    Ok(())
}

fn handle_slash_command(input: &str, orch: &mut ChatOrchestrator) -> Flow {
    let mut parts = input.splitn(2, char::is_whitespace);
    let cmd = parts.next().unwrap_or_default();
    let arg = parts.next().map(str::trim).unwrap_or_default();

    match cmd {
        "/quit" | "/exit" => return Flow::Quit,
        "/new" => orch.new_session(),
        "/clear" => orch.clear(),
        "/sessions" => print_sessions(orch),
        "/switch" => {
            if arg.is_empty() {
                eprintln!("usage: /switch <session id>");
            } else if let Err(e) = orch.switch_session(arg) {
                eprintln!("{e}. See /sessions.");
            }
        }
        "/help" => {
            eprintln!("  /new            start a new session");
            eprintln!("  /clear          clear the current session");
            eprintln!("  /sessions       list sessions");
            eprintln!("  /switch <id>    switch to a session");
            eprintln!("  /quit           exit");
            eprintln!("  Ctrl-C          stop the reply being streamed");
        }
        other => eprintln!("Unknown command: {other}. Try /help."),
    }
    Flow::Continue
}

fn print_sessions(orch: &ChatOrchestrator) {
    let store = orch.store();
    let current = store.current_id();
    for session in store.list_sessions() {
        let marker = if Some(session.id.as_str()) == current {
            "*"
        } else {
            " "
        };
        let last = session
            .messages
            .last()
            .map(|m| preview(&m.content, 40))
            .unwrap_or_default();
        eprintln!(
            "{marker} {}  {:<20}  {:>3} msgs  {last}",
            session.id,
            preview(&session.title, 20),
            session.messages.len()
        );
    }
}
