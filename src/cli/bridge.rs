// src/cli/bridge.rs - JSON-lines bridge between an editor webview host and the orchestrator
//
// stdin: one inbound message per line (UI messages, plus host events).
// stdout: one outbound message per line. Nothing else is written to stdout.

use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use super::ask::parse_selection;
use crate::chat::prompts::{PromptContext, PromptKind};
use crate::core::{HostEvent, SurfaceInput};
use crate::infra::config::Config;
use crate::surface::{ChannelSurface, ColorThemeKind, InboundMessage};

/// Host-side lines, distinguished from UI messages by their `type`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum HostLine {
    ThemeChanged {
        kind: ColorThemeKind,
    },
    RunPrompt {
        command: PromptKind,
        document: String,
        #[serde(default)]
        line: usize,
        #[serde(default)]
        selection: Option<String>,
    },
}

impl HostLine {
    fn into_event(self) -> anyhow::Result<HostEvent> {
        Ok(match self {
            HostLine::ThemeChanged { kind } => HostEvent::ThemeChanged(kind),
            HostLine::RunPrompt {
                command,
                document,
                line,
                selection,
            } => {
                let selection = selection.as_deref().map(parse_selection).transpose()?;
                HostEvent::RunPrompt {
                    kind: command,
                    context: PromptContext::from_document(&document, selection, line),
                }
            }
        })
    }
}

/// Decode one stdin line. `Ok(None)` for blank lines.
fn decode_line(line: &str) -> anyhow::Result<Option<SurfaceInput>> {
    if line.trim().is_empty() {
        return Ok(None);
    }
    if let Ok(host) = serde_json::from_str::<HostLine>(line) {
        return Ok(Some(SurfaceInput::Host(host.into_event()?)));
    }
    Ok(Some(SurfaceInput::Ui(InboundMessage::parse(line)?)))
}

pub async fn run_bridge(config: Config, config_path: PathBuf) -> anyhow::Result<()> {
    let (surface, mut outbound) = ChannelSurface::new();
    let mut orch = super::build_orchestrator(config, config_path, Arc::new(surface))?;
    orch.announce();

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(msg) = outbound.recv().await {
            let line = match serde_json::to_string(&msg) {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!("Failed to encode outbound message: {e}");
                    continue;
                }
            };
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        Ok::<(), std::io::Error>(())
    });

    let (tx, rx) = mpsc::channel(64);
    let runner = tokio::spawn(orch.run(rx));
    tracing::info!("Bridge ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match decode_line(&line) {
            Ok(Some(input)) => {
                if tx.send(input).await.is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Ignoring invalid bridge input: {e}"),
        }
    }

    // EOF: the turn in flight still runs to its end and is written out
    drop(tx);
    let orch = runner.await?;
    drop(orch);
    writer.await??;
    tracing::info!("Bridge closed");
    Ok(())
}
