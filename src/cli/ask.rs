// src/cli/ask.rs - One-shot editor AI command

use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::AsyncReadExt;

use super::terminal::TerminalSurface;
use crate::chat::prompts::{Position, PromptContext, PromptKind, Selection};
use crate::core::{HostEvent, TurnState};
use crate::infra::config::Config;

pub struct AskArgs {
    pub command: PromptKind,
    pub file: Option<PathBuf>,
    pub line: usize,
    pub selection: Option<String>,
}

pub async fn run_ask(config: Config, config_path: PathBuf, args: AskArgs) -> anyhow::Result<()> {
    let text = match &args.file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            buf
        }
    };
    let selection = args.selection.as_deref().map(parse_selection).transpose()?;
    let context = PromptContext::from_document(&text, selection, args.line);

    let mut orch =
        super::build_orchestrator(config, config_path, Arc::new(TerminalSurface::quiet()))?;
    orch.handle_host(HostEvent::RunPrompt {
        kind: args.command,
        context,
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            orch.stop();
        }
        _ = orch.run_to_completion() => {}
    }
    orch.flush().await;

    match orch.last_outcome() {
        Some(TurnState::Errored) => anyhow::bail!("the {} command failed", args.command),
        Some(TurnState::Cancelled) => anyhow::bail!("cancelled"),
        _ => Ok(()),
    }
}

/// Parse `LINE:CHAR..LINE:CHAR` (zero-based).
pub fn parse_selection(s: &str) -> anyhow::Result<Selection> {
    let (start, end) = s
        .split_once("..")
        .with_context(|| format!("selection '{s}' must look like LINE:CHAR..LINE:CHAR"))?;
    Ok(Selection::new(parse_position(start)?, parse_position(end)?))
}

fn parse_position(s: &str) -> anyhow::Result<Position> {
    let (line, character) = s
        .trim()
        .split_once(':')
        .with_context(|| format!("position '{s}' must look like LINE:CHAR"))?;
    Ok(Position::new(
        line.trim().parse().with_context(|| format!("bad line in '{s}'"))?,
        character
            .trim()
            .parse()
            .with_context(|| format!("bad character in '{s}'"))?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_selection() {
        let sel = parse_selection("2:4..3:0").unwrap();
        assert_eq!(sel.start, Position::new(2, 4));
        assert_eq!(sel.end, Position::new(3, 0));
    }

    #[test]
    fn test_parse_selection_reversed_and_spaced() {
        let sel = parse_selection(" 5:1 .. 1:0").unwrap();
        assert_eq!(sel.start, Position::new(1, 0));
    }

    #[test]
    fn test_parse_selection_rejects_garbage() {
        assert!(parse_selection("2:4").is_err());
        assert!(parse_selection("a:b..c:d").is_err());
        assert!(parse_selection("1..2").is_err());
    }
}
