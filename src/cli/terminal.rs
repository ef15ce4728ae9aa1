// src/cli/terminal.rs - Chat surface that renders outbound messages in a terminal
//
// Stream updates carry cumulative text, so only the unseen suffix is printed.
// Reply text goes to stdout; reasoning and status lines go to stderr.

use std::io::Write;
use std::sync::Mutex;

use crate::surface::{ChatSurface, OutboundMessage};

#[derive(Default)]
struct Cursor {
    message_id: String,
    content: usize,
    reasoning: usize,
}

#[derive(Default)]
pub struct TerminalSurface {
    cursor: Mutex<Cursor>,
    quiet: bool,
}

impl TerminalSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only reply text and errors; no status lines.
    pub fn quiet() -> Self {
        Self {
            quiet: true,
            ..Self::default()
        }
    }

    fn status(&self, line: &str) {
        if !self.quiet {
            eprintln!("{line}");
        }
    }
}

/// The part of `text` past `seen` bytes, or nothing if `seen` is not a boundary.
fn unseen(text: &str, seen: usize) -> &str {
    text.get(seen..).unwrap_or("")
}

impl ChatSurface for TerminalSurface {
    fn post(&self, message: OutboundMessage) {
        match message {
            OutboundMessage::Stream {
                message_id,
                content,
                reasoning_content,
                is_complete,
            } => {
                let Ok(mut cursor) = self.cursor.lock() else {
                    return;
                };
                if cursor.message_id != message_id {
                    *cursor = Cursor {
                        message_id,
                        ..Cursor::default()
                    };
                }
                let thinking = unseen(&reasoning_content, cursor.reasoning);
                if !thinking.is_empty() && !self.quiet {
                    eprint!("{thinking}");
                    let _ = std::io::stderr().flush();
                }
                cursor.reasoning = reasoning_content.len();

                let fresh = unseen(&content, cursor.content);
                if !fresh.is_empty() {
                    let mut out = std::io::stdout().lock();
                    let _ = out.write_all(fresh.as_bytes());
                    let _ = out.flush();
                }
                cursor.content = content.len();

                if is_complete {
                    println!();
                }
            }
            OutboundMessage::Error { message, .. } => {
                eprintln!("\n{}", message.content);
            }
            OutboundMessage::Message { message } => {
                self.status(&format!("> {}", crate::util::preview(&message.content, 120)));
            }
            OutboundMessage::SessionChanged { session, messages } => {
                self.status(&format!(
                    "[session] {} ({} messages)",
                    session.title,
                    messages.len()
                ));
            }
            OutboundMessage::Cleared => self.status("[cleared]"),
            OutboundMessage::Config { .. } | OutboundMessage::ThemeUpdate { .. } => {}
        }
    }
}
