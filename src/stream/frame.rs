// src/stream/frame.rs - Incremental parser for `data: ` event-stream frames
//
// Chunks arrive with arbitrary byte boundaries, including splits inside a
// multi-byte UTF-8 character. Bytes are buffered until a newline completes a
// line; the trailing fragment is carried into the next `feed`.

use serde::Deserialize;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// One structured delta parsed from the upstream stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    ContentDelta(String),
    ReasoningDelta(String),
    Done,
}

#[derive(Deserialize)]
struct Frame {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

#[derive(Debug, Default)]
pub struct FrameParser {
    carry: Vec<u8>,
    done: bool,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once `[DONE]` was seen or `finish` ran. Later input is ignored.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Consume one raw chunk and return the events of every line it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }
        self.carry.extend_from_slice(chunk);

        let Some(last_newline) = self.carry.iter().rposition(|b| *b == b'\n') else {
            return events;
        };
        let complete: Vec<u8> = self.carry.drain(..=last_newline).collect();

        for raw in complete.split(|b| *b == b'\n') {
            if self.done {
                break;
            }
            let line = String::from_utf8_lossy(raw);
            self.process_line(&line, &mut events);
        }
        if self.done {
            self.carry.clear();
        }
        events
    }

    /// The transport ended gracefully: parse any leftover line, then emit `Done`.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }
        let leftover = std::mem::take(&mut self.carry);
        if !leftover.is_empty() {
            let line = String::from_utf8_lossy(&leftover);
            self.process_line(&line, &mut events);
        }
        if !self.done {
            self.done = true;
            events.push(StreamEvent::Done);
        }
        events
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<StreamEvent>) {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.trim().is_empty() {
            return;
        }
        let Some(data) = line.strip_prefix(DATA_PREFIX) else {
            return;
        };
        if data.trim() == DONE_SENTINEL {
            self.done = true;
            events.push(StreamEvent::Done);
            return;
        }

        let frame: Frame = match serde_json::from_str(data) {
            Ok(f) => f,
            Err(e) => {
                tracing::debug!("Skipping malformed stream frame: {e}");
                return;
            }
        };
        let Some(delta) = frame.choices.into_iter().next().and_then(|c| c.delta) else {
            return;
        };

        if let Some(reasoning) = delta.reasoning_content.filter(|s| !s.is_empty()) {
            events.push(StreamEvent::ReasoningDelta(reasoning));
        }
        if let Some(content) = delta.content.filter(|s| !s.is_empty()) {
            events.push(StreamEvent::ContentDelta(content));
        }
    }
}

/// Parse a complete body in one go. Convenience for tests and benchmarks.
pub fn parse_all(body: &[u8]) -> Vec<StreamEvent> {
    let mut parser = FrameParser::new();
    let mut events = parser.feed(body);
    events.extend(parser.finish());
    events
}
