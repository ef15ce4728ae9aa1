// src/chat/prompts.rs - Editor AI commands and prompt template rendering
//
// Templates may reference `${selectedText}`, `${selectedTextWithContext}`,
// `${contentText}` and `${paragraphText}`. Values are computed from a plain
// text document plus an optional selection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::infra::config::PromptsConfig;
use crate::infra::errors::NovelerError;

/// Characters of surrounding text kept on each side of a selection.
const SELECTION_CONTEXT_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PromptKind {
    RandomName,
    WordReplace,
    ContinueWriting,
    CharacterDesign,
}

impl PromptKind {
    pub const ALL: [PromptKind; 4] = [
        PromptKind::RandomName,
        PromptKind::WordReplace,
        PromptKind::ContinueWriting,
        PromptKind::CharacterDesign,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PromptKind::RandomName => "randomName",
            PromptKind::WordReplace => "wordReplace",
            PromptKind::ContinueWriting => "continueWriting",
            PromptKind::CharacterDesign => "characterDesign",
        }
    }
}

impl fmt::Display for PromptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptKind {
    type Err = NovelerError;

    /// Accepts the camelCase command id or its kebab-case spelling.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s.chars().filter(|c| *c != '-' && *c != '_').collect();
        PromptKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(&normalized))
            .ok_or_else(|| NovelerError::InvalidMessage(format!("unknown prompt command '{s}'")))
    }
}

/// Zero-based line / character position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    pub line: usize,
    pub character: usize,
}

impl Position {
    pub fn new(line: usize, character: usize) -> Self {
        Self { line, character }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub start: Position,
    pub end: Position,
}

impl Selection {
    pub fn new(start: Position, end: Position) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Placeholder values for one prompt invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptContext {
    pub selected_text: String,
    pub selected_text_with_context: String,
    pub content_text: String,
    pub paragraph_text: String,
}

impl PromptContext {
    /// Compute placeholder values from a document.
    ///
    /// `cursor_line` picks the paragraph when nothing is selected; with a
    /// selection the paragraph is taken around the selection end.
    pub fn from_document(text: &str, selection: Option<Selection>, cursor_line: usize) -> Self {
        let lines: Vec<&str> = text
            .split('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .collect();
        let selection = selection.filter(|s| !s.is_empty());

        let (selected_text, selected_text_with_context, cursor) = match selection {
            Some(sel) => (
                slice_range(&lines, sel.start, sel.end),
                with_context(&lines, sel),
                sel.end.line,
            ),
            None => (String::new(), String::new(), cursor_line),
        };

        Self {
            selected_text,
            selected_text_with_context,
            content_text: text.to_string(),
            paragraph_text: paragraph_at(&lines, cursor),
        }
    }

    pub fn has_selection(&self) -> bool {
        !self.selected_text.is_empty()
    }

    pub fn render(&self, template: &str) -> String {
        template
            .replace("${selectedTextWithContext}", &self.selected_text_with_context)
            .replace("${selectedText}", &self.selected_text)
            .replace("${contentText}", &self.content_text)
            .replace("${paragraphText}", &self.paragraph_text)
    }
}

/// Pick the template for `kind` and render it. An empty template is a
/// configuration error.
pub fn render_prompt(
    prompts: &PromptsConfig,
    kind: PromptKind,
    ctx: &PromptContext,
) -> Result<String, NovelerError> {
    let template = prompts.get(kind).map(|t| {
        if ctx.has_selection() {
            t.with_selection.as_str()
        } else {
            t.without_selection.as_str()
        }
    });

    match template {
        Some(t) if !t.trim().is_empty() => Ok(ctx.render(t)),
        _ => Err(NovelerError::Config(format!(
            "the '{kind}' prompt template is empty"
        ))),
    }
}

fn char_slice(line: &str, from: usize, to: usize) -> String {
    line.chars().skip(from).take(to.saturating_sub(from)).collect()
}

fn line_len(lines: &[&str], line: usize) -> usize {
    lines.get(line).map(|l| l.chars().count()).unwrap_or(0)
}

fn slice_range(lines: &[&str], start: Position, end: Position) -> String {
    if start.line == end.line {
        return char_slice(lines.get(start.line).copied().unwrap_or(""), start.character, end.character);
    }
    let mut out = String::new();
    for line_no in start.line..=end.line.min(lines.len().saturating_sub(1)) {
        let line = lines[line_no];
        let len = line.chars().count();
        let (from, to) = if line_no == start.line {
            (start.character, len)
        } else if line_no == end.line {
            (0, end.character)
        } else {
            (0, len)
        };
        if line_no != start.line {
            out.push('\n');
        }
        out.push_str(&char_slice(line, from, to));
    }
    out
}

fn with_context(lines: &[&str], sel: Selection) -> String {
    let from = sel.start.character.saturating_sub(SELECTION_CONTEXT_CHARS);
    let to = (sel.end.character + SELECTION_CONTEXT_CHARS).min(line_len(lines, sel.end.line));
    slice_range(lines, Position::new(sel.start.line, from), Position::new(sel.end.line, to))
}

/// The blank-line-delimited block containing `line`.
fn paragraph_at(lines: &[&str], line: usize) -> String {
    if lines.is_empty() || line >= lines.len() {
        return String::new();
    }
    let mut start = line;
    while start > 0 && !lines[start - 1].trim().is_empty() {
        start -= 1;
    }
    let mut end = line;
    while end + 1 < lines.len() && !lines[end + 1].trim().is_empty() {
        end += 1;
    }
    lines[start..=end].join("\n")
}
