//! Prompt assembly and response shaping for the text assistant.
//!
//! The assistant itself is an outbound port; nothing here checks what it
//! says beyond turning the reply into a string or a list of strings.

use serde_json::Value;
use std::fmt::Write as _;

use crate::domain::models::{Demand, FileRef, Phase};
use crate::domain::ports::outbound::{Assistant, AttachmentStore, TextExtractor};
use crate::domain::DemandError;

/// Longest extract passed on per attachment, in characters.
pub const MAX_EXTRACT_CHARS: usize = 10_000;

/// Text pulled out of an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extract {
    pub name: String,
    pub text: String,
}

/// Assistant output ready to be stored in a phase field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedContent {
    Text(String),
    List(Vec<String>),
}

impl GeneratedContent {
    /// Shape a raw reply. List replies with no recognizable items are kept
    /// as text.
    pub fn from_reply(reply: &str, as_list: bool) -> Self {
        if as_list {
            let items = parse_list(reply);
            if !items.is_empty() {
                return Self::List(items);
            }
        }
        Self::Text(reply.trim().to_string())
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Text(text) => Value::String(text),
            Self::List(items) => Value::Array(items.into_iter().map(Value::String).collect()),
        }
    }
}

/// Assemble a prompt from everything entered so far, the focus phase first.
pub fn build_prompt(
    demand: &Demand,
    focus: Phase,
    instruction: &str,
    extracts: &[Extract],
) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "You are helping to prepare an IT demand.");
    let _ = writeln!(prompt, "Demand: {}", demand.id);
    if let Some(title) = demand.title() {
        let _ = writeln!(prompt, "Title: {title}");
    }
    let _ = writeln!(prompt, "Status: {}", demand.status);

    let order = std::iter::once(focus).chain(Phase::ALL.into_iter().filter(|p| *p != focus));
    for phase in order {
        let data = demand.phases.get(phase);
        if !data.has_content() {
            continue;
        }
        let _ = writeln!(prompt, "\n## {}", phase.title());
        for (field, value) in data.occupied_fields() {
            let _ = writeln!(prompt, "- {}: {}", field_label(field), inline(value));
        }
    }

    for extract in extracts {
        let _ = writeln!(prompt, "\n## Attachment: {}", extract.name);
        let _ = writeln!(prompt, "{}", truncate(&extract.text, MAX_EXTRACT_CHARS));
    }

    let _ = writeln!(prompt, "\n## Task ({} phase)", focus.title());
    let _ = write!(prompt, "{}", instruction.trim());
    prompt
}

/// Split a reply into items: numbered (`1.` / `1)`), bulleted (`-`, `*`,
/// `•`) or plain lines. Blank lines and markdown headings are skipped.
pub fn parse_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(strip_marker)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_marker(line: &str) -> &str {
    for bullet in ["- ", "* ", "• "] {
        if let Some(rest) = line.strip_prefix(bullet) {
            return rest.trim();
        }
    }
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return rest.trim();
        }
    }
    line
}

/// Ask the assistant and shape the reply.
pub fn generate<A: Assistant>(
    assistant: &A,
    demand: &Demand,
    focus: Phase,
    instruction: &str,
    extracts: &[Extract],
    as_list: bool,
) -> Result<GeneratedContent, DemandError> {
    let prompt = build_prompt(demand, focus, instruction, extracts);
    let reply = assistant.complete(&prompt)?;
    if reply.trim().is_empty() {
        return Err(DemandError::validation("assistant returned an empty reply"));
    }
    Ok(GeneratedContent::from_reply(&reply, as_list))
}

/// Extract text from every file attached to `phase`. Files that cannot be
/// read or extracted are skipped with a warning.
pub fn extract_attachments<S, X>(
    store: &S,
    extractor: &X,
    demand: &Demand,
    phase: Phase,
) -> Vec<Extract>
where
    S: AttachmentStore,
    X: TextExtractor,
{
    let Some(attachments) = demand.attachments_for(phase) else {
        return Vec::new();
    };
    attachments
        .files
        .iter()
        .filter_map(|file| match extract_one(store, extractor, file) {
            Ok(text) => Some(Extract {
                name: file.name.clone(),
                text,
            }),
            Err(e) => {
                tracing::warn!(demand = %demand.id, file = %file.name, "skipping attachment: {e}");
                None
            }
        })
        .collect()
}

fn extract_one<S: AttachmentStore, X: TextExtractor>(
    store: &S,
    extractor: &X,
    file: &FileRef,
) -> Result<String, DemandError> {
    let bytes = store.get(file)?;
    extractor.extract(&file.name, &bytes)
}

fn field_label(field: &str) -> String {
    let mut label = field.replace('_', " ");
    if let Some(first) = label.get(..1) {
        let upper = first.to_uppercase();
        label.replace_range(..1, &upper);
    }
    label
}

fn inline(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items.iter().map(inline).collect::<Vec<_>>().join("; "),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{k}={}", inline(v)))
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}\n... (truncated at {max_chars} characters)", &text[..cut]),
        None => text.to_string(),
    }
}

/// Plain UTF-8 extractor for text-like uploads.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, filename: &str, bytes: &[u8]) -> Result<String, DemandError> {
        let extension = filename.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
        match extension.as_deref() {
            Some("txt" | "md" | "csv" | "json" | "yaml" | "yml" | "log") => {
                Ok(String::from_utf8_lossy(bytes).into_owned())
            }
            _ => Err(DemandError::validation(format!("cannot read text from {filename}"))),
        }
    }
}
