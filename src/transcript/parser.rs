//! Parsing of recorded sessions into transcripts
//!
//! Two layouts are understood: Claude Code session logs (one JSON record per
//! line) and conversation exports (one JSON document with `chat_messages`).
//! A malformed record is skipped and recorded as a warning; only a source
//! with no usable record at all is a parse error.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::sanitizer::{clean_tool_pollution, describe_tool_call, describe_tool_result};
use crate::context::models::{Message, ParseWarning, Role, Transcript};
use crate::context::token_estimator::TokenEstimator;
use crate::error::{ContextError, Result};
use crate::metrics::METRICS;

type Turn = (Role, Option<DateTime<Utc>>, String);

/// Turns raw session bytes into a [`Transcript`], memoizing token counts
#[derive(Clone)]
pub struct TranscriptParser {
    estimator: Arc<dyn TokenEstimator>,
}

impl TranscriptParser {
    pub fn new(estimator: Arc<dyn TokenEstimator>) -> Self {
        Self { estimator }
    }

    pub fn estimator(&self) -> &Arc<dyn TokenEstimator> {
        &self.estimator
    }

    pub fn parse_bytes(&self, id: &str, bytes: &[u8]) -> Result<Transcript> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ContextError::parse(id, format!("not valid UTF-8: {e}")))?;
        self.parse_str(id, text)
    }

    pub fn parse_str(&self, id: &str, text: &str) -> Result<Transcript> {
        let (turns, warnings) = match parse_export_document(text) {
            Some(result) => result,
            None => parse_jsonl(id, text)?,
        };

        if !warnings.is_empty() {
            METRICS
                .transcript_skipped_records
                .inc_by(warnings.len() as f64);
            for warning in &warnings {
                warn!(
                    "Skipped record {} of transcript {}: {}",
                    warning.line, id, warning.reason
                );
            }
        }

        let messages: Vec<Message> = turns
            .into_iter()
            .enumerate()
            .map(|(index, (role, timestamp, text))| {
                Message::new(index, role, timestamp, text, self.estimator.as_ref())
            })
            .collect();

        debug!(
            "Parsed transcript {}: {} messages, {} warnings",
            id,
            messages.len(),
            warnings.len()
        );

        Ok(Transcript::assemble(
            id.to_string(),
            messages,
            warnings,
            self.estimator.name(),
        ))
    }
}

fn parse_jsonl(id: &str, text: &str) -> Result<(Vec<Turn>, Vec<ParseWarning>)> {
    let mut turns = Vec::new();
    let mut warnings = Vec::new();
    let mut non_blank = 0usize;
    let mut valid_records = 0usize;

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        non_blank += 1;

        let record: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                warnings.push(ParseWarning {
                    line: line_no + 1,
                    reason: format!("invalid JSON: {e}"),
                });
                continue;
            }
        };

        match record_to_turn(&record) {
            Ok(Some(turn)) => {
                valid_records += 1;
                turns.push(turn);
            }
            Ok(None) => valid_records += 1,
            Err(reason) => warnings.push(ParseWarning {
                line: line_no + 1,
                reason,
            }),
        }
    }

    if non_blank > 0 && valid_records == 0 {
        return Err(ContextError::parse(
            id,
            format!("none of {non_blank} records could be read"),
        ));
    }

    Ok((turns, warnings))
}

pub(crate) fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    value
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|ts| ts.with_timezone(&Utc))
}

/// Convert one session log record; `Ok(None)` for non-conversational records
pub(crate) fn record_to_turn(record: &Value) -> std::result::Result<Option<Turn>, String> {
    let object = record
        .as_object()
        .ok_or_else(|| "record is not a JSON object".to_string())?;
    let timestamp = parse_timestamp(object.get("timestamp"));
    let kind = object.get("type").and_then(Value::as_str);

    if kind == Some("summary") {
        let summary = object
            .get("summary")
            .and_then(Value::as_str)
            .ok_or_else(|| "summary record without text".to_string())?;
        return Ok(Some((Role::System, timestamp, summary.to_string())));
    }

    let conversational = matches!(kind, Some("user" | "assistant" | "system" | "human"));
    let message = match object.get("message") {
        Some(message) => message,
        None if kind == Some("system") => record,
        None if conversational => return Err("missing message body".to_string()),
        None => return Ok(None),
    };
    if !conversational && kind.is_some() {
        return Ok(None);
    }

    let message = message
        .as_object()
        .ok_or_else(|| "message body is not an object".to_string())?;
    let role = message
        .get("role")
        .and_then(Value::as_str)
        .or(kind)
        .and_then(Role::parse)
        .ok_or_else(|| "unknown message role".to_string())?;
    let content = message
        .get("content")
        .ok_or_else(|| "message without content".to_string())?;
    let text = flatten_content(content).ok_or_else(|| "unsupported content type".to_string())?;

    let role = if role == Role::User && is_tool_result_only(content) {
        Role::Tool
    } else {
        role
    };

    Ok(Some((role, timestamp, text)))
}

fn is_tool_result_only(content: &Value) -> bool {
    match content.as_array() {
        Some(blocks) if !blocks.is_empty() => blocks
            .iter()
            .all(|b| b.get("type").and_then(Value::as_str) == Some("tool_result")),
        _ => false,
    }
}

/// Flatten message content (a string or a list of typed blocks) to text
pub fn flatten_content(content: &Value) -> Option<String> {
    match content {
        Value::String(text) => Some(clean_tool_pollution(text)),
        Value::Null => Some(String::new()),
        Value::Array(blocks) => {
            let parts: Vec<String> = blocks.iter().filter_map(flatten_block).collect();
            Some(parts.join("\n"))
        }
        _ => None,
    }
}

fn flatten_block(block: &Value) -> Option<String> {
    if let Value::String(text) = block {
        return Some(clean_tool_pollution(text));
    }
    let field = |key: &str| block.get(key).and_then(Value::as_str).unwrap_or_default();

    match block.get("type").and_then(Value::as_str)? {
        "text" => Some(field("text"))
            .filter(|t| !t.is_empty())
            .map(clean_tool_pollution),
        "thinking" => Some(field("thinking"))
            .filter(|t| !t.is_empty())
            .map(|t| format!("[Thinking] {t}")),
        "tool_use" => Some(describe_tool_call(
            block.get("name").and_then(Value::as_str).unwrap_or("unknown"),
            block.get("input").unwrap_or(&Value::Null),
        )),
        "tool_result" => Some(describe_tool_result(
            block.get("content").unwrap_or(&Value::Null),
        )),
        "image" => Some("[Image]".to_string()),
        _ => None,
    }
}

/// Parse a conversation export; `None` when `text` is not one
fn parse_export_document(text: &str) -> Option<(Vec<Turn>, Vec<ParseWarning>)> {
    if !text.trim_start().starts_with('{') {
        return None;
    }
    let document: Value = serde_json::from_str(text).ok()?;
    let entries = document.get("chat_messages")?.as_array()?;

    let mut turns = Vec::new();
    let mut warnings = Vec::new();
    for (position, entry) in entries.iter().enumerate() {
        let role = entry
            .get("sender")
            .or_else(|| entry.get("role"))
            .and_then(Value::as_str)
            .and_then(Role::parse);
        // Empty text is still a message; only an unreadable body is skipped
        let body = match (entry.get("text"), entry.get("content")) {
            (Some(Value::String(text)), _) if !text.is_empty() => Some(text.clone()),
            (_, Some(content)) => flatten_content(content),
            (Some(text), None) => flatten_content(text),
            (None, None) => Some(String::new()),
        };

        match (role, body) {
            (Some(role), Some(body)) => {
                turns.push((role, parse_timestamp(entry.get("created_at")), body));
            }
            (None, _) => warnings.push(ParseWarning {
                line: position + 1,
                reason: "entry without a known sender".to_string(),
            }),
            (_, None) => warnings.push(ParseWarning {
                line: position + 1,
                reason: "entry body is neither text nor content blocks".to_string(),
            }),
        }
    }
    Some((turns, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::token_estimator::WordBasedEstimator;
    use crate::error::ErrorKind;

    fn parser() -> TranscriptParser {
        TranscriptParser::new(Arc::new(WordBasedEstimator::default()))
    }

    const SESSION: &str = r#"{"type":"summary","summary":"Refactoring the parser","leafUuid":"x"}
{"type":"user","message":{"role":"user","content":"Please fix src/main.rs"},"timestamp":"2025-01-02T03:04:05Z"}
{"type":"assistant","message":{"role":"assistant","content":[{"type":"thinking","thinking":"look first"},{"type":"text","text":"Reading it now."},{"type":"tool_use","name":"Read","input":{"file_path":"src/main.rs"}}]}}
{"type":"user","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"t1","content":"fn main() {}"}]}}
not json at all
{"type":"file-history-snapshot","snapshot":{}}
{"type":"user","message":{"role":"user","content":""}}
{"type":"assistant"}
"#;

    #[test]
    fn test_parses_session_log() {
        let transcript = parser().parse_str("s1", SESSION).unwrap();
        let messages = transcript.messages();

        assert_eq!(messages.len(), 5);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].raw_text, "Refactoring the parser");
        assert_eq!(messages[1].role, Role::User);
        assert!(messages[1].timestamp.is_some());
        assert_eq!(
            messages[2].raw_text,
            "[Thinking] look first\nReading it now.\n[Read file: src/main.rs]"
        );
        assert_eq!(messages[3].role, Role::Tool);
        assert_eq!(messages[3].raw_text, "[Result: fn main() {}]");
        assert_eq!(messages[4].raw_text, "");
        assert_eq!(messages[4].token_count, 0);

        let lines: Vec<usize> = transcript.warnings().iter().map(|w| w.line).collect();
        assert_eq!(lines, vec![5, 8]);
        assert_eq!(transcript.estimator_name(), "words");
    }

    #[test]
    fn test_unreadable_source_is_parse_error() {
        let err = parser().parse_str("bad", "garbage\nmore garbage\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);

        let err = parser().parse_bytes("bin", &[0xff, 0xfe, 0xfd]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_empty_source_is_empty_transcript() {
        let transcript = parser().parse_str("empty", "\n\n").unwrap();
        assert!(transcript.is_empty());
    }

    #[test]
    fn test_export_keeps_empty_entries() {
        let document = r#"{"chat_messages": [
            {"sender": "human", "text": "hello there"},
            {"sender": "assistant", "text": ""},
            {"sender": "human", "text": "bye"},
            {"sender": "assistant"},
            {"sender": "human", "text": 42}
        ]}"#;
        let transcript = parser().parse_str("export", document).unwrap();
        assert_eq!(transcript.len(), 4);
        assert_eq!(transcript.messages()[1].raw_text, "");
        assert_eq!(transcript.messages()[1].token_count, 0);
        assert_eq!(transcript.messages()[2].raw_text, "bye");
        assert_eq!(transcript.messages()[2].index, 2);
        assert_eq!(transcript.messages()[3].raw_text, "");

        let lines: Vec<usize> = transcript.warnings().iter().map(|w| w.line).collect();
        assert_eq!(lines, vec![5]);
    }

    #[test]
    fn test_tool_json_in_text_is_cleaned() {
        let line = serde_json::json!({
            "type": "assistant",
            "message": {
                "role": "assistant",
                "content": [{"type": "text", "text": "Running it. [Tool: Bash] {\"command\": \"ls -la\"}"}]
            }
        });
        let transcript = parser().parse_str("legacy", &line.to_string()).unwrap();
        assert_eq!(transcript.messages()[0].raw_text, "Running it. [Executed command]");
    }

    #[test]
    fn test_parses_export_document() {
        let document = r#"{
            "name": "Test Conversation",
            "chat_messages": [
                {"sender": "human", "text": "Hello, Claude!", "created_at": "2024-01-01T00:00:00Z"},
                {"sender": "assistant", "text": "Hello! How can I help you today?"},
                {"sender": "robot", "text": "???"}
            ]
        }"#;
        let transcript = parser().parse_str("export", document).unwrap();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.messages()[0].role, Role::User);
        assert_eq!(transcript.messages()[1].role, Role::Assistant);
        assert_eq!(transcript.warnings().len(), 1);
    }
}
