//! Natural-language stand-ins for tool calls and tool results
//!
//! Raw tool payloads are JSON and often huge; summaries carry a one-line
//! description instead so the resumed assistant does not imitate the format.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

const MAX_COMMAND_CHARS: usize = 50;
const MAX_INLINE_RESULT_CHARS: usize = 100;

fn str_field<'a>(input: &'a Value, key: &str, fallback: &'a str) -> &'a str {
    input.get(key).and_then(Value::as_str).unwrap_or(fallback)
}

fn array_len(input: &Value, key: &str) -> usize {
    input.get(key).and_then(Value::as_array).map_or(0, Vec::len)
}

fn shorten(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars - 3).collect();
    format!("{kept}...")
}

/// `[Tool: Name] {json}` fragments left in message text by older exports
static TOOL_POLLUTION: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (
            r#"\[Tool:\s*Write\]\s*\{[^}]*"file_path"[^}]*"content"[^}]*\}"#,
            "[Created file]",
        ),
        (
            r#"\[Tool:\s*Edit\]\s*\{[^}]*"file_path"[^}]*"old_string"[^}]*\}"#,
            "[Edited file]",
        ),
        (r#"\[Tool:\s*Bash\]\s*\{[^}]*"command"[^}]*\}"#, "[Executed command]"),
        (r#"\[Tool:\s*Grep\]\s*\{[^}]*"pattern"[^}]*\}"#, "[Searched]"),
        (r#"\[Tool:\s*(\w+)\]\s*\{[^}]*"input"[^}]*\}"#, "[Used tool: ${1}]"),
        (
            r#"\[Tool:\s*(\w+)\]\s*\{"[^"]+"\s*:\s*"[^"]+"\}"#,
            "[Used tool: ${1}]",
        ),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).unwrap(), replacement))
    .collect()
});

/// Replace inline tool-call JSON with a short description. Other JSON in the
/// text is kept.
pub fn clean_tool_pollution(text: &str) -> String {
    if !text.contains("[Tool:") {
        return text.to_string();
    }
    TOOL_POLLUTION
        .iter()
        .fold(text.to_string(), |cleaned, (pattern, replacement)| {
            pattern.replace_all(&cleaned, *replacement).into_owned()
        })
}

/// Describe a tool invocation without its payload
pub fn describe_tool_call(name: &str, input: &Value) -> String {
    match name {
        "Write" => format!("[Created file: {}]", str_field(input, "file_path", "unknown")),
        "Edit" => format!("[Edited file: {}]", str_field(input, "file_path", "unknown")),
        "MultiEdit" => format!(
            "[Made {} edits to: {}]",
            array_len(input, "edits"),
            str_field(input, "file_path", "unknown")
        ),
        "Read" => {
            let path = str_field(input, "file_path", "unknown");
            let offset = input.get("offset").and_then(Value::as_u64);
            let limit = input.get("limit").and_then(Value::as_u64);
            match (offset, limit) {
                (Some(o), Some(l)) => format!("[Read file: {path} (lines {o}-{})]", o + l),
                (None, None) => format!("[Read file: {path}]"),
                _ => format!("[Read file: {path} (partial)]"),
            }
        }
        "Bash" => format!(
            "[Executed: {}]",
            shorten(str_field(input, "command", "unknown"), MAX_COMMAND_CHARS)
        ),
        "Grep" => format!(
            "[Searched for '{}' in {}]",
            str_field(input, "pattern", "unknown"),
            str_field(input, "path", ".")
        ),
        "Glob" => format!("[Found files matching: {}]", str_field(input, "pattern", "unknown")),
        "LS" => format!("[Listed directory: {}]", str_field(input, "path", ".")),
        "WebSearch" => format!("[Web search: {}]", str_field(input, "query", "unknown")),
        "WebFetch" => format!("[Fetched URL: {}]", str_field(input, "url", "unknown")),
        "TodoWrite" => format!("[Updated todo list: {} items]", array_len(input, "todos")),
        "Task" => format!(
            "[Launched agent: {}]",
            str_field(input, "description", "unknown task")
        ),
        "NotebookEdit" => format!(
            "[Edited notebook: {}]",
            str_field(input, "notebook_path", "unknown")
        ),
        "ExitPlanMode" => "[Exited plan mode]".to_string(),
        "BashOutput" => format!("[Checked bash output: {}]", str_field(input, "bash_id", "unknown")),
        "KillBash" => format!(
            "[Killed bash process: {}]",
            str_field(input, "shell_id", "unknown")
        ),
        other => format!("[Used tool: {other}]"),
    }
}

/// Describe a tool result in one short line
pub fn describe_tool_result(content: &Value) -> String {
    let text = match content {
        Value::Array(items) => return format!("[Tool results: {} items]", items.len()),
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    };

    if text.is_empty() {
        return "[Tool completed]".to_string();
    }

    let lowered = text.to_lowercase();
    if lowered.contains("error") {
        "[Tool error occurred]".to_string()
    } else if lowered.contains("success") {
        "[Tool succeeded]".to_string()
    } else if text.chars().count() > MAX_INLINE_RESULT_CHARS {
        format!("[Tool output: {} chars]", text.chars().count())
    } else {
        format!("[Result: {text}]")
    }
}
