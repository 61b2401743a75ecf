//! Markdown rendering of a selection, plus aggregate statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use super::models::{PriorityTier, Role, Transcript};
use super::token_budget::{OverflowPolicy, Selection};

/// Default per-message display ceiling, in characters
pub const DEFAULT_DISPLAY_CHAR_LIMIT: usize = 8_000;

/// Aggregate figures for one extraction run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub transcript_id: String,
    pub estimator: String,
    pub total_messages: usize,
    pub selected_high: usize,
    pub selected_normal: usize,
    pub omitted: usize,
    pub available_tokens: usize,
    pub selected_tokens: usize,
    pub budget: usize,
    pub high_budget: usize,
    pub normal_budget: usize,
    /// Raw `1 - selected/available`, kept for diagnostics
    pub compression_ratio: f64,
    pub fits_entirely: bool,
    pub overflow: OverflowPolicy,
    pub parse_warnings: usize,
}

impl ExtractionStats {
    pub fn from_selection(transcript: &Transcript, selection: &Selection) -> Self {
        Self {
            transcript_id: transcript.id().to_string(),
            estimator: transcript.estimator_name().to_string(),
            total_messages: selection.total_messages,
            selected_high: selection.selected_high.len(),
            selected_normal: selection.selected_normal.len(),
            omitted: selection.omitted_count(),
            available_tokens: selection.total_available_tokens,
            selected_tokens: selection.total_selected_tokens,
            budget: selection.allocation.total,
            high_budget: selection.allocation.high,
            normal_budget: selection.allocation.normal,
            compression_ratio: selection.compression_ratio(),
            fits_entirely: selection.fits_entirely,
            overflow: selection.overflow,
            parse_warnings: transcript.warnings().len(),
        }
    }

    /// Compression as a percentage, clamped to [0, 100]
    pub fn compression_percent(&self) -> f64 {
        self.compression_ratio.clamp(0.0, 1.0) * 100.0
    }

    pub fn selected_messages(&self) -> usize {
        self.selected_high + self.selected_normal
    }

    /// The trailing statistics section of a summary
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("## Statistics\n\n");
        out.push_str("| Metric | Value |\n|---|---|\n");
        let _ = writeln!(out, "| Messages (total) | {} |", self.total_messages);
        let _ = writeln!(out, "| Selected (high priority) | {} |", self.selected_high);
        let _ = writeln!(out, "| Selected (normal priority) | {} |", self.selected_normal);
        let _ = writeln!(out, "| Omitted | {} |", self.omitted);
        let _ = writeln!(out, "| Tokens available | {} |", self.available_tokens);
        let _ = writeln!(out, "| Tokens selected | {} |", self.selected_tokens);
        let _ = writeln!(
            out,
            "| Token budget | {} (high {}, normal {}) |",
            self.budget, self.high_budget, self.normal_budget
        );
        let _ = writeln!(out, "| Compression | {:.1}% |", self.compression_percent());
        out.push('\n');
        if self.fits_entirely {
            out.push_str("_No compression needed: the whole transcript fits the budget._\n\n");
        }
        if self.overflow == OverflowPolicy::Spill {
            out.push_str("_Unused tier budget was spilled to the other tier._\n\n");
        }
        if self.parse_warnings > 0 {
            let _ = writeln!(
                out,
                "_{} malformed records were skipped while parsing._\n",
                self.parse_warnings
            );
        }
        let _ = writeln!(out, "_Token counts estimated with {}._", self.estimator);
        out
    }
}

/// One message as it appears in the summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedBlock {
    pub index: usize,
    pub role: Role,
    pub tier: PriorityTier,
    pub timestamp: Option<DateTime<Utc>>,
    pub body: String,
    /// Characters dropped by the display ceiling
    pub truncated_chars: usize,
}

/// The rendered artifact; immutable once produced
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    blocks: Vec<RenderedBlock>,
    stats: ExtractionStats,
    text: String,
}

impl Summary {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn stats(&self) -> &ExtractionStats {
        &self.stats
    }

    pub fn blocks(&self) -> &[RenderedBlock] {
        &self.blocks
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// Serializes selected messages, in transcript order, into Markdown
#[derive(Debug, Clone)]
pub struct SummaryRenderer {
    display_char_limit: usize,
}

impl Default for SummaryRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_DISPLAY_CHAR_LIMIT)
    }
}

impl SummaryRenderer {
    /// `display_char_limit == 0` disables truncation
    pub fn new(display_char_limit: usize) -> Self {
        Self { display_char_limit }
    }

    pub fn render(&self, transcript: &Transcript, selection: &Selection) -> Summary {
        let stats = ExtractionStats::from_selection(transcript, selection);

        let mut high = vec![false; transcript.len()];
        for &index in &selection.selected_high {
            high[index] = true;
        }

        let blocks: Vec<RenderedBlock> = selection
            .selected_indices()
            .into_iter()
            .filter_map(|index| transcript.messages().get(index))
            .map(|message| {
                let escaped = escape_body(&message.raw_text);
                let (body, truncated_chars) = truncate_body(&escaped, self.display_char_limit);
                RenderedBlock {
                    index: message.index,
                    role: message.role,
                    tier: if high[message.index] {
                        PriorityTier::High
                    } else {
                        PriorityTier::Normal
                    },
                    timestamp: message.timestamp,
                    body,
                    truncated_chars,
                }
            })
            .collect();

        let text = compose(transcript, &blocks, &stats);
        Summary {
            blocks,
            stats,
            text,
        }
    }
}

fn omission_marker(out: &mut String, count: usize) {
    if count > 0 {
        let noun = if count == 1 { "message" } else { "messages" };
        let _ = write!(out, "_[{count} {noun} omitted]_\n\n");
    }
}

fn compose(transcript: &Transcript, blocks: &[RenderedBlock], stats: &ExtractionStats) -> String {
    let mut out = String::new();
    let _ = write!(out, "# Conversation context: {}\n\n", transcript.id());
    let _ = write!(
        out,
        "_{} of {} messages retained, {:.1}% compressed_\n\n---\n\n",
        stats.selected_messages(),
        stats.total_messages,
        stats.compression_percent()
    );

    let mut next_expected = 0usize;
    for block in blocks {
        omission_marker(&mut out, block.index - next_expected);
        let _ = write!(out, "### #{} {}", block.index, block.role.label());
        if let Some(ts) = block.timestamp {
            let _ = write!(out, " · {}", ts.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        out.push_str("\n\n");
        if block.body.is_empty() {
            out.push_str("_(empty message)_");
        } else {
            out.push_str(&block.body);
        }
        out.push_str("\n\n");
        next_expected = block.index + 1;
    }
    omission_marker(&mut out, stats.total_messages.saturating_sub(next_expected));

    out.push_str("---\n\n");
    out.push_str(&stats.to_markdown());
    out
}

/// Normalize line endings and neutralize bare rules that would collide with
/// the summary's own separators. Fenced code is left untouched.
fn escape_body(raw: &str) -> String {
    let normalized = raw.replace("\r\n", "\n");
    let mut in_fence = false;
    normalized
        .lines()
        .map(|line| {
            if is_fence_line(line) {
                in_fence = !in_fence;
                line.to_string()
            } else if !in_fence && line.trim() == "---" {
                format!("\\{}", line.trim_start())
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim_end()
        .to_string()
}

fn is_fence_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

/// Cut `text` to at most `limit` characters without ending inside a fenced
/// code block when that can be avoided. Returns the body and dropped count.
fn truncate_body(text: &str, limit: usize) -> (String, usize) {
    let total_chars = text.chars().count();
    if limit == 0 || total_chars <= limit {
        return (text.to_string(), 0);
    }

    let cut = text
        .char_indices()
        .nth(limit)
        .map_or(text.len(), |(byte, _)| byte);
    let head = &text[..cut];

    let mut open_fence: Option<usize> = None;
    let mut offset = 0usize;
    for line in head.split_inclusive('\n') {
        if is_fence_line(line) {
            open_fence = match open_fence {
                Some(_) => None,
                None => Some(offset),
            };
        }
        offset += line.len();
    }

    let (kept, close_fence) = match open_fence {
        Some(start) => {
            let before = head[..start].trim_end();
            if before.trim_start().is_empty() {
                (head.trim_end(), true)
            } else {
                (before, false)
            }
        }
        None => (head.trim_end(), false),
    };

    let dropped = total_chars - kept.chars().count();
    let mut body = kept.to_string();
    if close_fence {
        body.push_str("\n```");
    }
    let _ = write!(body, "\n\n[… {dropped} more characters truncated …]");
    (body, dropped)
}
