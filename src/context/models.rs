//! Data models for transcripts and classified messages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

use super::token_estimator::TokenEstimator;

/// Speaker of a conversational turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl Role {
    /// Label used in rendered summaries
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
            Role::Tool => "Tool",
        }
    }

    /// Parse the role names found in recorded transcripts
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "user" | "human" => Some(Role::User),
            "assistant" | "claude" => Some(Role::Assistant),
            "system" | "summary" => Some(Role::System),
            "tool" => Some(Role::Tool),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One conversational turn, immutable once parsed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub index: usize,
    pub role: Role,
    pub timestamp: Option<DateTime<Utc>>,
    pub raw_text: String,
    pub token_count: usize,
}

impl Message {
    /// Create a message, memoizing its token count with the given estimator
    pub fn new(
        index: usize,
        role: Role,
        timestamp: Option<DateTime<Utc>>,
        raw_text: String,
        estimator: &dyn TokenEstimator,
    ) -> Self {
        let token_count = if raw_text.is_empty() {
            0
        } else {
            estimator.estimate(&raw_text)
        };
        Self {
            index,
            role,
            timestamp,
            raw_text,
            token_count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.raw_text.is_empty()
    }
}

/// A structural problem with one recorded entry that was skipped during parsing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseWarning {
    /// 1-based line (or entry) number in the source
    pub line: usize,
    pub reason: String,
}

/// An ordered, read-only sequence of messages
#[derive(Debug, Clone)]
pub struct Transcript {
    id: String,
    messages: Arc<[Message]>,
    warnings: Vec<ParseWarning>,
    estimator_name: String,
    fingerprint: String,
}

impl Transcript {
    /// Build a transcript from `(role, timestamp, text)` turns, assigning
    /// contiguous indices in order.
    pub fn from_turns<I>(id: impl Into<String>, turns: I, estimator: &dyn TokenEstimator) -> Self
    where
        I: IntoIterator<Item = (Role, Option<DateTime<Utc>>, String)>,
    {
        let messages: Vec<Message> = turns
            .into_iter()
            .enumerate()
            .map(|(index, (role, timestamp, text))| {
                Message::new(index, role, timestamp, text, estimator)
            })
            .collect();
        Self::assemble(id.into(), messages, Vec::new(), estimator.name())
    }

    pub(crate) fn assemble(
        id: String,
        messages: Vec<Message>,
        warnings: Vec<ParseWarning>,
        estimator_name: &str,
    ) -> Self {
        debug_assert!(messages.iter().enumerate().all(|(i, m)| m.index == i));
        let fingerprint = Self::compute_fingerprint(&id, &messages);
        Self {
            id,
            messages: messages.into(),
            warnings,
            estimator_name: estimator_name.to_string(),
            fingerprint,
        }
    }

    fn compute_fingerprint(id: &str, messages: &[Message]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(id.as_bytes());
        for message in messages {
            hasher.update(b"|");
            hasher.update(message.role.label().as_bytes());
            hasher.update(b":");
            hasher.update(message.token_count.to_le_bytes());
            hasher.update(message.raw_text.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn warnings(&self) -> &[ParseWarning] {
        &self.warnings
    }

    /// Name of the estimator that produced every `token_count`
    pub fn estimator_name(&self) -> &str {
        &self.estimator_name
    }

    /// Content digest, stable for identical transcripts
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn total_tokens(&self) -> usize {
        self.messages.iter().map(|m| m.token_count).sum()
    }
}

/// Priority bucket assigned to a message before budgeting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityTier {
    High,
    Normal,
}

/// Structural cues detected in a message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFlags {
    pub has_code: bool,
    pub has_file_path: bool,
    pub has_error_marker: bool,
    pub has_imperative_instruction: bool,
    pub is_within_recent_window: bool,
}

impl MessageFlags {
    pub fn any(&self) -> bool {
        self.has_code
            || self.has_file_path
            || self.has_error_marker
            || self.has_imperative_instruction
            || self.is_within_recent_window
    }

    /// Tier implied by these flags
    pub fn tier(&self) -> PriorityTier {
        if self.any() {
            PriorityTier::High
        } else {
            PriorityTier::Normal
        }
    }
}

/// Flags and tier for one message, computed once at classification time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub flags: MessageFlags,
    pub tier: PriorityTier,
}

/// A transcript snapshot paired with its per-message classification
#[derive(Debug, Clone)]
pub struct ClassifiedTranscript {
    transcript: Transcript,
    classifications: Vec<Classification>,
}

impl ClassifiedTranscript {
    pub(crate) fn new(transcript: Transcript, classifications: Vec<Classification>) -> Self {
        debug_assert_eq!(transcript.len(), classifications.len());
        Self {
            transcript,
            classifications,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn classifications(&self) -> &[Classification] {
        &self.classifications
    }

    pub fn classification(&self, index: usize) -> Option<&Classification> {
        self.classifications.get(index)
    }

    pub fn len(&self) -> usize {
        self.classifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classifications.is_empty()
    }

    /// Messages of one tier, in original index order
    pub fn tier_messages(&self, tier: PriorityTier) -> impl Iterator<Item = &Message> + '_ {
        self.transcript
            .messages()
            .iter()
            .zip(self.classifications.iter())
            .filter(move |(_, c)| c.tier == tier)
            .map(|(m, _)| m)
    }
}
