//! Priority classification from structural cues and recency

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::models::{Classification, ClassifiedTranscript, MessageFlags, Transcript};

/// Default number of trailing messages treated as recent
pub const DEFAULT_RECENT_WINDOW: usize = 10;

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*(```|~~~)").unwrap());

static PATH_WITH_EXTENSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\w.~-]*[/\\](?:[\w.-]+[/\\])*[\w-]+\.[A-Za-z][A-Za-z0-9]{0,7}\b").unwrap()
});

static ABSOLUTE_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:^|[\s"'`(\[=])(?:~|\.{1,2})?/[\w.-]+/[\w.-]+|\b[A-Za-z]:\\[\w.-]+"#).unwrap()
});

static ERROR_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:errors?|exceptions?|traceback|failed|failure|failing|panic(?:ked)?|fatal|segfault)\b|错误|报错|失败|异常",
    )
    .unwrap()
});

static DIRECTIVE_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:must|please|fix|implement|make sure|need to)\b|请|必须|修复|实现").unwrap()
});

const IMPERATIVE_VERBS: &[&str] = &[
    "add", "build", "change", "check", "convert", "create", "delete", "deploy", "do", "don't",
    "ensure", "explain", "fix", "generate", "help", "implement", "install", "let's", "make",
    "move", "refactor", "remove", "rename", "replace", "run", "show", "stop", "test", "try",
    "update", "use", "write",
];

/// Minimum indented lines before indentation alone counts as code
const MIN_INDENTED_LINES: usize = 3;

/// Tags messages with structural flags and a priority tier in a single pass
#[derive(Debug, Clone)]
pub struct PriorityClassifier {
    recent_window_size: usize,
}

impl Default for PriorityClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_WINDOW)
    }
}

impl PriorityClassifier {
    pub fn new(recent_window_size: usize) -> Self {
        Self { recent_window_size }
    }

    pub fn recent_window_size(&self) -> usize {
        self.recent_window_size
    }

    /// Classify every message of the transcript
    pub fn classify(&self, transcript: &Transcript) -> ClassifiedTranscript {
        let len = transcript.len();
        let window = self.recent_window_size.min(len);
        let recent_start = len - window;

        let classifications: Vec<Classification> = transcript
            .messages()
            .iter()
            .map(|message| {
                let mut flags = scan_text(&message.raw_text);
                flags.is_within_recent_window = message.index >= recent_start;
                Classification {
                    flags,
                    tier: flags.tier(),
                }
            })
            .collect();

        debug!(
            "Classified {} messages (window={}, high={})",
            len,
            window,
            classifications
                .iter()
                .filter(|c| c.flags.any())
                .count()
        );

        ClassifiedTranscript::new(transcript.clone(), classifications)
    }
}

/// Detect structural cues in one message body. Recency is left unset.
pub fn scan_text(text: &str) -> MessageFlags {
    MessageFlags {
        has_code: has_code(text),
        has_file_path: PATH_WITH_EXTENSION.is_match(text) || ABSOLUTE_PATH.is_match(text),
        has_error_marker: ERROR_MARKER.is_match(text),
        has_imperative_instruction: has_imperative(text),
        is_within_recent_window: false,
    }
}

fn has_code(text: &str) -> bool {
    if CODE_FENCE.is_match(text) {
        return true;
    }

    let mut non_empty = 0usize;
    let mut indented = 0usize;
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        non_empty += 1;
        if line.starts_with("    ") || line.starts_with('\t') {
            indented += 1;
        }
    }
    indented >= MIN_INDENTED_LINES && indented * 2 >= non_empty
}

fn has_imperative(text: &str) -> bool {
    let leading = text
        .split_whitespace()
        .next()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                .to_lowercase()
        })
        .unwrap_or_default();

    IMPERATIVE_VERBS.contains(&leading.as_str()) || DIRECTIVE_KEYWORD.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::models::{PriorityTier, Role};
    use crate::context::token_estimator::WordBasedEstimator;

    fn transcript(texts: &[&str]) -> Transcript {
        let estimator = WordBasedEstimator::default();
        Transcript::from_turns(
            "test",
            texts
                .iter()
                .enumerate()
                .map(|(i, t)| {
                    let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
                    (role, None, t.to_string())
                }),
            &estimator,
        )
    }

    #[test]
    fn test_detects_code_fence_and_indentation() {
        assert!(scan_text("Here:\n```rust\nfn main() {}\n```").has_code);
        assert!(scan_text("    let a = 1;\n    let b = 2;\n    a + b").has_code);
        assert!(!scan_text("just a sentence about code").has_code);
    }

    #[test]
    fn test_detects_file_paths() {
        assert!(scan_text("look at src/context/mod.rs").has_file_path);
        assert!(scan_text("see /usr/local/bin for it").has_file_path);
        assert!(scan_text(r"opened C:\Users").has_file_path);
        assert!(!scan_text("either and/or works").has_file_path);
        assert!(!scan_text("version 1/2.5 shipped").has_file_path);
    }

    #[test]
    fn test_detects_error_markers_case_insensitively() {
        assert!(scan_text("Traceback (most recent call last)").has_error_marker);
        assert!(scan_text("the build FAILED again").has_error_marker);
        assert!(scan_text("编译报错了").has_error_marker);
        assert!(!scan_text("terror is not a match").has_error_marker);
    }

    #[test]
    fn test_detects_imperatives() {
        assert!(scan_text("Add a test for the parser").has_imperative_instruction);
        assert!(scan_text("I think we must keep this").has_imperative_instruction);
        assert!(scan_text("could you please look").has_imperative_instruction);
        assert!(!scan_text("the prefix stays as is").has_imperative_instruction);
    }

    #[test]
    fn test_recent_window_and_tiers() {
        let mut texts = vec!["```\ncode\n```", "hello there friend"];
        texts.extend(std::iter::repeat("ok sounds good").take(10));
        let classified = PriorityClassifier::default().classify(&transcript(&texts));

        let high: Vec<usize> = classified
            .tier_messages(PriorityTier::High)
            .map(|m| m.index)
            .collect();
        let normal: Vec<usize> = classified
            .tier_messages(PriorityTier::Normal)
            .map(|m| m.index)
            .collect();

        assert_eq!(high, vec![0, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]);
        assert_eq!(normal, vec![1]);
        assert!(classified.classification(2).unwrap().flags.is_within_recent_window);
        assert!(!classified.classification(1).unwrap().flags.is_within_recent_window);
    }

    #[test]
    fn test_short_transcript_is_entirely_recent() {
        let classified = PriorityClassifier::new(10).classify(&transcript(&["hi", "hello"]));
        assert!(classified
            .classifications()
            .iter()
            .all(|c| c.flags.is_within_recent_window && c.tier == PriorityTier::High));
    }

    #[test]
    fn test_empty_transcript_classifies_to_empty() {
        let classified = PriorityClassifier::default().classify(&transcript(&[]));
        assert!(classified.is_empty());
    }

    #[test]
    fn test_classification_is_idempotent() {
        let classifier = PriorityClassifier::new(2);
        let first = classifier.classify(&transcript(&["fix it", "nice", "ok", "sure"]));
        let second = classifier.classify(first.transcript());
        assert_eq!(first.classifications(), second.classifications());
    }
}
