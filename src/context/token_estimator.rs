//! Token estimation using tiktoken, with deterministic heuristic fallbacks
//!
//! The same estimator must compute every message's `token_count` and every
//! reported total, otherwise budget guarantees do not hold.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tiktoken_rs::{cl100k_base, CoreBPE};
use tracing::warn;

use crate::error::{ContextError, Result};

/// Token estimator trait for different tokenization strategies
pub trait TokenEstimator: Send + Sync {
    /// Estimate the number of tokens in the given text
    fn estimate(&self, text: &str) -> usize;

    /// Short identifier reported alongside token totals
    fn name(&self) -> &'static str;

    /// Estimate tokens for multiple texts
    fn estimate_batch(&self, texts: &[&str]) -> Vec<usize> {
        texts.iter().map(|t| self.estimate(t)).collect()
    }

    /// Estimate tokens for raw bytes; undecodable input is sized by length
    fn estimate_bytes(&self, bytes: &[u8]) -> usize {
        match std::str::from_utf8(bytes) {
            Ok(text) => self.estimate(text),
            Err(_) => bytes.len().div_ceil(4),
        }
    }
}

/// Tiktoken-based token estimator using cl100k_base
pub struct TiktokenEstimator {
    bpe: Arc<CoreBPE>,
}

impl TiktokenEstimator {
    /// Create a new tiktoken estimator with cl100k_base encoding
    pub fn new() -> Result<Self> {
        let bpe = cl100k_base().map_err(|e| ContextError::EstimationFailure(e.to_string()))?;
        Ok(Self { bpe: Arc::new(bpe) })
    }
}

impl TokenEstimator for TiktokenEstimator {
    fn estimate(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    fn name(&self) -> &'static str {
        "cl100k_base"
    }
}

/// Character-class heuristic: ~1.8 tokens per CJK ideograph, ~3.5 chars per
/// token otherwise. Integer arithmetic in 1/35 token units keeps it exact.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicEstimator;

impl HeuristicEstimator {
    const CJK_UNITS: usize = 63;
    const OTHER_UNITS: usize = 10;
    const UNITS_PER_TOKEN: usize = 35;

    fn is_cjk(c: char) -> bool {
        ('\u{4e00}'..='\u{9fff}').contains(&c)
    }
}

impl TokenEstimator for HeuristicEstimator {
    fn estimate(&self, text: &str) -> usize {
        let units: usize = text
            .chars()
            .map(|c| {
                if Self::is_cjk(c) {
                    Self::CJK_UNITS
                } else {
                    Self::OTHER_UNITS
                }
            })
            .sum();
        units.div_ceil(Self::UNITS_PER_TOKEN)
    }

    fn name(&self) -> &'static str {
        "heuristic"
    }
}

/// Word-based token estimator (~1.3 tokens per word)
#[derive(Debug, Clone, Copy)]
pub struct WordBasedEstimator {
    tokens_per_word: f64,
}

impl WordBasedEstimator {
    pub fn new(tokens_per_word: f64) -> Self {
        Self { tokens_per_word }
    }
}

impl Default for WordBasedEstimator {
    fn default() -> Self {
        Self::new(1.3)
    }
}

impl TokenEstimator for WordBasedEstimator {
    fn estimate(&self, text: &str) -> usize {
        let word_count = text.split_whitespace().count();
        (word_count as f64 * self.tokens_per_word).ceil() as usize
    }

    fn name(&self) -> &'static str {
        "words"
    }
}

/// Configurable estimator choice
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatorKind {
    #[default]
    Tiktoken,
    Heuristic,
    Words,
}

impl EstimatorKind {
    /// Build the configured estimator
    pub fn build(self) -> Result<Arc<dyn TokenEstimator>> {
        Ok(match self {
            EstimatorKind::Tiktoken => Arc::new(TiktokenEstimator::new()?),
            EstimatorKind::Heuristic => Arc::new(HeuristicEstimator),
            EstimatorKind::Words => Arc::new(WordBasedEstimator::default()),
        })
    }

    /// Build the configured estimator, degrading to the heuristic on failure
    pub fn build_or_fallback(self) -> Arc<dyn TokenEstimator> {
        self.build().unwrap_or_else(|e| {
            warn!("Estimator {:?} unavailable ({}), using heuristic", self, e);
            Arc::new(HeuristicEstimator)
        })
    }
}
