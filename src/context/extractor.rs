//! Extraction orchestrator: classify, select and render in one call
//!
//! Classification does not depend on the budget, so it is cached per
//! transcript fingerprint and reused when the same transcript is extracted
//! again with a different budget.

use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use super::classifier::PriorityClassifier;
use super::models::{ClassifiedTranscript, Transcript};
use super::renderer::{ExtractionStats, Summary, SummaryRenderer};
use super::token_budget::{BudgetAllocator, Selection, TokenBudget};
use crate::config::ExtractionConfig;
use crate::error::Result;
use crate::metrics::METRICS;

const CLASSIFICATION_CACHE_CAPACITY: u64 = 64;

/// What an extraction produces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// Classify, select and render the full summary
    #[default]
    Full,
    /// Classify and select, then report statistics without rendering bodies
    StatsOnly,
}

impl ExtractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMode::Full => "full",
            ExtractionMode::StatsOnly => "stats_only",
        }
    }
}

/// Result of one extraction run
#[derive(Debug, Clone)]
pub enum ExtractionOutcome {
    Summary(Summary),
    Stats(ExtractionStats),
}

impl ExtractionOutcome {
    pub fn stats(&self) -> &ExtractionStats {
        match self {
            ExtractionOutcome::Summary(summary) => summary.stats(),
            ExtractionOutcome::Stats(stats) => stats,
        }
    }

    pub fn summary(&self) -> Option<&Summary> {
        match self {
            ExtractionOutcome::Summary(summary) => Some(summary),
            ExtractionOutcome::Stats(_) => None,
        }
    }
}

/// Composes classifier, allocator and renderer
pub struct ContextExtractor {
    classifier: PriorityClassifier,
    allocator: BudgetAllocator,
    renderer: SummaryRenderer,
    cache: Cache<String, Arc<ClassifiedTranscript>>,
}

impl Default for ContextExtractor {
    fn default() -> Self {
        Self::new(
            PriorityClassifier::default(),
            BudgetAllocator::default(),
            SummaryRenderer::default(),
        )
    }
}

impl ContextExtractor {
    pub fn new(
        classifier: PriorityClassifier,
        allocator: BudgetAllocator,
        renderer: SummaryRenderer,
    ) -> Self {
        Self {
            classifier,
            allocator,
            renderer,
            cache: Cache::new(CLASSIFICATION_CACHE_CAPACITY),
        }
    }

    /// Build from explicit configuration
    pub fn from_config(config: &ExtractionConfig) -> Result<Self> {
        config.validate()?;
        let allocator = BudgetAllocator::new(config.high_tier_fraction, config.overflow)?;
        Ok(Self::new(
            PriorityClassifier::new(config.recent_window_size),
            allocator,
            SummaryRenderer::new(config.display_char_limit),
        ))
    }

    /// Classify a transcript, reusing an earlier classification when possible
    pub fn classify(&self, transcript: &Transcript) -> Arc<ClassifiedTranscript> {
        let key = format!(
            "{}:{}",
            transcript.fingerprint(),
            self.classifier.recent_window_size()
        );

        if let Some(cached) = self.cache.get(&key) {
            METRICS.classification_cache_hits.inc();
            debug!("Reusing classification for transcript {}", transcript.id());
            return cached;
        }

        METRICS.classification_cache_misses.inc();
        let classified = Arc::new(self.classifier.classify(transcript));
        self.cache.insert(key, Arc::clone(&classified));
        classified
    }

    /// Validate the budget, classify and select
    pub fn select(&self, transcript: &Transcript, budget: i64) -> Result<Selection> {
        let budget = TokenBudget::new(budget)?;
        let classified = self.classify(transcript);
        Ok(self.allocator.select(&classified, budget))
    }

    /// Run the pipeline in the requested mode
    pub fn extract(
        &self,
        transcript: &Transcript,
        budget: i64,
        mode: ExtractionMode,
    ) -> Result<ExtractionOutcome> {
        let selection = self.select(transcript, budget)?;

        METRICS
            .extractions_total
            .with_label_values(&[mode.as_str()])
            .inc();
        METRICS
            .extraction_selected_tokens
            .observe(selection.total_selected_tokens as f64);
        METRICS
            .extraction_compression_ratio
            .observe(selection.display_compression_ratio());

        let outcome = match mode {
            ExtractionMode::Full => {
                ExtractionOutcome::Summary(self.renderer.render(transcript, &selection))
            }
            ExtractionMode::StatsOnly => {
                ExtractionOutcome::Stats(ExtractionStats::from_selection(transcript, &selection))
            }
        };

        let stats = outcome.stats();
        info!(
            "Extracted {} of {} messages from {} ({} of {} tokens, {:.1}% compressed, mode={})",
            stats.selected_messages(),
            stats.total_messages,
            stats.transcript_id,
            stats.selected_tokens,
            stats.available_tokens,
            stats.compression_percent(),
            mode.as_str()
        );

        Ok(outcome)
    }

    /// Statistics only, for previews before committing to full output
    pub fn preview(&self, transcript: &Transcript, budget: i64) -> Result<ExtractionStats> {
        let selection = self.select(transcript, budget)?;
        Ok(ExtractionStats::from_selection(transcript, &selection))
    }
}
