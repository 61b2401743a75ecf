//! Context extraction with token budget enforcement
//!
//! Pipeline: transcript → classified messages → tier-aware prefix selection
//! → rendered Markdown summary. Every stage consumes an immutable snapshot of
//! the previous one.

pub mod classifier;
pub mod extractor;
pub mod models;
pub mod renderer;
pub mod token_budget;
pub mod token_estimator;

pub use classifier::PriorityClassifier;
pub use extractor::{ContextExtractor, ExtractionMode, ExtractionOutcome};
pub use models::{
    Classification, ClassifiedTranscript, Message, MessageFlags, ParseWarning, PriorityTier, Role,
    Transcript,
};
pub use renderer::{ExtractionStats, RenderedBlock, Summary, SummaryRenderer};
pub use token_budget::{
    BudgetAllocation, BudgetAllocator, BudgetError, OverflowPolicy, Selection, TokenBudget,
};
pub use token_estimator::{
    EstimatorKind, HeuristicEstimator, TiktokenEstimator, TokenEstimator, WordBasedEstimator,
};
