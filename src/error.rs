//! Error types shared across the crate

use thiserror::Error;

use crate::context::token_budget::BudgetError;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, ContextError>;

/// Errors surfaced to callers of the extraction engine and its glue
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Transcript not found: {0}")]
    TranscriptNotFound(String),

    #[error("Transcript {id} could not be parsed: {reason}")]
    TranscriptParse { id: String, reason: String },

    #[error("Invalid budget: {0} (must be non-negative)")]
    InvalidBudget(i64),

    #[error("Token estimation failed: {0}")]
    EstimationFailure(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse error category, for callers deciding between retry, fallback and abort
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Parse,
    InvalidBudget,
    Estimation,
    Configuration,
    Io,
    Sink,
    Internal,
}

impl ContextError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ContextError::TranscriptNotFound(_) => ErrorKind::NotFound,
            ContextError::TranscriptParse { .. } => ErrorKind::Parse,
            ContextError::InvalidBudget(_) => ErrorKind::InvalidBudget,
            ContextError::EstimationFailure(_) => ErrorKind::Estimation,
            ContextError::Configuration(_) => ErrorKind::Configuration,
            ContextError::Io(_) => ErrorKind::Io,
            ContextError::Sink(_) => ErrorKind::Sink,
            ContextError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn parse(id: impl Into<String>, reason: impl Into<String>) -> Self {
        ContextError::TranscriptParse {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

impl From<BudgetError> for ContextError {
    fn from(err: BudgetError) -> Self {
        match err {
            BudgetError::Negative(value) => ContextError::InvalidBudget(value),
            BudgetError::InvalidFraction(_) => ContextError::Configuration(err.to_string()),
        }
    }
}

impl From<::config::ConfigError> for ContextError {
    fn from(err: ::config::ConfigError) -> Self {
        ContextError::Configuration(err.to_string())
    }
}
