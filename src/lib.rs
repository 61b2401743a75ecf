//! Token-budgeted context extraction for recorded assistant sessions
//!
//! A recorded session is parsed into a [`Transcript`], each message is
//! classified HIGH or NORMAL, a tier-aware prefix of messages is selected to
//! fit a token budget, and the selection is rendered as a Markdown summary
//! that can be handed to a new session.

pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod sink;
pub mod transcript;

pub use config::Config;
pub use context::{
    ContextExtractor, ExtractionMode, ExtractionOutcome, ExtractionStats, Selection, Summary,
    Transcript,
};
pub use error::{ContextError, ErrorKind, Result};
pub use sink::{CommandSink, FileSink, Sink, StdoutSink};
pub use transcript::{FileTranscriptStore, SessionEntry, TranscriptParser};
