//! Transcript acquisition: session discovery and parsing

pub mod parser;
pub mod sanitizer;
pub mod store;

pub use parser::TranscriptParser;
pub use store::{FileTranscriptStore, SessionEntry};
