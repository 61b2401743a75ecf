//! Configuration for extraction, session discovery, logging and delivery
//!
//! Sources, lowest precedence first: built-in defaults, an optional TOML file,
//! `.env`, then `CONTEXT_RESUME_<SECTION>__<KEY>` environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::context::classifier::DEFAULT_RECENT_WINDOW;
use crate::context::renderer::DEFAULT_DISPLAY_CHAR_LIMIT;
use crate::context::token_budget::{OverflowPolicy, DEFAULT_HIGH_TIER_FRACTION};
use crate::context::token_estimator::EstimatorKind;
use crate::context::ExtractionMode;
use crate::error::{ContextError, Result};

/// Default token budget for a resumed session
pub const DEFAULT_BUDGET: i64 = 100_000;

const ENV_PREFIX: &str = "CONTEXT_RESUME";
const DEFAULT_CONFIG_NAME: &str = "context-resume";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub extraction: ExtractionConfig,

    #[serde(default)]
    pub sessions: SessionsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub sink: SinkConfig,
}

impl Config {
    /// Load configuration from `path` (required when given) or from an
    /// optional `context-resume.toml` in the working directory.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut builder = ::config::Config::builder();
        builder = match path {
            Some(path) => builder.add_source(::config::File::from(path).required(true)),
            None => builder.add_source(::config::File::with_name(DEFAULT_CONFIG_NAME).required(false)),
        };
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("sink.args"),
        );

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.extraction.validate()
    }
}

/// Parameters handed to the extraction orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Token budget; negative values are rejected at extraction time
    #[serde(default = "default_budget")]
    pub budget: i64,

    #[serde(default)]
    pub mode: ExtractionMode,

    /// Trailing messages always treated as high priority
    #[serde(default = "default_recent_window_size")]
    pub recent_window_size: usize,

    /// Share of the budget reserved for high priority messages
    #[serde(default = "default_high_tier_fraction")]
    pub high_tier_fraction: f64,

    #[serde(default)]
    pub overflow: OverflowPolicy,

    /// Per-message display ceiling in characters (0 disables truncation)
    #[serde(default = "default_display_char_limit")]
    pub display_char_limit: usize,

    #[serde(default)]
    pub estimator: EstimatorKind,
}

fn default_budget() -> i64 {
    DEFAULT_BUDGET
}

fn default_recent_window_size() -> usize {
    DEFAULT_RECENT_WINDOW
}

fn default_high_tier_fraction() -> f64 {
    DEFAULT_HIGH_TIER_FRACTION
}

fn default_display_char_limit() -> usize {
    DEFAULT_DISPLAY_CHAR_LIMIT
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            budget: default_budget(),
            mode: ExtractionMode::default(),
            recent_window_size: default_recent_window_size(),
            high_tier_fraction: default_high_tier_fraction(),
            overflow: OverflowPolicy::default(),
            display_char_limit: default_display_char_limit(),
            estimator: EstimatorKind::default(),
        }
    }
}

impl ExtractionConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.high_tier_fraction > 0.0 && self.high_tier_fraction < 1.0) {
            return Err(ContextError::Configuration(format!(
                "high_tier_fraction must lie strictly between 0 and 1, got {}",
                self.high_tier_fraction
            )));
        }
        Ok(())
    }
}

/// Session discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Directory holding one sub-directory of session files per project
    #[serde(default = "default_sessions_root")]
    pub root: PathBuf,

    /// Session files at or below this size are treated as empty
    #[serde(default = "default_min_size_bytes")]
    pub min_size_bytes: u64,

    /// Length of the first-message preview shown in listings
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

fn default_sessions_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".claude")
        .join("projects")
}

fn default_min_size_bytes() -> u64 {
    1024
}

fn default_preview_chars() -> usize {
    120
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            root: default_sessions_root(),
            min_size_bytes: default_min_size_bytes(),
            preview_chars: default_preview_chars(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Downstream process receiving the summary on `--send`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(default = "default_sink_command")]
    pub command: String,

    #[serde(default = "default_sink_args")]
    pub args: Vec<String>,
}

fn default_sink_command() -> String {
    "claude".to_string()
}

fn default_sink_args() -> Vec<String> {
    vec!["--verbose".to_string()]
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            command: default_sink_command(),
            args: default_sink_args(),
        }
    }
}
