//! context-resume CLI
//!
//! Lists recorded sessions and extracts a token-budgeted summary from one of
//! them, printing it, writing it to a file or piping it into a new session.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use context_resume::config::Config;
use context_resume::context::{ContextExtractor, ExtractionMode, ExtractionOutcome, OverflowPolicy};
use context_resume::metrics::METRICS;
use context_resume::sink::{CommandSink, FileSink, Sink, StdoutSink};
use context_resume::transcript::{FileTranscriptStore, SessionEntry, TranscriptParser};
use context_resume::{logging, Transcript};

#[derive(Parser)]
#[command(name = "context-resume")]
#[command(about = "Extract a token-budgeted summary from a recorded session", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print collected metrics to stderr on exit
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List recorded sessions, newest first
    List {
        /// Show at most this many sessions
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Extract a summary from a session id or file path
    Extract {
        /// Session id or path to a session/export file
        target: String,

        /// Token budget for retained message content
        #[arg(short, long, allow_hyphen_values = true)]
        budget: Option<i64>,

        /// Report statistics without rendering message bodies
        #[arg(long)]
        stats_only: bool,

        /// Write the summary to this file
        #[arg(short, long, conflicts_with = "send")]
        output: Option<PathBuf>,

        /// Pipe the summary into the configured command
        #[arg(long)]
        send: bool,

        /// Let unused budget extend the tier prefixes
        #[arg(long)]
        spill: bool,

        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    logging::init(&config.logging).context("Failed to initialize logging")?;

    let estimator = config.extraction.estimator.build_or_fallback();
    let store = FileTranscriptStore::new(&config.sessions, TranscriptParser::new(estimator));

    let result = match cli.command {
        Commands::List { limit } => list(&store, limit),
        Commands::Extract {
            target,
            budget,
            stats_only,
            output,
            send,
            spill,
            json,
        } => {
            let mut extraction = config.extraction.clone();
            if let Some(budget) = budget {
                extraction.budget = budget;
            }
            if stats_only {
                extraction.mode = ExtractionMode::StatsOnly;
            }
            if spill {
                extraction.overflow = OverflowPolicy::Spill;
            }

            let transcript = load(&store, &target)?;
            let extractor = ContextExtractor::from_config(&extraction)?;
            let outcome = extractor
                .extract(&transcript, extraction.budget, extraction.mode)
                .with_context(|| format!("Failed to extract context from {target}"))?;

            let sink: Box<dyn Sink> = if send {
                Box::new(CommandSink::from_config(&config.sink))
            } else if let Some(path) = output {
                Box::new(FileSink::new(path))
            } else {
                Box::new(StdoutSink)
            };
            deliver(outcome, sink.as_ref(), json).await
        }
    };

    if cli.metrics {
        eprintln!("{}", METRICS.render());
    }
    result
}

fn load(store: &FileTranscriptStore, target: &str) -> Result<Transcript> {
    let path = Path::new(target);
    let transcript = if path.is_file() {
        store.load_path(path)
    } else {
        store.load_transcript(target)
    };
    transcript.with_context(|| format!("Failed to load session {target}"))
}

async fn deliver(outcome: ExtractionOutcome, sink: &dyn Sink, json: bool) -> Result<()> {
    let stats_json = || serde_json::to_string_pretty(outcome.stats());

    match &outcome {
        ExtractionOutcome::Stats(stats) => {
            let text = if json {
                stats_json()?
            } else {
                stats.to_markdown()
            };
            sink.deliver(&text).await?;
        }
        ExtractionOutcome::Summary(summary) => {
            sink.deliver(summary.text())
                .await
                .with_context(|| format!("Failed to deliver summary via {}", sink.name()))?;
            if json {
                eprintln!("{}", stats_json()?);
            }
        }
    }
    Ok(())
}

fn list(store: &FileTranscriptStore, limit: Option<usize>) -> Result<()> {
    let sessions = store.list_sessions()?;
    if sessions.is_empty() {
        println!("No sessions found under {}", store.root().display());
        return Ok(());
    }

    let shown = limit.unwrap_or(sessions.len()).min(sessions.len());
    println!(
        "{:<36}  {:<24}  {:>8}  {:>5}  {:>4}  {:<16}  {:<16}  TOPIC",
        "ID", "PROJECT", "SIZE", "MSGS", "LEN", "MODIFIED", "BRANCH"
    );
    for entry in &sessions[..shown] {
        println!("{}", format_row(entry));
    }
    if shown < sessions.len() {
        println!("... {} more", sessions.len() - shown);
    }
    Ok(())
}

fn format_row(entry: &SessionEntry) -> String {
    // Project directories encode the full path; keep its tail
    let skip = entry.project.chars().count().saturating_sub(24);
    let project: String = entry.project.chars().skip(skip).collect();
    // Prefer a generated summary over the opening message
    let topic = entry
        .summaries
        .first()
        .map(String::as_str)
        .or(entry.first_message_preview.as_deref())
        .unwrap_or("");
    format!(
        "{:<36}  {:<24}  {:>8}  {:>5}  {:>4}  {:<16}  {:<16}  {}",
        entry.id,
        project,
        format_size(entry.size_bytes),
        entry.message_count,
        entry.duration_label().unwrap_or_default(),
        entry.recorded_at.format("%Y-%m-%d %H:%M").to_string(),
        entry.git_branch.as_deref().unwrap_or("-"),
        topic
    )
}

fn format_size(bytes: u64) -> String {
    match bytes {
        b if b >= 1 << 20 => format!("{:.1}M", b as f64 / (1u64 << 20) as f64),
        b if b >= 1 << 10 => format!("{:.1}K", b as f64 / 1024.0),
        b => format!("{b}B"),
    }
}
