//! Delivery of rendered summaries
//!
//! The engine only returns text; a [`Sink`] decides where it goes.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::config::SinkConfig;
use crate::error::{ContextError, Result};

/// Destination for a rendered summary
#[async_trait]
pub trait Sink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, text: &str) -> Result<()>;
}

/// Writes the summary to standard output
#[derive(Debug, Default)]
pub struct StdoutSink;

#[async_trait]
impl Sink for StdoutSink {
    fn name(&self) -> &'static str {
        "stdout"
    }

    async fn deliver(&self, text: &str) -> Result<()> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(text.as_bytes()).await?;
        if !text.ends_with('\n') {
            stdout.write_all(b"\n").await?;
        }
        stdout.flush().await?;
        Ok(())
    }
}

/// Writes the summary to a file, replacing its contents
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Sink for FileSink {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn deliver(&self, text: &str) -> Result<()> {
        tokio::fs::write(&self.path, text).await?;
        info!("Wrote summary to {}", self.path.display());
        Ok(())
    }
}

/// Pipes the summary into the stdin of an external command
///
/// The child inherits the environment and the terminal's stdout/stderr.
#[derive(Debug, Clone)]
pub struct CommandSink {
    program: String,
    args: Vec<String>,
}

impl CommandSink {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &SinkConfig) -> Self {
        Self::new(config.command.clone(), config.args.clone())
    }
}

#[async_trait]
impl Sink for CommandSink {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn deliver(&self, text: &str) -> Result<()> {
        debug!("Spawning {} {}", self.program, self.args.join(" "));

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| ContextError::Sink(format!("failed to start {}: {e}", self.program)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ContextError::Sink("child stdin unavailable".to_string()))?;
        let written = async {
            stdin.write_all(text.as_bytes()).await?;
            stdin.flush().await
        }
        .await;
        drop(stdin);

        let status = child.wait().await?;
        if let Err(e) = written {
            // A broken pipe is only an error when the child still reports success
            if status.success() {
                return Err(ContextError::Sink(format!(
                    "failed to write to {}: {e}",
                    self.program
                )));
            }
        }

        if !status.success() {
            error!("{} exited with {}", self.program, status);
            return Err(ContextError::Sink(format!(
                "{} exited with {}",
                self.program, status
            )));
        }

        info!("Delivered summary to {}", self.program);
        Ok(())
    }
}
