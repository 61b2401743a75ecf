//! Session discovery on disk
//!
//! Sessions are stored as `<root>/<project>/<uuid>.jsonl`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use super::parser::{parse_timestamp, record_to_turn, TranscriptParser};
use crate::config::SessionsConfig;
use crate::context::models::{Role, Transcript};
use crate::error::{ContextError, Result};

const MAX_SUMMARIES: usize = 3;

/// One discovered session file
#[derive(Debug, Clone, Serialize)]
pub struct SessionEntry {
    pub id: String,
    pub path: PathBuf,
    /// Name of the project directory the session belongs to
    pub project: String,
    pub size_bytes: u64,
    /// Records that become transcript messages when the file is parsed
    pub message_count: usize,
    /// Last modification time of the file
    pub recorded_at: DateTime<Utc>,
    pub first_message_preview: Option<String>,
    /// Distinct summaries generated for the session, oldest first
    pub summaries: Vec<String>,
    /// First git branch recorded in the session
    pub git_branch: Option<String>,
    /// Time between the first and last timestamped record
    pub duration: Option<Duration>,
}

impl SessionEntry {
    /// Coarse, human-readable session length
    pub fn duration_label(&self) -> Option<String> {
        let secs = self.duration?.as_secs();
        Some(match secs {
            s if s >= 86_400 => format!("{}d", s / 86_400),
            s if s >= 3_600 => format!("{}h", s / 3_600),
            s if s >= 60 => format!("{}m", s / 60),
            _ => "<1m".to_string(),
        })
    }
}

/// Lists and loads recorded sessions below a root directory
pub struct FileTranscriptStore {
    root: PathBuf,
    min_size_bytes: u64,
    preview_chars: usize,
    parser: TranscriptParser,
}

impl FileTranscriptStore {
    pub fn new(config: &SessionsConfig, parser: TranscriptParser) -> Self {
        Self {
            root: config.root.clone(),
            min_size_bytes: config.min_size_bytes,
            preview_chars: config.preview_chars,
            parser,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All sessions above the size threshold, newest first
    pub fn list_sessions(&self) -> Result<Vec<SessionEntry>> {
        if !self.root.is_dir() {
            debug!("Session root {} does not exist", self.root.display());
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for path in self.session_paths("*")? {
            match self.describe(&path) {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => {}
                Err(e) => warn!("Skipping session {}: {}", path.display(), e),
            }
        }

        entries.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        debug!(
            "Found {} sessions under {}",
            entries.len(),
            self.root.display()
        );
        Ok(entries)
    }

    /// Load a session by id
    pub fn load_transcript(&self, id: &str) -> Result<Transcript> {
        if Uuid::parse_str(id).is_err() {
            return Err(ContextError::TranscriptNotFound(id.to_string()));
        }
        let path = self
            .session_paths(id)?
            .into_iter()
            .next()
            .ok_or_else(|| ContextError::TranscriptNotFound(id.to_string()))?;
        self.load_path(&path)
    }

    /// Load an explicit session or export file; the file stem becomes the id
    pub fn load_path(&self, path: &Path) -> Result<Transcript> {
        let id = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let bytes = fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                ContextError::TranscriptNotFound(path.display().to_string())
            }
            _ => ContextError::Io(e),
        })?;

        self.parser.parse_bytes(&id, &bytes)
    }

    fn session_paths(&self, stem: &str) -> Result<Vec<PathBuf>> {
        let root = glob::Pattern::escape(&self.root.to_string_lossy());
        let pattern = Path::new(&root).join("*").join(format!("{stem}.jsonl"));
        let paths = glob::glob(&pattern.to_string_lossy())
            .map_err(|e| ContextError::Configuration(format!("invalid session pattern: {e}")))?;

        Ok(paths
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("Unreadable session path: {}", e);
                    None
                }
            })
            .filter(|path| {
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .is_some_and(|s| Uuid::parse_str(s).is_ok())
            })
            .collect())
    }

    fn describe(&self, path: &Path) -> Result<Option<SessionEntry>> {
        let metadata = fs::metadata(path)?;
        if metadata.len() <= self.min_size_bytes {
            return Ok(None);
        }

        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let project = path
            .parent()
            .and_then(Path::file_name)
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let recorded_at = DateTime::<Utc>::from(metadata.modified()?);

        let contents = fs::read_to_string(path)?;
        let scan = self.scan(&contents);

        Ok(Some(SessionEntry {
            id,
            path: path.to_path_buf(),
            project,
            size_bytes: metadata.len(),
            message_count: scan.message_count,
            recorded_at,
            first_message_preview: scan.preview,
            summaries: scan.summaries,
            git_branch: scan.git_branch,
            duration: scan.duration,
        }))
    }

    /// Collect listing metadata with the same record rules the parser uses
    fn scan(&self, contents: &str) -> SessionScan {
        let mut scan = SessionScan::default();
        let mut first_seen: Option<DateTime<Utc>> = None;
        let mut last_seen: Option<DateTime<Utc>> = None;

        for line in contents.lines() {
            let Ok(record) = serde_json::from_str::<Value>(line.trim()) else {
                continue;
            };

            if scan.git_branch.is_none() {
                scan.git_branch = record
                    .get("gitBranch")
                    .and_then(Value::as_str)
                    .filter(|branch| !branch.is_empty())
                    .map(str::to_string);
            }
            if let Some(ts) = parse_timestamp(record.get("timestamp")) {
                first_seen.get_or_insert(ts);
                last_seen = Some(ts);
            }

            let Ok(Some((role, _, text))) = record_to_turn(&record) else {
                continue;
            };
            scan.message_count += 1;

            if record.get("type").and_then(Value::as_str) == Some("summary") {
                if scan.summaries.len() < MAX_SUMMARIES && !scan.summaries.contains(&text) {
                    scan.summaries.push(text);
                }
                continue;
            }

            if scan.preview.is_none() && role == Role::User {
                scan.preview = Some(text.split_whitespace().collect::<Vec<_>>().join(" "))
                    .filter(|text| !text.is_empty() && !text.starts_with('['))
                    .map(|text| shorten(&text, self.preview_chars));
            }
        }

        if let (Some(first), Some(last)) = (first_seen, last_seen) {
            scan.duration = (last - first).to_std().ok();
        }
        scan
    }
}

/// Metadata gathered in one pass over a session file
#[derive(Debug, Default)]
struct SessionScan {
    message_count: usize,
    preview: Option<String>,
    summaries: Vec<String>,
    git_branch: Option<String>,
    duration: Option<Duration>,
}

fn shorten(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::token_estimator::WordBasedEstimator;
    use crate::error::ErrorKind;
    use std::sync::Arc;

    const ID: &str = "3f2b8c1e-4d5a-4b6c-9e7f-0a1b2c3d4e5f";

    fn store(root: &Path) -> FileTranscriptStore {
        let config = SessionsConfig {
            root: root.to_path_buf(),
            min_size_bytes: 64,
            preview_chars: 20,
        };
        FileTranscriptStore::new(
            &config,
            TranscriptParser::new(Arc::new(WordBasedEstimator::default())),
        )
    }

    fn write_session(root: &Path, project: &str, id: &str, user_text: &str) -> PathBuf {
        let dir = root.join(project);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("{id}.jsonl"));
        let body = format!(
            "{}\n{}\n",
            serde_json::json!({"type": "user", "message": {"role": "user", "content": user_text}}),
            serde_json::json!({"type": "assistant", "message": {"role": "assistant", "content": "Sure, looking into it right away."}}),
        );
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_list_sessions_filters_and_describes() {
        let dir = tempfile::tempdir().unwrap();
        write_session(
            dir.path(),
            "-home-me-project",
            ID,
            "Please refactor the whole store module for me",
        );
        write_session(dir.path(), "-home-me-project", "not-a-uuid", "ignored entirely here");
        fs::write(
            dir.path().join("-home-me-project").join("a1b2c3d4-0000-4000-8000-000000000000.jsonl"),
            "{}\n",
        )
        .unwrap();

        let sessions = store(dir.path()).list_sessions().unwrap();
        assert_eq!(sessions.len(), 1);
        let entry = &sessions[0];
        assert_eq!(entry.id, ID);
        assert_eq!(entry.project, "-home-me-project");
        assert_eq!(entry.message_count, 2);
        assert_eq!(entry.first_message_preview.as_deref(), Some("Please refactor t..."));
    }

    #[test]
    fn test_list_sessions_reports_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("proj");
        fs::create_dir_all(&project).unwrap();
        let records = [
            serde_json::json!({"type": "summary", "summary": "Fixing the login flow"}),
            serde_json::json!({"type": "summary", "summary": "Fixing the login flow"}),
            serde_json::json!({
                "type": "user",
                "gitBranch": "feature/login",
                "timestamp": "2025-05-01T10:00:00Z",
                "message": {"role": "user", "content": "Why does the login form reject valid users?"}
            }),
            serde_json::json!({"type": "file-history-snapshot", "snapshot": {}}),
            serde_json::json!({
                "type": "assistant",
                "gitBranch": "main",
                "timestamp": "2025-05-01T12:30:00Z",
                "message": {"role": "assistant", "content": "The session cookie expires too early."}
            }),
        ];
        let body: Vec<String> = records.iter().map(|r| r.to_string()).collect();
        fs::write(project.join(format!("{ID}.jsonl")), body.join("\n")).unwrap();

        let store = store(dir.path());
        let entry = &store.list_sessions().unwrap()[0];
        assert_eq!(entry.summaries, vec!["Fixing the login flow".to_string()]);
        assert_eq!(entry.git_branch.as_deref(), Some("feature/login"));
        assert_eq!(entry.duration, Some(Duration::from_secs(9_000)));
        assert_eq!(entry.duration_label().as_deref(), Some("2h"));

        // The listing counts exactly the records the parser keeps
        let transcript = store.load_transcript(ID).unwrap();
        assert_eq!(entry.message_count, transcript.len());
        assert_eq!(entry.message_count, 4);
    }

    #[test]
    fn test_root_with_glob_characters() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("sessions [backup]*");
        write_session(&root, "proj", ID, "hello from an odd directory name");

        let store = store(&root);
        assert_eq!(store.list_sessions().unwrap().len(), 1);
        assert_eq!(store.load_transcript(ID).unwrap().len(), 2);
    }

    #[test]
    fn test_missing_root_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = store(&dir.path().join("absent")).list_sessions().unwrap();
        assert!(sessions.is_empty());
    }

    #[test]
    fn test_load_transcript_by_id() {
        let dir = tempfile::tempdir().unwrap();
        write_session(dir.path(), "proj", ID, "hello there");

        let transcript = store(dir.path()).load_transcript(ID).unwrap();
        assert_eq!(transcript.id(), ID);
        assert_eq!(transcript.len(), 2);

        let err = store(dir.path())
            .load_transcript("00000000-0000-4000-8000-000000000000")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = store(dir.path()).load_transcript("../escape").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_load_path_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = store(dir.path())
            .load_path(&dir.path().join("gone.jsonl"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
