//! Session source adapters.
//!
//! The reflection orchestrator consumes past task sessions through the
//! [`SessionSource`] trait: discovery of unprocessed session units and
//! export of a session's transcript text. The default implementation
//! reads transcript files from an agent sessions directory, optionally
//! shelling out to an external exporter command for formats the crate
//! does not parse itself.

use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, warn};

/// Options narrowing session discovery.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    /// Only sessions modified within this many days.
    pub days: Option<u32>,
    /// Maximum number of sessions to return.
    pub max_count: usize,
    /// Only sessions whose path mentions this agent name.
    pub agent: Option<String>,
}

/// A source of task sessions.
pub trait SessionSource {
    /// Lists session identifiers not present in `exclude`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be enumerated.
    fn discover(&self, exclude: &HashSet<String>, options: &DiscoveryOptions)
    -> Result<Vec<String>>;

    /// Exports a session's transcript text; `None` when the session no
    /// longer exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the export itself fails.
    fn export(&self, session: &str) -> Result<Option<String>>;
}

/// Filesystem-backed session source.
///
/// Discovers transcript files under a sessions directory. When an export
/// command is configured (e.g. an external session-search tool), exports
/// shell out to `<command> <path>` and use its stdout; otherwise the file
/// contents are read directly.
#[derive(Debug, Clone)]
pub struct FileSessionSource {
    sessions_dir: PathBuf,
    export_command: Option<String>,
}

impl FileSessionSource {
    /// Creates a source over the given sessions directory.
    #[must_use]
    pub fn new(sessions_dir: impl Into<PathBuf>) -> Self {
        Self {
            sessions_dir: sessions_dir.into(),
            export_command: None,
        }
    }

    /// Sets the external exporter command.
    #[must_use]
    pub fn with_export_command(mut self, command: impl Into<String>) -> Self {
        self.export_command = Some(command.into());
        self
    }

    fn modified_at(path: &std::path::Path) -> Option<DateTime<Utc>> {
        let modified = fs::metadata(path).ok()?.modified().ok()?;
        Some(DateTime::<Utc>::from(modified))
    }

    fn export_via_command(&self, command: &str, session: &str) -> Result<Option<String>> {
        let output = Command::new(command).arg(session).output().map_err(|e| {
            Error::OperationFailed {
                operation: "export_session".to_string(),
                cause: format!("{command} {session}: {e}"),
            }
        })?;
        if !output.status.success() {
            warn!(session, status = %output.status, "session exporter returned non-zero");
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
    }
}

impl SessionSource for FileSessionSource {
    fn discover(
        &self,
        exclude: &HashSet<String>,
        options: &DiscoveryOptions,
    ) -> Result<Vec<String>> {
        if !self.sessions_dir.exists() {
            debug!(dir = %self.sessions_dir.display(), "sessions directory missing");
            return Ok(Vec::new());
        }

        let horizon = options
            .days
            .map(|days| Utc::now() - Duration::days(i64::from(days)));

        let entries = fs::read_dir(&self.sessions_dir).map_err(|e| Error::OperationFailed {
            operation: "discover_sessions".to_string(),
            cause: format!("{}: {e}", self.sessions_dir.display()),
        })?;

        let mut candidates: Vec<(DateTime<Utc>, String)> = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let id = path.display().to_string();
            if exclude.contains(&id) {
                continue;
            }
            if let Some(agent) = &options.agent {
                if !id.contains(agent.as_str()) {
                    continue;
                }
            }
            let Some(modified) = Self::modified_at(&path) else {
                continue;
            };
            if let Some(horizon) = horizon {
                if modified < horizon {
                    continue;
                }
            }
            candidates.push((modified, id));
        }

        candidates.sort();
        let mut sessions: Vec<String> = candidates.into_iter().map(|(_, id)| id).collect();
        if options.max_count > 0 {
            sessions.truncate(options.max_count);
        }
        Ok(sessions)
    }

    fn export(&self, session: &str) -> Result<Option<String>> {
        if let Some(command) = &self.export_command {
            return self.export_via_command(command, session);
        }
        match fs::read_to_string(session) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::OperationFailed {
                operation: "export_session".to_string(),
                cause: format!("{session}: {e}"),
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_excludes_processed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("one.jsonl"), "a").unwrap();
        fs::write(dir.path().join("two.jsonl"), "b").unwrap();

        let source = FileSessionSource::new(dir.path());
        let mut exclude = HashSet::new();
        exclude.insert(dir.path().join("one.jsonl").display().to_string());

        let sessions = source
            .discover(&exclude, &DiscoveryOptions::default())
            .unwrap();
        assert_eq!(sessions.len(), 1);
        assert!(sessions[0].ends_with("two.jsonl"));
    }

    #[test]
    fn test_discover_respects_max_count() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            fs::write(dir.path().join(format!("s{i}.jsonl")), "x").unwrap();
        }
        let source = FileSessionSource::new(dir.path());
        let options = DiscoveryOptions {
            max_count: 2,
            ..DiscoveryOptions::default()
        };
        assert_eq!(source.discover(&HashSet::new(), &options).unwrap().len(), 2);
    }

    #[test]
    fn test_discover_missing_dir_is_empty() {
        let source = FileSessionSource::new("/nonexistent/sessions");
        assert!(
            source
                .discover(&HashSet::new(), &DiscoveryOptions::default())
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_export_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.jsonl");
        fs::write(&path, "transcript text").unwrap();

        let source = FileSessionSource::new(dir.path());
        let exported = source.export(&path.display().to_string()).unwrap();
        assert_eq!(exported.as_deref(), Some("transcript text"));
    }

    #[test]
    fn test_export_missing_file_is_none() {
        let source = FileSessionSource::new("/tmp");
        assert!(source.export("/tmp/definitely-missing.jsonl").unwrap().is_none());
    }
}
