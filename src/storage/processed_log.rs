//! Per-workspace processed-session log.
//!
//! Reflection runs for one workspace are serialized by the lock on this
//! log, and the log itself is what makes discovery incremental: sessions
//! recorded here are never reflected on again. The log is persisted after
//! every session unit, so a crash mid-batch loses at most the in-memory
//! deltas of the unfinished batch, never prior progress.

use super::document::{load_document, save_document};
use crate::Result;
use crate::similarity::hash_content;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A processed session unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedEntry {
    /// The session path or identifier.
    pub session: String,
    /// When the session was processed.
    pub processed_at: DateTime<Utc>,
    /// Number of deltas the reflector produced for it.
    pub deltas: usize,
    /// Optional note (e.g. why the session was skipped).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// The processed-log document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessedLog {
    /// Processed session entries, oldest first.
    #[serde(default)]
    pub entries: Vec<ProcessedEntry>,
}

impl ProcessedLog {
    /// Whether a session has already been processed.
    #[must_use]
    pub fn contains(&self, session: &str) -> bool {
        self.entries.iter().any(|e| e.session == session)
    }

    /// Records a processed session.
    pub fn record(&mut self, session: impl Into<String>, deltas: usize, note: Option<String>) {
        self.entries.push(ProcessedEntry {
            session: session.into(),
            processed_at: Utc::now(),
            deltas,
            note,
        });
    }

    /// The set of processed session identifiers.
    #[must_use]
    pub fn processed_sessions(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.session.clone()).collect()
    }
}

/// On-disk handle for a workspace's processed log.
#[derive(Debug, Clone)]
pub struct ProcessedLogStore {
    path: PathBuf,
}

impl ProcessedLogStore {
    /// Creates the log store for a workspace, keyed by a hash of the
    /// resolved workspace path so unrelated checkouts never share a log.
    #[must_use]
    pub fn for_workspace(data_dir: &Path, workspace: &Path) -> Self {
        let key = hash_content(&workspace.display().to_string());
        Self {
            path: data_dir.join("processed").join(format!("{key}.yaml")),
        }
    }

    /// The log document path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the lock file serializing reflection runs for this
    /// workspace.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    /// Loads the log; an absent file is an empty log.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be read or parsed.
    pub fn load(&self) -> Result<ProcessedLog> {
        load_document(&self.path)
    }

    /// Persists the log atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn save(&self, log: &ProcessedLog) -> Result<()> {
        save_document(&self.path, log)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_keys_differ() {
        let dir = tempfile::tempdir().unwrap();
        let a = ProcessedLogStore::for_workspace(dir.path(), Path::new("/repo/a"));
        let b = ProcessedLogStore::for_workspace(dir.path(), Path::new("/repo/b"));
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn test_record_and_contains() {
        let mut log = ProcessedLog::default();
        assert!(!log.contains("sessions/one.jsonl"));
        log.record("sessions/one.jsonl", 3, None);
        assert!(log.contains("sessions/one.jsonl"));
        assert_eq!(log.entries[0].deltas, 3);
    }

    #[test]
    fn test_persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProcessedLogStore::for_workspace(dir.path(), Path::new("/repo/x"));

        let mut log = store.load().unwrap();
        log.record("sessions/one.jsonl", 0, Some("below minimum length".to_string()));
        store.save(&log).unwrap();

        let reloaded = store.load().unwrap();
        assert!(reloaded.contains("sessions/one.jsonl"));
        assert_eq!(
            reloaded.entries[0].note.as_deref(),
            Some("below minimum length")
        );
    }
}
