//! Playbook and blocked-content log documents.

use super::bullet::{Bullet, BulletId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current playbook document schema version.
pub const PLAYBOOK_SCHEMA_VERSION: u32 = 2;

/// A whole-document store of bullets.
///
/// Two playbook documents exist per logical session: a global store and an
/// optional workspace store. They are merged read-only for consumption but
/// curated independently for writes. The entire document is read, mutated
/// in memory, and atomically rewritten under an exclusive file lock; there
/// is no partial-document access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playbook {
    /// Document schema version.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// Ordered list of bullets.
    #[serde(default)]
    pub bullets: Vec<Bullet>,
    /// Normalized content hashes of rules that were retired, kept as
    /// document metadata for quick recurrence checks.
    #[serde(default)]
    pub deprecated_patterns: Vec<String>,
}

const fn default_schema_version() -> u32 {
    PLAYBOOK_SCHEMA_VERSION
}

impl Default for Playbook {
    fn default() -> Self {
        Self {
            schema_version: PLAYBOOK_SCHEMA_VERSION,
            bullets: Vec::new(),
            deprecated_patterns: Vec::new(),
        }
    }
}

impl Playbook {
    /// Creates an empty playbook.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Finds a bullet by id.
    #[must_use]
    pub fn find(&self, id: &BulletId) -> Option<&Bullet> {
        self.bullets.iter().find(|b| &b.id == id)
    }

    /// Finds a bullet by id, mutably.
    #[must_use]
    pub fn find_mut(&mut self, id: &BulletId) -> Option<&mut Bullet> {
        self.bullets.iter_mut().find(|b| &b.id == id)
    }

    /// Whether the store contains the given id.
    #[must_use]
    pub fn contains(&self, id: &BulletId) -> bool {
        self.find(id).is_some()
    }

    /// Iterates over non-deprecated bullets.
    pub fn active(&self) -> impl Iterator<Item = &Bullet> {
        self.bullets.iter().filter(|b| b.is_active())
    }

    /// Number of non-deprecated bullets.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    /// Records the content of a retired bullet in the deprecated-pattern
    /// metadata list. Duplicate hashes are not added twice.
    pub fn record_deprecated_pattern(&mut self, content_hash: String) {
        if !self.deprecated_patterns.contains(&content_hash) {
            self.deprecated_patterns.push(content_hash);
        }
    }
}

/// A record of content a human explicitly rejected.
///
/// Blocked entries suppress recurrence of semantically equivalent rules:
/// any bullet whose content matches an entry exactly (by normalized hash)
/// or nearly (by Jaccard similarity) is deprecated on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedEntry {
    /// Entry identifier.
    pub id: String,
    /// The rejected content.
    pub content: String,
    /// Why the content was rejected.
    pub reason: String,
    /// When the content was rejected.
    pub forgotten_at: DateTime<Utc>,
}

/// A whole-document log of blocked content, one per store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedLog {
    /// Document schema version.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// Blocked entries, oldest first.
    #[serde(default)]
    pub entries: Vec<BlockedEntry>,
}

impl Default for BlockedLog {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockedLog {
    /// Creates an empty blocked log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            schema_version: PLAYBOOK_SCHEMA_VERSION,
            entries: Vec::new(),
        }
    }

    /// Appends a blocked entry.
    pub fn push(&mut self, entry: BlockedEntry) {
        self.entries.push(entry);
    }

    /// Whether the log has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::bullet::BulletId;

    #[test]
    fn test_find_and_active() {
        let now = Utc::now();
        let mut playbook = Playbook::new();
        let id = BulletId::generate();
        playbook.bullets.push(Bullet::new(id.clone(), "a", now));
        let mut retired = Bullet::new(BulletId::generate(), "b", now);
        retired.deprecate("obsolete", now);
        playbook.bullets.push(retired);

        assert!(playbook.contains(&id));
        assert_eq!(playbook.active_count(), 1);
        assert_eq!(playbook.bullets.len(), 2);
    }

    #[test]
    fn test_deprecated_patterns_dedup() {
        let mut playbook = Playbook::new();
        playbook.record_deprecated_pattern("abcd".to_string());
        playbook.record_deprecated_pattern("abcd".to_string());
        assert_eq!(playbook.deprecated_patterns.len(), 1);
    }

    #[test]
    fn test_playbook_yaml_roundtrip() {
        let now = Utc::now();
        let mut playbook = Playbook::new();
        playbook
            .bullets
            .push(Bullet::new(BulletId::new("b-1"), "run the linter", now));

        let yaml = serde_yaml_ng::to_string(&playbook).unwrap();
        let parsed: Playbook = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(parsed.schema_version, PLAYBOOK_SCHEMA_VERSION);
        assert_eq!(parsed.bullets.len(), 1);
        assert_eq!(parsed.bullets[0].content, "run the linter");
    }

    #[test]
    fn test_empty_document_defaults() {
        let parsed: Playbook = serde_yaml_ng::from_str("{}").unwrap();
        assert_eq!(parsed.schema_version, PLAYBOOK_SCHEMA_VERSION);
        assert!(parsed.bullets.is_empty());
    }
}
