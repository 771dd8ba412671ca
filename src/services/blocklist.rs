//! Blocked-content filtering.
//!
//! When a human rejects a rule (`tacit forget`), its content lands in a
//! blocked log. The filter suppresses recurrence: any bullet whose content
//! matches a blocked entry exactly (normalized hash) or nearly (Jaccard
//! above the threshold) is deprecated on load, and re-proposed adds are
//! caught before deduplication in the curation pipeline.
//!
//! Blocked bullets are marked deprecated but never removed from the store,
//! so an unblock/undo operation can restore them.

use crate::models::{BlockedLog, Playbook};
use crate::similarity::{hash_content, jaccard_similarity};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Deprecation reason recorded on bullets suppressed by the filter.
pub const BLOCKED_CONTENT_REASON: &str = "BLOCKED_CONTENT";

/// Jaccard similarity above which content counts as a near match of a
/// blocked entry.
const BLOCKED_SIMILARITY_THRESHOLD: f64 = 0.85;

/// A compiled view over the applicable blocked logs.
///
/// Entry hashes are precomputed once; membership checks then cost one hash
/// comparison per entry plus a Jaccard pass for non-exact candidates.
#[derive(Debug, Clone, Default)]
pub struct BlockedContentFilter {
    /// `(content_hash, content)` pairs from all applicable logs.
    entries: Vec<(String, String)>,
}

impl BlockedContentFilter {
    /// Builds a filter from the applicable logs (global and, if present,
    /// workspace).
    #[must_use]
    pub fn from_logs<'a>(logs: impl IntoIterator<Item = &'a BlockedLog>) -> Self {
        let entries = logs
            .into_iter()
            .flat_map(|log| &log.entries)
            .map(|entry| (hash_content(&entry.content), entry.content.clone()))
            .collect();
        Self { entries }
    }

    /// Whether the filter has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks content against every blocked entry.
    ///
    /// Returns `true` when the content's normalized hash equals an entry's
    /// hash, or when the Jaccard similarity exceeds the near-match
    /// threshold.
    #[must_use]
    pub fn is_blocked(&self, content: &str) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        let hash = hash_content(content);
        self.entries.iter().any(|(entry_hash, entry_content)| {
            entry_hash == &hash
                || jaccard_similarity(content, entry_content) > BLOCKED_SIMILARITY_THRESHOLD
        })
    }

    /// Deprecates every non-deprecated bullet that matches a blocked entry.
    ///
    /// Runs on load/merge, before deduplication, so previously blocked
    /// content never counts as an active duplicate target. Returns the
    /// number of bullets newly suppressed.
    pub fn apply(&self, playbook: &mut Playbook, now: DateTime<Utc>) -> usize {
        if self.entries.is_empty() {
            return 0;
        }
        let mut suppressed = 0;
        let mut hashes = Vec::new();
        for bullet in &mut playbook.bullets {
            if bullet.deprecated || !self.is_blocked(&bullet.content) {
                continue;
            }
            debug!(bullet_id = %bullet.id, "suppressing blocked content");
            bullet.deprecate(BLOCKED_CONTENT_REASON, now);
            hashes.push(hash_content(&bullet.content));
            suppressed += 1;
        }
        for hash in hashes {
            playbook.record_deprecated_pattern(hash);
        }
        suppressed
    }
}
