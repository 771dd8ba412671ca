//! Curation outcome types.

use super::bullet::BulletId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A delta whose target bullet could not be resolved.
///
/// Conflicts are expected operational outcomes, not errors: deltas are
/// produced against a snapshot that may be stale by the time the merge
/// phase runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    /// The unresolvable bullet id.
    pub bullet_id: BulletId,
    /// The delta variant that referenced it.
    pub delta_kind: String,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} delta: unknown bullet {}", self.delta_kind, self.bullet_id)
    }
}

/// A harmful rule converted into an anti-pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inversion {
    /// The bullet that was deprecated.
    pub original_id: BulletId,
    /// The anti-pattern bullet created in its place.
    pub new_id: BulletId,
}

/// The outcome of applying a delta batch to one playbook.
///
/// There is no transactional rollback: partial application is expected and
/// reported through these counters rather than raised as an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurationResult {
    /// Deltas applied successfully.
    pub applied: usize,
    /// Deltas skipped (duplicates, blocked content).
    pub skipped: usize,
    /// Deltas whose target could not be resolved.
    pub conflicts: Vec<Conflict>,
    /// Bullets that moved up the maturity lattice during the sweep.
    pub promotions: Vec<BulletId>,
    /// Harmful rules converted into anti-patterns during the sweep.
    pub inversions: Vec<Inversion>,
    /// Bullets hard-removed. The maintenance sweep only soft-deprecates,
    /// so this stays zero except for the explicit prune operation.
    pub pruned: usize,
}

impl CurationResult {
    /// One-line human summary.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "applied {}, skipped {}, conflicts {}, promotions {}, inversions {}, pruned {}",
            self.applied,
            self.skipped,
            self.conflicts.len(),
            self.promotions.len(),
            self.inversions.len(),
            self.pruned
        )
    }

    /// Merges another result's counters into this one.
    pub fn absorb(&mut self, other: Self) {
        self.applied += other.applied;
        self.skipped += other.skipped;
        self.conflicts.extend(other.conflicts);
        self.promotions.extend(other.promotions);
        self.inversions.extend(other.inversions);
        self.pruned += other.pruned;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_format() {
        let result = CurationResult {
            applied: 3,
            skipped: 1,
            ..CurationResult::default()
        };
        assert_eq!(
            result.summary(),
            "applied 3, skipped 1, conflicts 0, promotions 0, inversions 0, pruned 0"
        );
    }

    #[test]
    fn test_absorb_accumulates() {
        let mut a = CurationResult {
            applied: 1,
            ..CurationResult::default()
        };
        let b = CurationResult {
            applied: 2,
            skipped: 1,
            promotions: vec![BulletId::new("x")],
            ..CurationResult::default()
        };
        a.absorb(b);
        assert_eq!(a.applied, 3);
        assert_eq!(a.skipped, 1);
        assert_eq!(a.promotions.len(), 1);
    }
}
