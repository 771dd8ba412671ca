//! Delta curation pipeline.
//!
//! Applies a batch of proposed deltas to one playbook, then runs the
//! maintenance sweep (promotion, demotion, anti-pattern inversion). Deltas
//! apply in list order and each sees the previous delta's effect; there is
//! no transactional rollback, so a batch reports partial success through
//! [`CurationResult`] counters instead of failing as a whole.

use crate::models::{
    Bullet, BulletId, Conflict, CurationResult, Delta, DraftBullet, FeedbackEvent, FeedbackKind,
    Inversion, Maturity, Playbook,
};
use crate::scoring::{self, DemotionOutcome, ScoringConfig};
use crate::services::blocklist::{BLOCKED_CONTENT_REASON, BlockedContentFilter};
use crate::similarity::{hash_content, jaccard_similarity};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Instant;
use tracing::{debug, instrument};

/// Content prefix given to bullets created by anti-pattern inversion.
pub const ANTI_PATTERN_PREFIX: &str = "AVOID: ";

/// Default Jaccard similarity above which an add is a duplicate.
pub const DEFAULT_DEDUP_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Harmful feedback events required before an auto-deprecated bullet is
/// eligible for inversion.
const MIN_HARMFUL_EVENTS_FOR_INVERSION: u32 = 3;

/// Curation pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CurationConfig {
    /// Jaccard similarity above which an add delta is skipped as a
    /// duplicate of an existing active bullet.
    pub dedup_similarity_threshold: f64,
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            dedup_similarity_threshold: DEFAULT_DEDUP_SIMILARITY_THRESHOLD,
        }
    }
}

/// Service that applies delta batches to playbooks.
#[derive(Debug, Clone, Default)]
pub struct CurationService {
    scoring: ScoringConfig,
    curation: CurationConfig,
}

impl CurationService {
    /// Creates a curation service with the given configuration.
    #[must_use]
    pub const fn new(scoring: ScoringConfig, curation: CurationConfig) -> Self {
        Self { scoring, curation }
    }

    /// Applies a delta batch and runs the maintenance sweep, stamped with
    /// the current time.
    pub fn curate(
        &self,
        playbook: &mut Playbook,
        deltas: &[Delta],
        blocklist: &BlockedContentFilter,
    ) -> CurationResult {
        self.curate_at(playbook, deltas, blocklist, Utc::now())
    }

    /// Applies a delta batch and runs the maintenance sweep at an explicit
    /// time.
    ///
    /// An empty batch still runs the sweep: decay is a function of wall
    /// clock, so tier transitions can happen with zero new deltas.
    #[instrument(
        name = "playbook.curate",
        skip(self, playbook, deltas, blocklist),
        fields(deltas = deltas.len(), bullets = playbook.bullets.len())
    )]
    pub fn curate_at(
        &self,
        playbook: &mut Playbook,
        deltas: &[Delta],
        blocklist: &BlockedContentFilter,
        now: DateTime<Utc>,
    ) -> CurationResult {
        let start = Instant::now();
        let mut result = CurationResult::default();

        // The blocked-content filter runs before deduplication so blocked
        // bullets never count as active duplicate targets.
        let suppressed = blocklist.apply(playbook, now);
        if suppressed > 0 {
            debug!(suppressed, "blocked-content filter suppressed bullets on load");
        }

        for delta in deltas {
            metrics::counter!("playbook_deltas_total", "kind" => delta.kind()).increment(1);
            match delta {
                Delta::Add {
                    draft,
                    source_session,
                } => self.apply_add(playbook, draft, source_session.as_deref(), blocklist, now, &mut result),
                Delta::Helpful {
                    bullet_id,
                    source_session,
                } => self.apply_feedback(
                    playbook,
                    bullet_id,
                    FeedbackKind::Helpful,
                    None,
                    source_session.as_deref(),
                    now,
                    &mut result,
                ),
                Delta::Harmful {
                    bullet_id,
                    reason,
                    source_session,
                } => self.apply_feedback(
                    playbook,
                    bullet_id,
                    FeedbackKind::Harmful,
                    reason.as_deref(),
                    source_session.as_deref(),
                    now,
                    &mut result,
                ),
                Delta::Replace {
                    bullet_id,
                    new_content,
                    ..
                } => Self::apply_replace(playbook, bullet_id, new_content, now, &mut result),
                Delta::Merge {
                    bullet_ids,
                    survivor,
                    ..
                } => Self::apply_merge(playbook, bullet_ids, survivor.as_ref(), now, &mut result),
            }
        }

        self.maintenance_sweep(playbook, now, &mut result);

        metrics::histogram!("playbook_curation_duration_ms")
            .record(start.elapsed().as_secs_f64() * 1000.0);
        result
    }

    /// Hard-removes retired bullets that have proven harmful.
    ///
    /// This is the explicit prune operation; the maintenance sweep never
    /// hard-removes. A bullet is pruned when it is deprecated, not pinned,
    /// and its raw decayed score (helpful minus weighted harmful, without
    /// the maturity multiplier — deprecated bullets carry a zero
    /// multiplier) is below `-prune_harmful_threshold`. Returns a result
    /// whose `pruned` field counts the removals.
    pub fn prune(&self, playbook: &mut Playbook) -> CurationResult {
        self.prune_at(playbook, Utc::now())
    }

    /// [`Self::prune`] at an explicit time.
    pub fn prune_at(&self, playbook: &mut Playbook, now: DateTime<Utc>) -> CurationResult {
        let scoring = &self.scoring;
        let threshold = scoring.prune_harmful_threshold;
        let before = playbook.bullets.len();
        playbook.bullets.retain(|bullet| {
            if !bullet.deprecated || bullet.pinned {
                return true;
            }
            let counts = scoring::decayed_counts(bullet, now, scoring);
            let raw = counts.helpful - scoring.harmful_multiplier * counts.harmful;
            let prune = raw < -threshold;
            if prune {
                debug!(bullet_id = %bullet.id, raw_score = raw, "pruning harmful bullet");
            }
            !prune
        });

        CurationResult {
            pruned: before - playbook.bullets.len(),
            ..CurationResult::default()
        }
    }

    /// Handles an add delta: dedup, blocked-content check, instantiate.
    fn apply_add(
        &self,
        playbook: &mut Playbook,
        draft: &DraftBullet,
        source_session: Option<&str>,
        blocklist: &BlockedContentFilter,
        now: DateTime<Utc>,
        result: &mut CurationResult,
    ) {
        let hash = hash_content(&draft.content);

        let duplicate = playbook.active().any(|b| hash_content(&b.content) == hash)
            || playbook.active().any(|b| {
                jaccard_similarity(&b.content, &draft.content)
                    > self.curation.dedup_similarity_threshold
            });
        if duplicate {
            debug!(content_hash = %hash, "skipping duplicate add");
            result.skipped += 1;
            return;
        }

        let mut bullet = instantiate(draft, source_session, now);
        if blocklist.is_blocked(&draft.content) {
            // Blocked content is appended rather than dropped so provenance
            // survives for a later unblock.
            bullet.deprecate(BLOCKED_CONTENT_REASON, now);
            playbook.record_deprecated_pattern(hash);
            playbook.bullets.push(bullet);
            result.skipped += 1;
            return;
        }

        playbook.bullets.push(bullet);
        result.applied += 1;
    }

    /// Handles helpful/harmful deltas: record the event and recompute the
    /// tier through the promotion gate first, then the demotion gate.
    #[allow(clippy::too_many_arguments)]
    fn apply_feedback(
        &self,
        playbook: &mut Playbook,
        bullet_id: &BulletId,
        kind: FeedbackKind,
        reason: Option<&str>,
        source_session: Option<&str>,
        now: DateTime<Utc>,
        result: &mut CurationResult,
    ) {
        let Some(bullet) = playbook.find_mut(bullet_id) else {
            result.conflicts.push(Conflict {
                bullet_id: bullet_id.clone(),
                delta_kind: kind.as_str().to_string(),
            });
            return;
        };

        let mut event = FeedbackEvent::new(kind, now);
        if let Some(reason) = reason {
            event = event.with_reason(reason);
        }
        if let Some(session) = source_session {
            event = event.with_session(session);
            if !bullet.source_sessions.iter().any(|s| s == session) {
                bullet.source_sessions.push(session.to_string());
            }
        }
        bullet.record_feedback(event, now);

        let promoted = scoring::check_for_promotion(bullet, now, &self.scoring);
        if promoted != bullet.maturity {
            bullet.maturity = promoted;
        } else if let DemotionOutcome::Tier(tier) =
            scoring::check_for_demotion(bullet, now, &self.scoring)
        {
            // The auto-deprecate sentinel is deliberately not acted on
            // here: the maintenance sweep owns deprecation so inversion
            // eligibility is evaluated exactly once per curate call.
            bullet.maturity = tier;
        }

        result.applied += 1;
    }

    /// Handles a replace delta: new content, history preserved.
    fn apply_replace(
        playbook: &mut Playbook,
        bullet_id: &BulletId,
        new_content: &str,
        now: DateTime<Utc>,
        result: &mut CurationResult,
    ) {
        let Some(bullet) = playbook.find_mut(bullet_id) else {
            result.conflicts.push(Conflict {
                bullet_id: bullet_id.clone(),
                delta_kind: "replace".to_string(),
            });
            return;
        };
        bullet.content = new_content.to_string();
        bullet.updated_at = now;
        result.applied += 1;
    }

    /// Handles a merge delta: all ids must resolve or the whole delta
    /// conflicts; no partial merge.
    fn apply_merge(
        playbook: &mut Playbook,
        bullet_ids: &[BulletId],
        survivor: Option<&BulletId>,
        now: DateTime<Utc>,
        result: &mut CurationResult,
    ) {
        if bullet_ids.len() < 2 {
            if let Some(id) = bullet_ids.first() {
                result.conflicts.push(Conflict {
                    bullet_id: id.clone(),
                    delta_kind: "merge".to_string(),
                });
            }
            return;
        }
        if let Some(missing) = bullet_ids.iter().find(|id| !playbook.contains(id)) {
            result.conflicts.push(Conflict {
                bullet_id: missing.clone(),
                delta_kind: "merge".to_string(),
            });
            return;
        }

        let survivor_id = match survivor {
            Some(id) if bullet_ids.contains(id) => id.clone(),
            // An explicit survivor outside the merge set is a stale
            // reference; treat the delta as unresolvable.
            Some(id) => {
                result.conflicts.push(Conflict {
                    bullet_id: id.clone(),
                    delta_kind: "merge".to_string(),
                });
                return;
            },
            None => match bullet_ids.iter().min() {
                Some(id) => id.clone(),
                None => return,
            },
        };

        let mut events = Vec::new();
        let mut tags = Vec::new();
        let mut sessions = Vec::new();
        let mut agents = Vec::new();
        let mut helpful = 0_u32;
        let mut harmful = 0_u32;

        for id in bullet_ids {
            if id == &survivor_id {
                continue;
            }
            if let Some(other) = playbook.find_mut(id) {
                events.append(&mut other.feedback_events.clone());
                tags.extend(other.tags.iter().cloned());
                sessions.extend(other.source_sessions.iter().cloned());
                agents.extend(other.source_agents.iter().cloned());
                helpful += other.helpful_count;
                harmful += other.harmful_count;
                other.deprecate(format!("merged into {survivor_id}"), now);
            }
        }

        if let Some(surviving) = playbook.find_mut(&survivor_id) {
            surviving.feedback_events.extend(events);
            for tag in tags {
                if !surviving.tags.contains(&tag) {
                    surviving.tags.push(tag);
                }
            }
            for session in sessions {
                if !surviving.source_sessions.contains(&session) {
                    surviving.source_sessions.push(session);
                }
            }
            for agent in agents {
                if !surviving.source_agents.contains(&agent) {
                    surviving.source_agents.push(agent);
                }
            }
            surviving.helpful_count = surviving.helpful_count.saturating_add(helpful);
            surviving.harmful_count = surviving.harmful_count.saturating_add(harmful);
            surviving.updated_at = now;
        }
        result.applied += 1;
    }

    /// Runs the promotion and demotion/inversion passes over every
    /// non-deprecated bullet. Runs once per curate call, independent of
    /// the delta count.
    fn maintenance_sweep(
        &self,
        playbook: &mut Playbook,
        now: DateTime<Utc>,
        result: &mut CurationResult,
    ) {
        // Promotion pass.
        for bullet in &mut playbook.bullets {
            if bullet.deprecated {
                continue;
            }
            let promoted = scoring::check_for_promotion(bullet, now, &self.scoring);
            if promoted != bullet.maturity {
                debug!(bullet_id = %bullet.id, from = %bullet.maturity, to = %promoted, "promoting");
                bullet.maturity = promoted;
                bullet.updated_at = now;
                result.promotions.push(bullet.id.clone());
            }
        }

        // Demotion / inversion pass. New anti-patterns are collected and
        // appended after the loop so the sweep never observes them.
        let mut inverted = Vec::new();
        let mut retired_hashes = Vec::new();
        for bullet in &mut playbook.bullets {
            if bullet.deprecated || bullet.pinned {
                continue;
            }
            match scoring::check_for_demotion(bullet, now, &self.scoring) {
                DemotionOutcome::Tier(tier) => {
                    if tier != bullet.maturity {
                        debug!(bullet_id = %bullet.id, from = %bullet.maturity, to = %tier, "demoting");
                        bullet.maturity = tier;
                        bullet.updated_at = now;
                    }
                },
                DemotionOutcome::AutoDeprecate => {
                    retired_hashes.push(hash_content(&bullet.content));
                    if eligible_for_inversion(bullet) {
                        let anti = invert(bullet, now);
                        debug!(
                            bullet_id = %bullet.id,
                            anti_id = %anti.id,
                            "inverting harmful rule into anti-pattern"
                        );
                        bullet.deprecate(format!("inverted into anti-pattern {}", anti.id), now);
                        result.inversions.push(Inversion {
                            original_id: bullet.id.clone(),
                            new_id: anti.id.clone(),
                        });
                        inverted.push(anti);
                    } else {
                        debug!(bullet_id = %bullet.id, "auto-deprecating harmful rule");
                        bullet.deprecate("auto-deprecated: harmful feedback outweighs helpful", now);
                        // Soft-deprecation is the sweep's only removal
                        // policy; `pruned` counts hard removals, which
                        // happen solely through the explicit prune
                        // operation.
                    }
                },
            }
        }
        for hash in retired_hashes {
            playbook.record_deprecated_pattern(hash);
        }
        playbook.bullets.extend(inverted);
    }
}

/// Instantiates a draft as a fresh candidate bullet.
fn instantiate(draft: &DraftBullet, source_session: Option<&str>, now: DateTime<Utc>) -> Bullet {
    let mut bullet = Bullet::new(BulletId::generate(), draft.content.clone(), now);
    if let Some(category) = &draft.category {
        bullet.category.clone_from(category);
    }
    if let Some(kind) = draft.kind {
        bullet.kind = kind;
        bullet.is_negative = kind == crate::models::BulletKind::AntiPattern;
    }
    if let Some(scope) = draft.scope {
        bullet.scope = scope;
    }
    bullet.workspace.clone_from(&draft.workspace);
    bullet.tags = draft.tags.clone();
    if let Some(agent) = &draft.source_agent {
        bullet.source_agents.push(agent.clone());
    }
    if let Some(session) = source_session {
        bullet.source_sessions.push(session.to_string());
    }
    bullet
}

/// Whether an auto-deprecated bullet qualifies for anti-pattern inversion:
/// at least three harmful observations, harmful clearly dominating helpful,
/// and not pinned.
fn eligible_for_inversion(bullet: &Bullet) -> bool {
    !bullet.pinned
        && bullet.harmful_count >= MIN_HARMFUL_EVENTS_FOR_INVERSION
        && bullet.harmful_count > 2 * bullet.helpful_count
}

/// Builds the anti-pattern bullet for an inversion.
fn invert(original: &Bullet, now: DateTime<Utc>) -> Bullet {
    let mut anti = Bullet::new(
        BulletId::generate(),
        format!("{ANTI_PATTERN_PREFIX}{}", original.content),
        now,
    );
    anti.kind = crate::models::BulletKind::AntiPattern;
    anti.is_negative = true;
    anti.maturity = Maturity::Candidate;
    anti.category.clone_from(&original.category);
    anti.scope = original.scope;
    anti.workspace.clone_from(&original.workspace);
    anti.tags = original.tags.clone();
    anti.source_sessions = original.source_sessions.clone();
    anti
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::{BlockedEntry, BlockedLog};

    fn service() -> CurationService {
        CurationService::new(ScoringConfig::default(), CurationConfig::default())
    }

    fn add(content: &str) -> Delta {
        Delta::Add {
            draft: DraftBullet::new(content),
            source_session: Some("sessions/test.jsonl".to_string()),
        }
    }

    #[test]
    fn test_add_creates_candidate_bullet() {
        let mut playbook = Playbook::new();
        let result = service().curate(
            &mut playbook,
            &[add("run clippy before committing")],
            &BlockedContentFilter::default(),
        );

        assert_eq!(result.applied, 1);
        assert_eq!(playbook.bullets.len(), 1);
        let bullet = &playbook.bullets[0];
        assert_eq!(bullet.maturity, Maturity::Candidate);
        assert_eq!(bullet.helpful_count, 0);
        assert_eq!(bullet.source_sessions, vec!["sessions/test.jsonl"]);
    }

    #[test]
    fn test_add_skips_exact_duplicate() {
        let mut playbook = Playbook::new();
        let svc = service();
        svc.curate(
            &mut playbook,
            &[add("Run clippy before committing")],
            &BlockedContentFilter::default(),
        );
        let result = svc.curate(
            &mut playbook,
            &[add("run  CLIPPY   before committing")],
            &BlockedContentFilter::default(),
        );

        assert_eq!(result.applied, 0);
        assert_eq!(result.skipped, 1);
        assert_eq!(playbook.bullets.len(), 1);
    }

    #[test]
    fn test_add_skips_near_duplicate() {
        let mut playbook = Playbook::new();
        let svc = service();
        svc.curate(
            &mut playbook,
            &[add("always run the full integration test suite before merging to main")],
            &BlockedContentFilter::default(),
        );
        // Token sets differ by one word: similarity 11/12 > 0.85.
        let result = svc.curate(
            &mut playbook,
            &[add("always run the full integration test suite before merging to main branch")],
            &BlockedContentFilter::default(),
        );

        assert_eq!(result.applied, 0);
        assert_eq!(result.skipped, 1);
    }

    #[test]
    fn test_add_of_blocked_content_is_appended_deprecated() {
        let mut log = BlockedLog::new();
        log.push(BlockedEntry {
            id: "blocked-1".to_string(),
            content: "commit directly to main".to_string(),
            reason: "user rejected".to_string(),
            forgotten_at: Utc::now(),
        });
        let filter = BlockedContentFilter::from_logs([&log]);

        let mut playbook = Playbook::new();
        let result = service().curate(&mut playbook, &[add("commit directly to main")], &filter);

        assert_eq!(result.applied, 0);
        assert_eq!(result.skipped, 1);
        // Appended for provenance, but deprecated.
        assert_eq!(playbook.bullets.len(), 1);
        assert!(playbook.bullets[0].deprecated);
        assert_eq!(
            playbook.bullets[0].deprecation_reason.as_deref(),
            Some(BLOCKED_CONTENT_REASON)
        );
    }

    #[test]
    fn test_feedback_on_missing_bullet_is_conflict() {
        let mut playbook = Playbook::new();
        let result = service().curate(
            &mut playbook,
            &[Delta::Helpful {
                bullet_id: BulletId::new("ghost"),
                source_session: None,
            }],
            &BlockedContentFilter::default(),
        );

        assert_eq!(result.applied, 0);
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].bullet_id.as_str(), "ghost");
    }

    #[test]
    fn test_feedback_appends_event_and_counter() {
        let now = Utc::now();
        let mut playbook = Playbook::new();
        playbook
            .bullets
            .push(Bullet::new(BulletId::new("b-1"), "rule", now));

        let result = service().curate(
            &mut playbook,
            &[Delta::Harmful {
                bullet_id: BulletId::new("b-1"),
                reason: Some("broke the release".to_string()),
                source_session: Some("sessions/a.jsonl".to_string()),
            }],
            &BlockedContentFilter::default(),
        );

        assert_eq!(result.applied, 1);
        let bullet = playbook.find(&BulletId::new("b-1")).unwrap();
        assert_eq!(bullet.harmful_count, 1);
        assert_eq!(bullet.feedback_events.len(), 1);
        assert_eq!(
            bullet.feedback_events[0].reason.as_deref(),
            Some("broke the release")
        );
        assert_eq!(bullet.source_sessions, vec!["sessions/a.jsonl"]);
    }

    #[test]
    fn test_replace_preserves_history() {
        let now = Utc::now();
        let mut playbook = Playbook::new();
        let mut bullet = Bullet::new(BulletId::new("b-1"), "old wording", now);
        bullet.record_feedback(FeedbackEvent::new(FeedbackKind::Helpful, now), now);
        playbook.bullets.push(bullet);

        let result = service().curate(
            &mut playbook,
            &[Delta::Replace {
                bullet_id: BulletId::new("b-1"),
                new_content: "new wording".to_string(),
                source_session: None,
            }],
            &BlockedContentFilter::default(),
        );

        assert_eq!(result.applied, 1);
        let bullet = playbook.find(&BulletId::new("b-1")).unwrap();
        assert_eq!(bullet.content, "new wording");
        assert_eq!(bullet.helpful_count, 1);
        assert_eq!(bullet.feedback_events.len(), 1);
    }

    #[test]
    fn test_merge_requires_all_ids() {
        let now = Utc::now();
        let mut playbook = Playbook::new();
        playbook
            .bullets
            .push(Bullet::new(BulletId::new("b-1"), "a", now));

        let result = service().curate(
            &mut playbook,
            &[Delta::Merge {
                bullet_ids: vec![BulletId::new("b-1"), BulletId::new("ghost")],
                survivor: None,
                source_session: None,
            }],
            &BlockedContentFilter::default(),
        );

        assert_eq!(result.applied, 0);
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].bullet_id.as_str(), "ghost");
        // No partial merge happened.
        assert!(playbook.find(&BulletId::new("b-1")).unwrap().is_active());
    }

    #[test]
    fn test_merge_unions_into_lowest_id() {
        let now = Utc::now();
        let mut playbook = Playbook::new();
        let mut a = Bullet::new(BulletId::new("b-1"), "prefer rebase", now);
        a.tags.push("git".to_string());
        a.record_feedback(FeedbackEvent::new(FeedbackKind::Helpful, now), now);
        let mut b = Bullet::new(BulletId::new("b-2"), "rebase over merge", now);
        b.tags.push("git".to_string());
        b.tags.push("style".to_string());
        b.record_feedback(FeedbackEvent::new(FeedbackKind::Helpful, now), now);
        playbook.bullets.push(a);
        playbook.bullets.push(b);

        let result = service().curate(
            &mut playbook,
            &[Delta::Merge {
                bullet_ids: vec![BulletId::new("b-2"), BulletId::new("b-1")],
                survivor: None,
                source_session: None,
            }],
            &BlockedContentFilter::default(),
        );

        assert_eq!(result.applied, 1);
        let survivor = playbook.find(&BulletId::new("b-1")).unwrap();
        assert!(survivor.is_active());
        assert_eq!(survivor.helpful_count, 2);
        assert_eq!(survivor.feedback_events.len(), 2);
        assert_eq!(survivor.tags, vec!["git", "style"]);

        let merged = playbook.find(&BulletId::new("b-2")).unwrap();
        assert!(merged.deprecated);
        assert_eq!(merged.deprecation_reason.as_deref(), Some("merged into b-1"));
    }

    #[test]
    fn test_sweep_runs_on_empty_batch() {
        let now = Utc::now();
        let mut playbook = Playbook::new();
        let mut bullet = Bullet::new(BulletId::new("b-1"), "solid rule", now);
        for _ in 0..4 {
            bullet.record_feedback(FeedbackEvent::new(FeedbackKind::Helpful, now), now);
        }
        playbook.bullets.push(bullet);

        let result = service().curate(&mut playbook, &[], &BlockedContentFilter::default());
        assert_eq!(result.applied, 0);
        assert_eq!(result.promotions.len(), 1);
        assert_eq!(
            playbook.find(&BulletId::new("b-1")).unwrap().maturity,
            Maturity::Established
        );
    }

    #[test]
    fn test_sweep_inverts_persistently_harmful_rule() {
        let now = Utc::now();
        let mut playbook = Playbook::new();
        let mut bullet = Bullet::new(BulletId::new("b-1"), "force-push to shared branches", now);
        bullet.maturity = Maturity::Established;
        for _ in 0..3 {
            bullet.record_feedback(FeedbackEvent::new(FeedbackKind::Harmful, now), now);
        }
        playbook.bullets.push(bullet);

        let result = service().curate(&mut playbook, &[], &BlockedContentFilter::default());

        assert_eq!(result.inversions.len(), 1);
        let original = playbook.find(&BulletId::new("b-1")).unwrap();
        assert!(original.deprecated);

        let anti = playbook.find(&result.inversions[0].new_id).unwrap();
        assert_eq!(anti.kind, crate::models::BulletKind::AntiPattern);
        assert!(anti.is_negative);
        assert!(anti.content.starts_with(ANTI_PATTERN_PREFIX));
        assert_eq!(anti.maturity, Maturity::Candidate);
        assert_eq!(result.pruned, 0);
    }

    #[test]
    fn test_sweep_soft_deprecates_without_inversion() {
        let now = Utc::now();
        let mut playbook = Playbook::new();
        // Two harmful events: score -8, below the prune threshold, but not
        // enough harmful observations for inversion.
        let mut bullet = Bullet::new(BulletId::new("b-1"), "shaky rule", now);
        bullet.maturity = Maturity::Established;
        for _ in 0..2 {
            bullet.record_feedback(FeedbackEvent::new(FeedbackKind::Harmful, now), now);
        }
        playbook.bullets.push(bullet);

        let result = service().curate(&mut playbook, &[], &BlockedContentFilter::default());

        assert!(result.inversions.is_empty());
        assert_eq!(result.pruned, 0);
        let bullet = playbook.find(&BulletId::new("b-1")).unwrap();
        assert!(bullet.deprecated);
        assert_eq!(playbook.bullets.len(), 1);
    }

    #[test]
    fn test_sweep_pinned_bullets_untouched() {
        let now = Utc::now();
        let mut playbook = Playbook::new();
        let mut bullet = Bullet::new(BulletId::new("b-1"), "protected rule", now);
        bullet.maturity = Maturity::Proven;
        bullet.pinned = true;
        for _ in 0..6 {
            bullet.record_feedback(FeedbackEvent::new(FeedbackKind::Harmful, now), now);
        }
        playbook.bullets.push(bullet);

        let result = service().curate(&mut playbook, &[], &BlockedContentFilter::default());

        assert!(result.inversions.is_empty());
        let bullet = playbook.find(&BulletId::new("b-1")).unwrap();
        assert!(bullet.is_active());
        assert_eq!(bullet.maturity, Maturity::Proven);
    }

    #[test]
    fn test_same_batch_deltas_apply_sequentially() {
        let now = Utc::now();
        let mut playbook = Playbook::new();
        playbook
            .bullets
            .push(Bullet::new(BulletId::new("b-1"), "rule", now));

        let helpful = |_: usize| Delta::Helpful {
            bullet_id: BulletId::new("b-1"),
            source_session: None,
        };
        let result = service().curate(
            &mut playbook,
            &[helpful(0), helpful(1), helpful(2), helpful(3)],
            &BlockedContentFilter::default(),
        );

        assert_eq!(result.applied, 4);
        let bullet = playbook.find(&BulletId::new("b-1")).unwrap();
        assert_eq!(bullet.helpful_count, 4);
        // Promotion happened during feedback application, before the sweep.
        assert_eq!(bullet.maturity, Maturity::Established);
        assert!(result.promotions.is_empty());
    }
}
