//! Time-decayed feedback scoring and the maturity state machine.
//!
//! Every feedback event contributes `0.5 ^ (age_days / half_life)` to its
//! bullet's decayed helpful or harmful count, so old observations fade
//! without ever being deleted. The summary counters on a bullet stay
//! monotonic; only their *effect* on the score decays.
//!
//! Maturity transitions are computed from the decayed counts:
//!
//! ```text
//! candidate ──promotion──▶ established ──promotion──▶ proven
//!     ▲                         │
//!     └───────demotion──────────┘        (deprecated is terminal)
//! ```
//!
//! Promotion is a one-way gate (`check_for_promotion` never demotes);
//! demotion steps down one tier at a time and can escalate to an
//! auto-deprecate sentinel when a bullet's score falls far enough below
//! zero. Pinned bullets are immune to demotion entirely.

use crate::models::{Bullet, FeedbackKind, Maturity};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Seconds per day for age calculation.
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Tolerance for float comparisons against configured thresholds.
///
/// Decay arithmetic accumulates rounding noise; exact equality checks
/// against thresholds would flap.
const THRESHOLD_EPSILON: f64 = 1e-6;

/// Below this, a decayed total is treated as zero feedback.
const TOTAL_EPSILON: f64 = 1e-9;

/// Default decay half-life in days.
pub const DEFAULT_DECAY_HALF_LIFE_DAYS: f64 = 90.0;

/// Default multiplier applied to decayed harmful counts.
pub const DEFAULT_HARMFUL_MULTIPLIER: f64 = 4.0;

/// Default decayed-feedback total required before a bullet can leave
/// `candidate`.
pub const DEFAULT_MIN_FEEDBACK_FOR_ACTIVE: f64 = 3.0;

/// Default decayed helpful count required for `proven`.
pub const DEFAULT_MIN_HELPFUL_FOR_PROVEN: f64 = 10.0;

/// Default harmful ratio ceiling for `proven`.
pub const DEFAULT_MAX_HARMFUL_RATIO_FOR_PROVEN: f64 = 0.1;

/// Default effective-score threshold below which a bullet auto-deprecates.
pub const DEFAULT_PRUNE_HARMFUL_THRESHOLD: f64 = 3.0;

/// Default staleness horizon in days.
pub const DEFAULT_STALE_DAYS: i64 = 90;

/// Scoring model configuration.
///
/// Mirrors the `[scoring]` section of `tacit.toml`; the
/// `prune_harmful_threshold` key is accepted at the top level of the config
/// file for compatibility and folded in here.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Days for a feedback event's contribution to halve.
    pub decay_half_life_days: f64,
    /// Weight of decayed harmful counts relative to helpful ones.
    pub harmful_multiplier: f64,
    /// Decayed total feedback required to leave `candidate`.
    pub min_feedback_for_active: f64,
    /// Decayed helpful count required for `proven`.
    pub min_helpful_for_proven: f64,
    /// Harmful ratio ceiling for `proven`.
    pub max_harmful_ratio_for_proven: f64,
    /// Effective score below `-threshold` triggers auto-deprecation.
    pub prune_harmful_threshold: f64,
    /// Days without feedback before a bullet counts as stale.
    pub stale_days: i64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            decay_half_life_days: DEFAULT_DECAY_HALF_LIFE_DAYS,
            harmful_multiplier: DEFAULT_HARMFUL_MULTIPLIER,
            min_feedback_for_active: DEFAULT_MIN_FEEDBACK_FOR_ACTIVE,
            min_helpful_for_proven: DEFAULT_MIN_HELPFUL_FOR_PROVEN,
            max_harmful_ratio_for_proven: DEFAULT_MAX_HARMFUL_RATIO_FOR_PROVEN,
            prune_harmful_threshold: DEFAULT_PRUNE_HARMFUL_THRESHOLD,
            stale_days: DEFAULT_STALE_DAYS,
        }
    }
}

/// Decayed feedback sums for one bullet.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DecayedCounts {
    /// Sum of decayed helpful event values.
    pub helpful: f64,
    /// Sum of decayed harmful event values.
    pub harmful: f64,
}

impl DecayedCounts {
    /// Total decayed feedback.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.helpful + self.harmful
    }

    /// Fraction of decayed feedback that is harmful; 0 when the total is
    /// effectively zero.
    #[must_use]
    pub fn harmful_ratio(&self) -> f64 {
        let total = self.total();
        if total <= TOTAL_EPSILON {
            0.0
        } else {
            self.harmful / total
        }
    }
}

/// Outcome of a demotion check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemotionOutcome {
    /// Keep the given tier (possibly one step below the current one).
    Tier(Maturity),
    /// The bullet's score is so negative it should be retired outright.
    AutoDeprecate,
}

/// Computes the decayed contribution of a single feedback event.
///
/// Returns `0.5 ^ (max(0, age_days) / half_life_days)`, in `[0, 1]`.
/// Future-dated events clamp to age 0 (full value). Fails safe: an
/// unparseable timestamp or a non-positive half-life yields `0.0`,
/// never an error.
#[must_use]
pub fn decayed_value(timestamp: &str, now: DateTime<Utc>, half_life_days: f64) -> f64 {
    if half_life_days <= 0.0 {
        return 0.0;
    }
    let Ok(parsed) = DateTime::parse_from_rfc3339(timestamp) else {
        return 0.0;
    };
    let age_seconds = (now - parsed.with_timezone(&Utc)).num_seconds();
    #[allow(clippy::cast_precision_loss)]
    let age_days = (age_seconds.max(0) as f64) / SECONDS_PER_DAY;
    0.5_f64.powf(age_days / half_life_days)
}

/// Sums decayed values over a bullet's feedback history.
#[must_use]
pub fn decayed_counts(bullet: &Bullet, now: DateTime<Utc>, config: &ScoringConfig) -> DecayedCounts {
    let mut counts = DecayedCounts::default();
    for event in &bullet.feedback_events {
        let value = decayed_value(&event.timestamp, now, config.decay_half_life_days);
        match event.kind {
            FeedbackKind::Helpful => counts.helpful += value,
            FeedbackKind::Harmful => counts.harmful += value,
        }
    }
    counts
}

/// Multiplier applied to a bullet's raw score based on its tier.
#[must_use]
pub const fn maturity_multiplier(maturity: Maturity) -> f64 {
    match maturity {
        Maturity::Candidate => 0.5,
        Maturity::Established => 1.0,
        Maturity::Proven => 1.5,
        Maturity::Deprecated => 0.0,
    }
}

/// Computes a bullet's effective score.
///
/// `(decayed_helpful - harmful_multiplier * decayed_harmful) * tier_multiplier`.
/// There is no floor at zero; a persistently harmful bullet goes strongly
/// negative.
#[must_use]
pub fn effective_score(bullet: &Bullet, now: DateTime<Utc>, config: &ScoringConfig) -> f64 {
    let counts = decayed_counts(bullet, now, config);
    (counts.helpful - config.harmful_multiplier * counts.harmful)
        * maturity_multiplier(bullet.maturity)
}

/// Classifies the tier a bullet's decayed counts currently justify.
///
/// Deterministic and *not* monotonic with the bullet's current tier; the
/// promotion/demotion gates below decide which transitions are allowed.
#[must_use]
pub fn maturity_state(bullet: &Bullet, now: DateTime<Utc>, config: &ScoringConfig) -> Maturity {
    if bullet.maturity == Maturity::Deprecated {
        return Maturity::Deprecated;
    }

    let counts = decayed_counts(bullet, now, config);
    let total = counts.total();
    let ratio = counts.harmful_ratio();

    if ratio > 0.3 && total >= config.min_feedback_for_active - THRESHOLD_EPSILON {
        return Maturity::Deprecated;
    }
    if total < config.min_feedback_for_active - THRESHOLD_EPSILON {
        return Maturity::Candidate;
    }
    if counts.helpful >= config.min_helpful_for_proven - THRESHOLD_EPSILON
        && ratio < config.max_harmful_ratio_for_proven
    {
        return Maturity::Proven;
    }
    Maturity::Established
}

/// One-way upgrade gate.
///
/// `proven` and `deprecated` are terminal inputs, returned unchanged.
/// Otherwise the classified state is adopted only when it is strictly an
/// upgrade along `candidate → established → proven`; any other result,
/// including a would-be demotion, is ignored.
#[must_use]
pub fn check_for_promotion(bullet: &Bullet, now: DateTime<Utc>, config: &ScoringConfig) -> Maturity {
    let current = bullet.maturity;
    if matches!(current, Maturity::Proven | Maturity::Deprecated) {
        return current;
    }

    let classified = maturity_state(bullet, now, config);
    match (current.rank(), classified.rank()) {
        (Some(from), Some(to)) if to > from => classified,
        _ => current,
    }
}

/// Demotion and auto-deprecation gate.
///
/// Pinned bullets always keep their current tier. Otherwise the effective
/// score decides: below `-prune_harmful_threshold` the sentinel
/// [`DemotionOutcome::AutoDeprecate`] is returned; below zero the bullet
/// steps down exactly one tier (`candidate` has nowhere further to go);
/// a non-negative score keeps the current tier.
#[must_use]
pub fn check_for_demotion(
    bullet: &Bullet,
    now: DateTime<Utc>,
    config: &ScoringConfig,
) -> DemotionOutcome {
    let current = bullet.maturity;
    if bullet.pinned {
        return DemotionOutcome::Tier(current);
    }

    let score = effective_score(bullet, now, config);
    if score < -config.prune_harmful_threshold {
        return DemotionOutcome::AutoDeprecate;
    }
    if score < 0.0 {
        let demoted = match current {
            Maturity::Proven => Maturity::Established,
            Maturity::Established => Maturity::Candidate,
            Maturity::Candidate | Maturity::Deprecated => current,
        };
        return DemotionOutcome::Tier(demoted);
    }
    DemotionOutcome::Tier(current)
}

/// Whether a bullet has gone stale.
///
/// True when the bullet has no feedback and was created more than
/// `stale_days` ago, or when its most recent feedback is older than
/// `stale_days`. Unparseable event timestamps are ignored; if none parse,
/// the creation time is used.
#[must_use]
pub fn is_stale(bullet: &Bullet, now: DateTime<Utc>, stale_days: i64) -> bool {
    let horizon = now - chrono::Duration::days(stale_days);
    let newest_feedback = bullet
        .feedback_events
        .iter()
        .filter_map(|e| DateTime::parse_from_rfc3339(&e.timestamp).ok())
        .map(|t| t.with_timezone(&Utc))
        .max();

    newest_feedback.map_or_else(|| bullet.created_at < horizon, |newest| newest < horizon)
}

/// Bullet counts bucketed by effective score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreDistribution {
    /// Score >= 10.
    pub excellent: usize,
    /// Score >= 5.
    pub good: usize,
    /// Score >= 0.
    pub neutral: usize,
    /// Score < 0.
    pub at_risk: usize,
}

/// Buckets bullets by effective score.
#[must_use]
pub fn analyze_score_distribution(
    bullets: &[Bullet],
    now: DateTime<Utc>,
    config: &ScoringConfig,
) -> ScoreDistribution {
    let mut dist = ScoreDistribution::default();
    for bullet in bullets {
        let score = effective_score(bullet, now, config);
        if score >= 10.0 {
            dist.excellent += 1;
        } else if score >= 5.0 {
            dist.good += 1;
        } else if score >= 0.0 {
            dist.neutral += 1;
        } else {
            dist.at_risk += 1;
        }
    }
    dist
}
