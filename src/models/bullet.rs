//! Bullet types and identifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a bullet within its store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BulletId(String);

impl BulletId {
    /// Creates a new bullet ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh, time-ordered bullet ID.
    ///
    /// UUIDv7 ids sort by creation time, which makes "lowest id" a stable
    /// oldest-first choice for merge survivors.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BulletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for BulletId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for BulletId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Confidence tier of a bullet.
///
/// Bullets climb `candidate → established → proven` as positive feedback
/// accumulates; `deprecated` is the terminal tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Maturity {
    /// Newly added, not yet enough feedback to trust.
    #[default]
    Candidate,
    /// Enough feedback to act on.
    Established,
    /// Consistently helpful with negligible harm.
    Proven,
    /// Retired; excluded from active views.
    Deprecated,
}

impl Maturity {
    /// Returns the tier as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Candidate => "candidate",
            Self::Established => "established",
            Self::Proven => "proven",
            Self::Deprecated => "deprecated",
        }
    }

    /// Returns the rank of this tier along the upgrade path.
    ///
    /// `deprecated` has no rank; it sits outside the upgrade lattice.
    #[must_use]
    pub const fn rank(&self) -> Option<u8> {
        match self {
            Self::Candidate => Some(0),
            Self::Established => Some(1),
            Self::Proven => Some(2),
            Self::Deprecated => None,
        }
    }

    /// Parses a tier string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "candidate" => Some(Self::Candidate),
            "established" => Some(Self::Established),
            "proven" => Some(Self::Proven),
            "deprecated" => Some(Self::Deprecated),
            _ => None,
        }
    }
}

impl fmt::Display for Maturity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The kind of rule a bullet expresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulletKind {
    /// A positive behavioral rule (default).
    #[default]
    WorkflowRule,
    /// A project or team convention.
    Convention,
    /// A negative rule advising against a behavior.
    AntiPattern,
}

impl BulletKind {
    /// Returns the kind as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::WorkflowRule => "workflow_rule",
            Self::Convention => "convention",
            Self::AntiPattern => "anti_pattern",
        }
    }
}

impl fmt::Display for BulletKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which store a bullet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// The user-wide store.
    #[default]
    Global,
    /// A repository-local store.
    Workspace,
}

impl Scope {
    /// Returns the scope as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Workspace => "workspace",
        }
    }

    /// Parses a scope string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "global" => Some(Self::Global),
            "workspace" | "repo" | "project" => Some(Self::Workspace),
            _ => None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The polarity of a feedback event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    /// The rule helped.
    Helpful,
    /// The rule hurt.
    Harmful,
}

impl FeedbackKind {
    /// Returns the feedback kind as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Helpful => "helpful",
            Self::Harmful => "harmful",
        }
    }
}

/// A single observation that a bullet helped or hurt.
///
/// The timestamp is kept as the raw RFC 3339 string from the document:
/// feedback arrives from untrusted, LLM-generated deltas, and scoring must
/// fail safe (decayed value 0) on an unparseable timestamp rather than
/// rejecting the whole store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEvent {
    /// The polarity of the event.
    pub kind: FeedbackKind,
    /// RFC 3339 timestamp of the observation.
    pub timestamp: String,
    /// Optional reason, typically present on harmful events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// The session the observation came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    /// Decayed value snapshot recorded at creation, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_value: Option<f64>,
}

impl FeedbackEvent {
    /// Creates a feedback event stamped with the given time.
    #[must_use]
    pub fn new(kind: FeedbackKind, at: DateTime<Utc>) -> Self {
        Self {
            kind,
            timestamp: at.to_rfc3339(),
            reason: None,
            session: None,
            recorded_value: None,
        }
    }

    /// Sets the reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets the source session.
    #[must_use]
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }
}

/// A single rule or anti-pattern entry in a playbook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bullet {
    /// Unique identifier within the store.
    pub id: BulletId,
    /// The rule content.
    pub content: String,
    /// Free-form category (e.g. "testing", "git").
    #[serde(default)]
    pub category: String,
    /// The kind of rule.
    #[serde(default)]
    pub kind: BulletKind,
    /// Whether this bullet advises *against* a behavior.
    #[serde(default)]
    pub is_negative: bool,
    /// Which store the bullet belongs to.
    #[serde(default)]
    pub scope: Scope,
    /// Workspace qualifier for workspace-scoped bullets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    /// Current confidence tier.
    #[serde(default)]
    pub maturity: Maturity,
    /// Total helpful observations. Monotonic; decay applies to the scoring
    /// effect of events, never to this counter.
    #[serde(default)]
    pub helpful_count: u32,
    /// Total harmful observations. Monotonic, like `helpful_count`.
    #[serde(default)]
    pub harmful_count: u32,
    /// Ordered feedback history.
    #[serde(default)]
    pub feedback_events: Vec<FeedbackEvent>,
    /// Pinned bullets are immune to automatic demotion, inversion, and
    /// pruning.
    #[serde(default)]
    pub pinned: bool,
    /// Whether the bullet has been retired.
    #[serde(default)]
    pub deprecated: bool,
    /// When the bullet was retired.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated_at: Option<DateTime<Utc>>,
    /// Human-facing reason for the retirement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecation_reason: Option<String>,
    /// Sessions that contributed to this bullet.
    #[serde(default)]
    pub source_sessions: Vec<String>,
    /// Agents that contributed to this bullet.
    #[serde(default)]
    pub source_agents: Vec<String>,
    /// Tags for categorization.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Bullet {
    /// Creates a fresh candidate bullet with zero counters.
    #[must_use]
    pub fn new(id: BulletId, content: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            content: content.into(),
            category: String::new(),
            kind: BulletKind::default(),
            is_negative: false,
            scope: Scope::default(),
            workspace: None,
            maturity: Maturity::Candidate,
            helpful_count: 0,
            harmful_count: 0,
            feedback_events: Vec::new(),
            pinned: false,
            deprecated: false,
            deprecated_at: None,
            deprecation_reason: None,
            source_sessions: Vec::new(),
            source_agents: Vec::new(),
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the bullet participates in active views and curation sweeps.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !self.deprecated
    }

    /// Appends a feedback event and bumps the matching counter.
    pub fn record_feedback(&mut self, event: FeedbackEvent, now: DateTime<Utc>) {
        match event.kind {
            FeedbackKind::Helpful => self.helpful_count = self.helpful_count.saturating_add(1),
            FeedbackKind::Harmful => self.harmful_count = self.harmful_count.saturating_add(1),
        }
        self.feedback_events.push(event);
        self.updated_at = now;
    }

    /// Retires the bullet with the given reason.
    ///
    /// Idempotent: a bullet that is already deprecated keeps its original
    /// timestamp and reason.
    pub fn deprecate(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        if self.deprecated {
            return;
        }
        self.deprecated = true;
        self.maturity = Maturity::Deprecated;
        self.deprecated_at = Some(now);
        self.deprecation_reason = Some(reason.into());
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_bullet_id_preserves_string() {
        let id = BulletId::new("abc-123");
        assert_eq!(id.as_str(), "abc-123");
        assert_eq!(id.to_string(), "abc-123");
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = BulletId::generate();
        let b = BulletId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_maturity_parse_roundtrip() {
        for tier in [
            Maturity::Candidate,
            Maturity::Established,
            Maturity::Proven,
            Maturity::Deprecated,
        ] {
            assert_eq!(Maturity::parse(tier.as_str()), Some(tier));
        }
        assert_eq!(Maturity::parse("unknown"), None);
    }

    #[test]
    fn test_maturity_rank_ordering() {
        assert!(Maturity::Candidate.rank() < Maturity::Established.rank());
        assert!(Maturity::Established.rank() < Maturity::Proven.rank());
        assert_eq!(Maturity::Deprecated.rank(), None);
    }

    #[test]
    fn test_record_feedback_bumps_counters() {
        let t = now();
        let mut bullet = Bullet::new(BulletId::generate(), "run tests", t);
        bullet.record_feedback(FeedbackEvent::new(FeedbackKind::Helpful, t), t);
        bullet.record_feedback(FeedbackEvent::new(FeedbackKind::Harmful, t), t);
        assert_eq!(bullet.helpful_count, 1);
        assert_eq!(bullet.harmful_count, 1);
        assert_eq!(bullet.feedback_events.len(), 2);
    }

    #[test]
    fn test_deprecate_is_idempotent() {
        let t = now();
        let mut bullet = Bullet::new(BulletId::generate(), "rule", t);
        bullet.deprecate("first", t);
        let at = bullet.deprecated_at;
        bullet.deprecate("second", now());
        assert_eq!(bullet.deprecation_reason.as_deref(), Some("first"));
        assert_eq!(bullet.deprecated_at, at);
        assert_eq!(bullet.maturity, Maturity::Deprecated);
    }
}
