//! Proposed changes to a playbook.

use super::bullet::{BulletId, BulletKind, Scope};
use serde::{Deserialize, Serialize};

/// A draft bullet carried by an add delta.
///
/// Drafts are untrusted LLM output; every field except `content` is
/// optional and defaults are applied when the bullet is instantiated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DraftBullet {
    /// The proposed rule content (required).
    pub content: String,
    /// Free-form category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// The kind of rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<BulletKind>,
    /// Target scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
    /// Workspace qualifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    /// Tags for categorization.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// The agent that produced the observation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_agent: Option<String>,
}

impl DraftBullet {
    /// Creates a draft with just content.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }
}

/// A proposed, provenance-tagged change to a playbook.
///
/// Deltas are produced externally (by the reflector or by manual CLI
/// commands) and are untrusted: `bullet_id` references may be stale or
/// point at the wrong store. The curation pipeline resolves them and
/// records unresolvable references as conflicts rather than errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delta {
    /// Propose a new bullet.
    Add {
        /// The draft bullet.
        draft: DraftBullet,
        /// The session the proposal came from.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_session: Option<String>,
    },
    /// Record that an existing bullet helped.
    Helpful {
        /// The target bullet.
        bullet_id: BulletId,
        /// The session the observation came from.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_session: Option<String>,
    },
    /// Record that an existing bullet hurt.
    Harmful {
        /// The target bullet.
        bullet_id: BulletId,
        /// Why the bullet hurt.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        /// The session the observation came from.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_session: Option<String>,
    },
    /// Rewrite a bullet's content, preserving its feedback history.
    Replace {
        /// The target bullet.
        bullet_id: BulletId,
        /// The replacement content.
        new_content: String,
        /// The session the rewrite came from.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_session: Option<String>,
    },
    /// Combine several bullets into one surviving bullet.
    Merge {
        /// The bullets to merge. All must resolve or the delta conflicts.
        bullet_ids: Vec<BulletId>,
        /// Explicit survivor; lowest id wins when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        survivor: Option<BulletId>,
        /// The session the merge came from.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_session: Option<String>,
    },
}

impl Delta {
    /// Short name of the delta variant, used in logs and metrics labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Helpful { .. } => "helpful",
            Self::Harmful { .. } => "harmful",
            Self::Replace { .. } => "replace",
            Self::Merge { .. } => "merge",
        }
    }

    /// The primary bullet id this delta targets, if any.
    ///
    /// Used by store routing; `Merge` routes on its first id and `Add`
    /// has no target.
    #[must_use]
    pub fn target(&self) -> Option<&BulletId> {
        match self {
            Self::Add { .. } => None,
            Self::Helpful { bullet_id, .. }
            | Self::Harmful { bullet_id, .. }
            | Self::Replace { bullet_id, .. } => Some(bullet_id),
            Self::Merge { bullet_ids, .. } => bullet_ids.first(),
        }
    }

    /// The session this delta came from, if recorded.
    #[must_use]
    pub fn source_session(&self) -> Option<&str> {
        match self {
            Self::Add { source_session, .. }
            | Self::Helpful { source_session, .. }
            | Self::Harmful { source_session, .. }
            | Self::Replace { source_session, .. }
            | Self::Merge { source_session, .. } => source_session.as_deref(),
        }
    }
}
