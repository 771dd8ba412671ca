//! Domain types for playbooks, bullets, and curation deltas.

mod bullet;
mod curation;
mod delta;
mod playbook;

pub use bullet::{Bullet, BulletId, BulletKind, FeedbackEvent, FeedbackKind, Maturity, Scope};
pub use curation::{Conflict, CurationResult, Inversion};
pub use delta::{Delta, DraftBullet};
pub use playbook::{BlockedEntry, BlockedLog, Playbook, PLAYBOOK_SCHEMA_VERSION};
