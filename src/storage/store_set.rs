//! The global + workspace store pair.
//!
//! Every code path that needs both stores acquires the global lock first
//! and the workspace lock nested inside it. That fixed order is the sole
//! deadlock-avoidance guarantee across concurrent invocations, so it is
//! enforced here structurally: [`StoreSet::with_stores`] is the only way
//! to hold both stores, and callers cannot invert the order.

use super::lock::with_lock;
use super::playbook_file::PlaybookStore;
use crate::Result;
use crate::models::{BlockedLog, Bullet, Delta, Playbook, Scope};

/// The pair of independently-lockable stores for one logical session.
#[derive(Debug, Clone)]
pub struct StoreSet {
    global: PlaybookStore,
    workspace: Option<PlaybookStore>,
}

/// Freshly loaded store contents held inside the nested locks.
///
/// Mutations must be flagged dirty; only dirty stores are rewritten when
/// the guard closes. Routing lives here so the precedence decision (the
/// workspace store wins when an id exists in both) is made in exactly one
/// place.
#[derive(Debug)]
pub struct StoreGuard {
    /// The global playbook.
    pub global: Playbook,
    /// The workspace playbook, when a workspace store exists.
    pub workspace: Option<Playbook>,
    global_dirty: bool,
    workspace_dirty: bool,
}

impl StoreGuard {
    /// Marks the global playbook for persistence.
    pub const fn mark_global_dirty(&mut self) {
        self.global_dirty = true;
    }

    /// Marks the workspace playbook for persistence.
    pub const fn mark_workspace_dirty(&mut self) {
        self.workspace_dirty = true;
    }

    /// Routes a delta to the store that should curate it.
    ///
    /// Id-bearing deltas go to whichever store contains the referenced
    /// bullet, checking the workspace store first. Everything else —
    /// adds, and feedback whose id resolves in neither store — defaults
    /// to the global store; unresolvable ids then surface as conflicts
    /// there rather than being dropped.
    #[must_use]
    pub fn route(&self, delta: &Delta) -> Scope {
        match delta.target() {
            Some(id) => {
                if self.workspace.as_ref().is_some_and(|w| w.contains(id)) {
                    Scope::Workspace
                } else {
                    Scope::Global
                }
            },
            None => match delta {
                Delta::Add { draft, .. } => {
                    if draft.scope == Some(Scope::Workspace) && self.workspace.is_some() {
                        Scope::Workspace
                    } else {
                        Scope::Global
                    }
                },
                _ => Scope::Global,
            },
        }
    }
}

impl StoreSet {
    /// Creates a store set from the global store and an optional
    /// workspace store.
    #[must_use]
    pub const fn new(global: PlaybookStore, workspace: Option<PlaybookStore>) -> Self {
        Self { global, workspace }
    }

    /// The global store handle.
    #[must_use]
    pub const fn global(&self) -> &PlaybookStore {
        &self.global
    }

    /// The workspace store handle, if any.
    #[must_use]
    pub const fn workspace(&self) -> Option<&PlaybookStore> {
        self.workspace.as_ref()
    }

    /// Loads an unlocked, read-only merged view of both playbooks.
    ///
    /// Used as reflector context; staleness is tolerated because the
    /// merge phase reloads fresh state under the locks.
    ///
    /// # Errors
    ///
    /// Returns an error if either document cannot be read.
    pub fn load_merged_snapshot(&self) -> Result<Vec<Bullet>> {
        let mut bullets = self.global.load()?.bullets;
        if let Some(workspace) = &self.workspace {
            bullets.extend(workspace.load()?.bullets);
        }
        Ok(bullets)
    }

    /// Loads the combined blocked logs (global plus workspace).
    ///
    /// # Errors
    ///
    /// Returns an error if either blocked log cannot be read.
    pub fn load_blocklists(&self) -> Result<Vec<BlockedLog>> {
        let mut logs = vec![self.global.load_blocklist()?];
        if let Some(workspace) = &self.workspace {
            logs.push(workspace.load_blocklist()?);
        }
        Ok(logs)
    }

    /// Runs `f` with both playbooks freshly loaded under nested exclusive
    /// locks — global acquired first, workspace inside — then persists
    /// whichever stores `f` marked dirty, still inside the locks.
    ///
    /// Any earlier snapshot is never reused for the mutation; reloading
    /// fresh under the locks is what prevents lost updates between
    /// concurrent invocations.
    ///
    /// # Errors
    ///
    /// Returns an error if locking, loading, `f`, or persistence fails.
    pub fn with_stores<T>(&self, f: impl FnOnce(&mut StoreGuard) -> Result<T>) -> Result<T> {
        with_lock(&self.global.lock_path(), || {
            let run = |this: &Self| -> Result<T> {
                let mut guard = StoreGuard {
                    global: this.global.load()?,
                    workspace: this
                        .workspace
                        .as_ref()
                        .map(PlaybookStore::load)
                        .transpose()?,
                    global_dirty: false,
                    workspace_dirty: false,
                };
                let value = f(&mut guard)?;
                if guard.global_dirty {
                    this.global.save(&guard.global)?;
                }
                if guard.workspace_dirty {
                    if let (Some(store), Some(playbook)) =
                        (this.workspace.as_ref(), guard.workspace.as_ref())
                    {
                        store.save(playbook)?;
                    }
                }
                Ok(value)
            };

            match &self.workspace {
                Some(workspace) => with_lock(&workspace.lock_path(), || run(self)),
                None => run(self),
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::{BulletId, DraftBullet};
    use chrono::Utc;

    fn store_set(dir: &std::path::Path) -> StoreSet {
        StoreSet::new(
            PlaybookStore::new(dir.join("global")),
            Some(PlaybookStore::new(dir.join("workspace"))),
        )
    }

    #[test]
    fn test_dirty_flags_control_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let set = store_set(dir.path());
        let now = Utc::now();

        set.with_stores(|guard| {
            guard
                .global
                .bullets
                .push(Bullet::new(BulletId::new("g-1"), "global rule", now));
            guard.mark_global_dirty();
            if let Some(workspace) = guard.workspace.as_mut() {
                workspace
                    .bullets
                    .push(Bullet::new(BulletId::new("w-1"), "workspace rule", now));
                // Deliberately not marked dirty.
            }
            Ok(())
        })
        .unwrap();

        assert_eq!(set.global().load().unwrap().bullets.len(), 1);
        assert!(set.workspace().unwrap().load().unwrap().bullets.is_empty());
    }

    #[test]
    fn test_route_prefers_workspace_for_shared_ids() {
        let dir = tempfile::tempdir().unwrap();
        let set = store_set(dir.path());
        let now = Utc::now();

        // The same id exists in both stores.
        set.global()
            .update(|p| {
                p.bullets.push(Bullet::new(BulletId::new("dup"), "global copy", now));
                Ok(())
            })
            .unwrap();
        set.workspace()
            .unwrap()
            .update(|p| {
                p.bullets
                    .push(Bullet::new(BulletId::new("dup"), "workspace copy", now));
                Ok(())
            })
            .unwrap();

        set.with_stores(|guard| {
            let delta = Delta::Helpful {
                bullet_id: BulletId::new("dup"),
                source_session: None,
            };
            assert_eq!(guard.route(&delta), Scope::Workspace);

            let unrouted = Delta::Helpful {
                bullet_id: BulletId::new("ghost"),
                source_session: None,
            };
            assert_eq!(guard.route(&unrouted), Scope::Global);

            let add = Delta::Add {
                draft: DraftBullet::new("new rule"),
                source_session: None,
            };
            assert_eq!(guard.route(&add), Scope::Global);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_no_workspace_store() {
        let dir = tempfile::tempdir().unwrap();
        let set = StoreSet::new(PlaybookStore::new(dir.path().join("global")), None);
        set.with_stores(|guard| {
            assert!(guard.workspace.is_none());
            Ok(())
        })
        .unwrap();
    }
}
