//! One lockable playbook store on disk.

use super::document::{load_document, save_document};
use super::lock::with_lock;
use crate::Result;
use crate::models::{BlockedLog, Playbook};
use std::path::{Path, PathBuf};

/// A playbook store rooted at a directory.
///
/// One store owns two documents — the playbook itself and its blocked
/// log — guarded by a single lock file, so a store is one mutual-exclusion
/// unit. The global store lives under the user data directory; a
/// workspace store lives under `.tacit/` at the repository root.
#[derive(Debug, Clone)]
pub struct PlaybookStore {
    dir: PathBuf,
}

impl PlaybookStore {
    /// Playbook document file name.
    pub const PLAYBOOK_FILE: &'static str = "playbook.yaml";
    /// Blocked log document file name.
    pub const BLOCKED_FILE: &'static str = "blocked.yaml";
    /// Lock file name guarding both documents.
    pub const LOCK_FILE: &'static str = "playbook.lock";

    /// Creates a store handle rooted at `dir`. Nothing is touched on disk
    /// until a load or save happens.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The store's root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the playbook document.
    #[must_use]
    pub fn playbook_path(&self) -> PathBuf {
        self.dir.join(Self::PLAYBOOK_FILE)
    }

    /// Path of the blocked log document.
    #[must_use]
    pub fn blocklist_path(&self) -> PathBuf {
        self.dir.join(Self::BLOCKED_FILE)
    }

    /// Path of the lock file guarding this store.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(Self::LOCK_FILE)
    }

    /// Loads the playbook document; an absent file is an empty playbook.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be read or parsed.
    pub fn load(&self) -> Result<Playbook> {
        load_document(&self.playbook_path())
    }

    /// Persists the playbook document atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn save(&self, playbook: &Playbook) -> Result<()> {
        save_document(&self.playbook_path(), playbook)
    }

    /// Loads the blocked log; an absent file is an empty log.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be read or parsed.
    pub fn load_blocklist(&self) -> Result<BlockedLog> {
        load_document(&self.blocklist_path())
    }

    /// Persists the blocked log atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn save_blocklist(&self, log: &BlockedLog) -> Result<()> {
        save_document(&self.blocklist_path(), log)
    }

    /// Runs `f` with a freshly loaded playbook under this store's
    /// exclusive lock, persisting the result afterwards.
    ///
    /// This is the single-store mutation path (manual feedback, forget,
    /// prune). Multi-store mutations go through
    /// [`super::StoreSet::with_stores`], which owns the lock ordering.
    ///
    /// # Errors
    ///
    /// Returns an error if locking, loading, `f`, or saving fails.
    pub fn update<T>(&self, f: impl FnOnce(&mut Playbook) -> Result<T>) -> Result<T> {
        with_lock(&self.lock_path(), || {
            let mut playbook = self.load()?;
            let value = f(&mut playbook)?;
            self.save(&playbook)?;
            Ok(value)
        })
    }
}
