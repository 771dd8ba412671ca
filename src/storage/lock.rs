//! Advisory file locking.
//!
//! Cross-invocation concurrency is handled entirely through file-system
//! mutual exclusion: each lockable resource has a sibling `.lock` file and
//! mutations happen inside [`with_lock`]. Acquisition blocks until the
//! holder releases; the lock is released on every exit path, including
//! when the critical section returns an error.

use crate::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File};
use std::path::Path;
use tracing::trace;

/// Runs `f` while holding an exclusive advisory lock on `path`.
///
/// The lock file (and its parent directories) are created if missing.
/// Acquisition blocks until the lock is available. Errors from `f`
/// propagate after the lock is released.
///
/// # Errors
///
/// Returns [`Error::Lock`] if the lock file cannot be created or the lock
/// cannot be acquired or released. These are fatal for the invocation and
/// are never downgraded to per-session errors.
pub fn with_lock<T>(path: &Path, f: impl FnOnce() -> Result<T>) -> Result<T> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::Lock {
            path: path.display().to_string(),
            cause: e.to_string(),
        })?;
    }

    let file = File::create(path).map_err(|e| Error::Lock {
        path: path.display().to_string(),
        cause: e.to_string(),
    })?;

    file.lock_exclusive().map_err(|e| Error::Lock {
        path: path.display().to_string(),
        cause: e.to_string(),
    })?;
    trace!(lock = %path.display(), "acquired exclusive lock");

    let result = f();

    let unlocked = fs2::FileExt::unlock(&file);
    trace!(lock = %path.display(), "released exclusive lock");
    match (result, unlocked) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(Error::Lock {
            path: path.display().to_string(),
            cause: e.to_string(),
        }),
        // The critical section's error wins over a release failure.
        (Err(e), _) => Err(e),
    }
}
