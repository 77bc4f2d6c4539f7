//! Run-level advisory lock on a state file
//!
//! Held for the whole `sync` run so two processes cannot advance the same
//! bookmarks. Uses a `.run.lock` sibling, separate from the short-lived
//! lock taken around each state write.

use super::state::ResumeError;
use fd_lock::RwLock;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Exclusive lock for the lifetime of a run
#[derive(Debug)]
pub struct StateLock {
    // Dropping the file closes the descriptor, which releases the lock
    _lock: RwLock<File>,
    path: PathBuf,
}

impl StateLock {
    /// Path of the run lock guarding `state_path`
    pub fn lock_path(state_path: &Path) -> PathBuf {
        state_path.with_extension("run.lock")
    }

    /// Acquire the lock, blocking until it is available
    pub fn acquire(state_path: &Path) -> Result<Self, ResumeError> {
        Self::lock(state_path, true)
    }

    /// Try to acquire the lock without blocking
    ///
    /// Returns an error immediately if another run holds it.
    pub fn try_acquire(state_path: &Path) -> Result<Self, ResumeError> {
        Self::lock(state_path, false)
    }

    /// Lock file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(state_path: &Path, block: bool) -> Result<Self, ResumeError> {
        if let Some(parent) = state_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ResumeError::IoError(e.to_string()))?;
        }

        let path = Self::lock_path(state_path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| ResumeError::LockError(format!("Failed to open lock file: {e}")))?;

        let mut lock = RwLock::new(file);
        let acquired = if block { lock.write() } else { lock.try_write() };
        let guard = acquired.map_err(|e| {
            ResumeError::LockError(format!(
                "state file {} is in use by another run: {e}",
                state_path.display()
            ))
        })?;
        // Keep the OS lock held until the descriptor is closed
        std::mem::forget(guard);

        debug!(path = %path.display(), "Run lock acquired");
        Ok(Self { _lock: lock, path })
    }
}
