//! State document persistence
//!
//! The state file holds one bookmark per stream:
//!
//! ```json
//! {"schema_version": "1.0.0", "bookmarks": {"reports": {"replication_key": "2024-01-10"}}}
//! ```
//!
//! Writes are atomic (temp file, fsync, rename, directory fsync) and made
//! under an `fd-lock` write lock. A document without `schema_version` is
//! accepted so the value of a STATE message can be fed back as a state file.

use super::checkpoint::{Bookmark, CheckpointStore, CommitOutcome};
use chrono::NaiveDate;
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Current state schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Maximum allowed state file size (10 MB) to prevent memory exhaustion
pub const MAX_STATE_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Bookmarks of every stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    schema_version: Option<String>,
    #[serde(default)]
    bookmarks: BTreeMap<String, Bookmark>,
}

impl StateDocument {
    /// Empty document at the current schema version
    pub fn new() -> Self {
        Self {
            schema_version: Some(SCHEMA_VERSION.to_string()),
            bookmarks: BTreeMap::new(),
        }
    }

    /// Build from a set of bookmarks
    pub fn from_bookmarks(bookmarks: BTreeMap<String, Bookmark>) -> Self {
        Self {
            schema_version: Some(SCHEMA_VERSION.to_string()),
            bookmarks,
        }
    }

    /// Bookmark of `stream`
    pub fn bookmark(&self, stream: &str) -> Option<&Bookmark> {
        self.bookmarks.get(stream)
    }

    /// All bookmarks keyed by stream
    pub fn bookmarks(&self) -> &BTreeMap<String, Bookmark> {
        &self.bookmarks
    }

    /// Monotonic bookmark update
    pub fn advance(&mut self, stream: &str, replication_key: NaiveDate) -> CommitOutcome {
        let current = self.bookmarks.get(stream).map(|b| b.replication_key);
        match current {
            Some(current) if replication_key < current => {
                warn!(
                    stream,
                    %current,
                    rejected = %replication_key,
                    "Ignoring commit that would move bookmark backward"
                );
                CommitOutcome::Stale {
                    current,
                    rejected: replication_key,
                }
            }
            Some(current) if replication_key == current => CommitOutcome::Unchanged,
            from => {
                self.bookmarks
                    .insert(stream.to_string(), Bookmark::new(stream, replication_key));
                CommitOutcome::Advanced {
                    from,
                    to: replication_key,
                }
            }
        }
    }

    /// Validate schema version; a missing version is accepted
    pub fn validate_schema_version(&self) -> Result<(), ResumeError> {
        match self.schema_version.as_deref() {
            None | Some(SCHEMA_VERSION) => Ok(()),
            Some(found) => Err(ResumeError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION.to_string(),
                found: found.to_string(),
            }),
        }
    }

    /// Parse a document from JSON text
    pub fn from_json(contents: &str) -> Result<Self, ResumeError> {
        let mut document: StateDocument = serde_json::from_str(contents).map_err(|e| {
            warn!(error = %e, "Failed to deserialize state");
            ResumeError::DeserializationError(e.to_string())
        })?;
        document.validate_schema_version()?;

        for (stream, bookmark) in document.bookmarks.iter_mut() {
            bookmark.stream_name = stream.clone();
        }
        document.schema_version = Some(SCHEMA_VERSION.to_string());
        Ok(document)
    }

    /// Save state to file with atomic writes and file locking
    pub fn save(&self, path: &Path) -> Result<(), ResumeError> {
        debug!(
            path = %path.display(),
            streams = self.bookmarks.len(),
            "Saving state"
        );

        // Ensure parent directory exists
        let parent_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent_dir).map_err(|e| ResumeError::IoError(e.to_string()))?;

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ResumeError::SerializationError(e.to_string()))?;

        let lock_path = path.with_extension("lock");
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| ResumeError::LockError(format!("Failed to create lock file: {e}")))?;

        let mut lock = RwLock::new(lock_file);
        let _guard = lock
            .write()
            .map_err(|e| ResumeError::LockError(format!("Failed to acquire write lock: {e}")))?;

        let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
            .map_err(|e| ResumeError::IoError(format!("Failed to create temp file: {e}")))?;

        temp_file
            .write_all(json.as_bytes())
            .map_err(|e| ResumeError::IoError(format!("Failed to write to temp file: {e}")))?;

        // Flush and sync before the rename so a crash never exposes a partial file
        temp_file
            .flush()
            .map_err(|e| ResumeError::IoError(format!("Failed to flush temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| ResumeError::IoError(format!("Failed to sync temp file: {e}")))?;

        temp_file
            .persist(path)
            .map_err(|e| ResumeError::IoError(format!("Failed to persist temp file: {e}")))?;

        // Fsync parent directory to ensure the rename is durable
        if let Ok(dir) = std::fs::File::open(parent_dir) {
            let _ = dir.sync_all();
        }

        debug!(path = %path.display(), "State saved");
        Ok(())
    }

    /// Load state from file under a shared lock
    pub fn load(path: &Path) -> Result<Self, ResumeError> {
        debug!(path = %path.display(), "Loading state");

        let lock_path = path.with_extension("lock");
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| ResumeError::LockError(format!("Failed to create lock file: {e}")))?;

        let lock = RwLock::new(lock_file);
        let _guard = lock
            .read()
            .map_err(|e| ResumeError::LockError(format!("Failed to acquire read lock: {e}")))?;

        let metadata = std::fs::metadata(path).map_err(|e| ResumeError::IoError(e.to_string()))?;
        if metadata.len() > MAX_STATE_FILE_SIZE {
            return Err(ResumeError::StateTooLarge {
                size: metadata.len(),
                max: MAX_STATE_FILE_SIZE,
            });
        }

        let contents =
            std::fs::read_to_string(path).map_err(|e| ResumeError::IoError(e.to_string()))?;
        let document = Self::from_json(&contents)?;

        info!(
            path = %path.display(),
            streams = document.bookmarks.len(),
            "State loaded"
        );
        Ok(document)
    }
}

/// Checkpoint store backed by a JSON state file
///
/// Every advancing commit rewrites the file atomically before returning.
#[derive(Debug)]
pub struct FileCheckpointStore {
    path: PathBuf,
    document: StateDocument,
}

impl FileCheckpointStore {
    /// Open the store at `path`; a missing file starts empty
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ResumeError> {
        let path = path.into();
        let document = if path.exists() {
            StateDocument::load(&path)?
        } else {
            info!(path = %path.display(), "No state file yet, starting without bookmarks");
            StateDocument::new()
        };
        Ok(Self { path, document })
    }

    /// Location of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self, stream: &str) -> Result<Option<Bookmark>, ResumeError> {
        Ok(self.document.bookmark(stream).cloned())
    }

    fn commit(
        &mut self,
        stream: &str,
        replication_key: NaiveDate,
    ) -> Result<CommitOutcome, ResumeError> {
        let mut next = self.document.clone();
        let outcome = next.advance(stream, replication_key);
        if outcome.advanced() {
            next.save(&self.path)?;
            self.document = next;
        }
        Ok(outcome)
    }

    fn bookmarks(&self) -> BTreeMap<String, Bookmark> {
        self.document.bookmarks().clone()
    }
}

/// Errors related to checkpoint state
#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    /// Schema version mismatch
    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Expected schema version
        expected: String,
        /// Found schema version
        found: String,
    },

    /// State file too large
    #[error("state file too large: {size} bytes (max: {max} bytes)")]
    StateTooLarge {
        /// Actual file size
        size: u64,
        /// Maximum allowed size
        max: u64,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Lock error
    #[error("lock error: {0}")]
    LockError(String),
}
