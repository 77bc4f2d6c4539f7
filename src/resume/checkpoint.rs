//! Bookmarks and the checkpoint store contract
//!
//! A bookmark is the exclusive lower bound for the next run: every day
//! before `replication_key` has been fully emitted downstream. Commits are
//! monotonic; a commit that would move a bookmark backward is clamped.

use super::state::{ResumeError, StateDocument};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Persisted progress marker for one stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    /// Stream the bookmark belongs to (the map key in state documents)
    #[serde(default, skip_serializing)]
    pub stream_name: String,
    /// First day not yet synced
    pub replication_key: NaiveDate,
    /// When the bookmark last advanced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Bookmark {
    /// Create a bookmark stamped with the current time
    pub fn new(stream_name: impl Into<String>, replication_key: NaiveDate) -> Self {
        Self {
            stream_name: stream_name.into(),
            replication_key,
            updated_at: Some(Utc::now()),
        }
    }
}

/// Result of a commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Bookmark moved forward
    Advanced {
        /// Previous position, if any
        from: Option<NaiveDate>,
        /// New position
        to: NaiveDate,
    },
    /// Commit equal to the stored bookmark
    Unchanged,
    /// Commit older than the stored bookmark; ignored
    Stale {
        /// Position that was kept
        current: NaiveDate,
        /// Position that was rejected
        rejected: NaiveDate,
    },
}

impl CommitOutcome {
    /// Whether the bookmark moved
    pub fn advanced(&self) -> bool {
        matches!(self, CommitOutcome::Advanced { .. })
    }
}

/// Store owning the bookmarks of a run
///
/// Implementations must make `commit` monotonic and, for durable stores,
/// atomic with respect to a crash.
pub trait CheckpointStore: Send {
    /// Current bookmark of `stream`
    fn load(&self, stream: &str) -> Result<Option<Bookmark>, ResumeError>;

    /// Advance the bookmark of `stream` to `replication_key`
    fn commit(
        &mut self,
        stream: &str,
        replication_key: NaiveDate,
    ) -> Result<CommitOutcome, ResumeError>;

    /// Every bookmark held by the store
    fn bookmarks(&self) -> BTreeMap<String, Bookmark>;
}

impl<C: CheckpointStore + ?Sized> CheckpointStore for Box<C> {
    fn load(&self, stream: &str) -> Result<Option<Bookmark>, ResumeError> {
        (**self).load(stream)
    }

    fn commit(
        &mut self,
        stream: &str,
        replication_key: NaiveDate,
    ) -> Result<CommitOutcome, ResumeError> {
        (**self).commit(stream, replication_key)
    }

    fn bookmarks(&self) -> BTreeMap<String, Bookmark> {
        (**self).bookmarks()
    }
}

/// In-process checkpoint store
///
/// Used when no state file is given: progress then travels downstream only
/// through STATE messages.
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    document: StateDocument,
}

impl MemoryCheckpointStore {
    /// Start from an existing state document (e.g., a saved STATE value)
    pub fn with_document(document: StateDocument) -> Self {
        Self { document }
    }

    /// Start with a single bookmark
    pub fn with_bookmark(stream: &str, replication_key: NaiveDate) -> Self {
        let mut store = Self::default();
        store.document.advance(stream, replication_key);
        store
    }

    /// Underlying document
    pub fn document(&self) -> &StateDocument {
        &self.document
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self, stream: &str) -> Result<Option<Bookmark>, ResumeError> {
        Ok(self.document.bookmark(stream).cloned())
    }

    fn commit(
        &mut self,
        stream: &str,
        replication_key: NaiveDate,
    ) -> Result<CommitOutcome, ResumeError> {
        Ok(self.document.advance(stream, replication_key))
    }

    fn bookmarks(&self) -> BTreeMap<String, Bookmark> {
        self.document.bookmarks().clone()
    }
}
