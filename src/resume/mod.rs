//! Checkpoint store
//!
//! Bookmark persistence with monotonic commits, atomic state files and
//! run-level locking.

pub mod checkpoint;
pub mod lock;
pub mod state;

pub use checkpoint::{Bookmark, CheckpointStore, CommitOutcome, MemoryCheckpointStore};
pub use lock::StateLock;
pub use state::{FileCheckpointStore, ResumeError, StateDocument};
