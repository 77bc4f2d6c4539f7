//! Retry, rate limiting and sync orchestration

pub mod config;
pub mod orchestrator;
pub mod rate_limit;
pub mod retry;

pub use orchestrator::{
    FailureKind, SyncOrchestrator, SyncOutcome, SyncPhase, SyncSummary, WindowFailure,
};
pub use rate_limit::{RateLimitError, RateLimiter};
pub use retry::{RetryController, RetryDecision, RetryError, RetryPolicy, RetryState};

use crate::output::OutputError;
use crate::resume::ResumeError;

/// Errors that abort a run outside of window-level failures
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Downstream output failed
    #[error("output error: {0}")]
    Output(#[from] OutputError),

    /// Checkpoint store failed
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] ResumeError),
}
