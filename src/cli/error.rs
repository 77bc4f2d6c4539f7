//! CLI error types and exit codes

use crate::config::ConfigError;
use crate::fetcher::FetcherError;
use crate::metrics::MetricsError;
use crate::output::OutputError;
use crate::resume::ResumeError;
use crate::sync::{FailureKind, SyncError};

/// Exit code: success
pub const EXIT_OK: i32 = 0;
/// Exit code: usage, config or I/O error
pub const EXIT_CONFIG: i32 = 1;
/// Exit code: authentication failure or rejected request
pub const EXIT_AUTH: i32 = 2;
/// Exit code: a window failed data-integrity checks
pub const EXIT_DATA_INTEGRITY: i32 = 3;
/// Exit code: a window failed after exhausting retries
pub const EXIT_RETRY_EXHAUSTED: i32 = 4;
/// Exit code: interrupted
pub const EXIT_CANCELLED: i32 = 130;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// State file error
    #[error("state error: {0}")]
    Resume(#[from] ResumeError),

    /// HTTP client setup error
    #[error("fetcher error: {0}")]
    Fetcher(#[from] FetcherError),

    /// Output or checkpoint failure during a run
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Output error outside a run
    #[error("output error: {0}")]
    Output(#[from] OutputError),

    /// Metrics exporter error
    #[error("metrics error: {0}")]
    Metrics(#[from] MetricsError),

    /// Run stopped because a window failed
    #[error("{summary}")]
    SyncFailed {
        /// Category of the first failure
        kind: FailureKind,
        /// Run summary
        summary: String,
    },

    /// Run interrupted by a shutdown request
    #[error("{0}")]
    Cancelled(String),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::SyncFailed { kind, .. } => match kind {
                FailureKind::Auth | FailureKind::InvalidRequest => EXIT_AUTH,
                FailureKind::Malformed => EXIT_DATA_INTEGRITY,
                FailureKind::RetryExhausted => EXIT_RETRY_EXHAUSTED,
            },
            CliError::Cancelled(_) => EXIT_CANCELLED,
            CliError::Config(_)
            | CliError::Resume(_)
            | CliError::Fetcher(_)
            | CliError::Sync(_)
            | CliError::Output(_)
            | CliError::Metrics(_)
            | CliError::InvalidArgument(_) => EXIT_CONFIG,
        }
    }
}
