//! Sync command

use super::{Cli, CliError};
use crate::fetcher::applovin_http::ApplovinHttpClient;
use crate::output::JsonLinesWriter;
use crate::resume::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore, StateLock};
use crate::shutdown::SharedShutdown;
use crate::sync::{SyncOrchestrator, SyncOutcome, SyncSummary};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

/// Run an incremental sync
#[derive(Parser, Debug)]
pub struct SyncCommand {
    /// JSON config file
    #[arg(long)]
    pub config: PathBuf,

    /// State file holding bookmarks; read at start and rewritten after each window
    #[arg(long)]
    pub state: Option<PathBuf>,
}

impl SyncCommand {
    /// Execute the sync
    ///
    /// Returns the summary on success; a stopped or cancelled run maps to a
    /// [`CliError`] carrying the matching exit code.
    pub async fn execute(
        &self,
        cli: &Cli,
        shutdown: SharedShutdown,
    ) -> Result<SyncSummary, CliError> {
        let config = cli.load_config(&self.config)?;
        let source = ApplovinHttpClient::from_config(&config)?;

        let (_lock, store): (Option<StateLock>, Box<dyn CheckpointStore>) = match &self.state {
            Some(path) => {
                let lock = StateLock::try_acquire(path)?;
                (Some(lock), Box::new(FileCheckpointStore::open(path)?))
            }
            None => {
                info!("No --state given; progress is reported only through STATE messages");
                (None, Box::new(MemoryCheckpointStore::default()))
            }
        };

        let writer = JsonLinesWriter::new(std::io::stdout());
        let mut orchestrator = SyncOrchestrator::from_config(&config, source, store, writer)
            .with_shutdown(shutdown)
            .with_progress(cli.progress);

        let summary = orchestrator.run().await?;
        eprintln!("{}", summary.describe());

        match &summary.outcome {
            SyncOutcome::UpToDate | SyncOutcome::Complete { .. } => Ok(summary),
            SyncOutcome::Stopped { kind, .. } => Err(CliError::SyncFailed {
                kind: *kind,
                summary: summary.describe(),
            }),
            SyncOutcome::Cancelled { .. } => Err(CliError::Cancelled(summary.describe())),
        }
    }
}
