//! Sync orchestrator
//!
//! Drives one stream through `Planning → Running(i) → Committing(i) → … →
//! Done`, or `Failed` on an unrecoverable error. Windows are processed
//! strictly in order; a window's records are all written and flushed
//! before its bookmark is committed, and a STATE message follows every
//! commit. A malformed window never commits, and once one has failed no
//! later window commits either, so the bookmark never jumps a gap.

use crate::catalog::StreamDescriptor;
use crate::config::ValidatedConfig;
use crate::fetcher::{ErrorClass, FetcherError, ReportFetcher, ReportSource};
use crate::metrics;
use crate::output::{Message, MessageWriter};
use crate::resume::{CheckpointStore, CommitOutcome, StateDocument};
use crate::shutdown::SharedShutdown;
use crate::sync::retry::{RetryController, RetryError};
use crate::sync::SyncError;
use crate::window::{PlannerConfig, WindowPlan};
use crate::{ExtractionWindow, REPORTS_STREAM};
use chrono::{Days, NaiveDate, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Loading the bookmark and planning windows
    Planning,
    /// Fetching window `i`
    Running(usize),
    /// Committing window `i`
    Committing(usize),
    /// Finished without an unrecoverable error
    Done,
    /// Stopped on an unrecoverable error
    Failed,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncPhase::Planning => write!(f, "PLANNING"),
            SyncPhase::Running(i) => write!(f, "RUNNING({i})"),
            SyncPhase::Committing(i) => write!(f, "COMMITTING({i})"),
            SyncPhase::Done => write!(f, "DONE"),
            SyncPhase::Failed => write!(f, "FAILED"),
        }
    }
}

/// Why a window failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Invalid or expired credentials
    Auth,
    /// Request rejected by the API
    InvalidRequest,
    /// Response did not match the report schema
    Malformed,
    /// Transient errors persisted through every attempt
    RetryExhausted,
}

impl FailureKind {
    /// Short label used in logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            FailureKind::Auth => "auth",
            FailureKind::InvalidRequest => "invalid_request",
            FailureKind::Malformed => "malformed",
            FailureKind::RetryExhausted => "retry_exhausted",
        }
    }

    fn from_fetcher(error: &FetcherError) -> Self {
        match (error.class(), error) {
            (ErrorClass::Fatal, FetcherError::Auth(_)) => FailureKind::Auth,
            (ErrorClass::Fatal, _) => FailureKind::InvalidRequest,
            (ErrorClass::DataIntegrity, _) => FailureKind::Malformed,
            (ErrorClass::Retryable, _) => FailureKind::RetryExhausted,
        }
    }
}

/// A window that could not be completed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowFailure {
    /// Affected window
    pub window: ExtractionWindow,
    /// Failure category
    pub kind: FailureKind,
    /// Human-readable cause
    pub message: String,
}

impl WindowFailure {
    fn from_retry(window: ExtractionWindow, error: &RetryError) -> Self {
        let kind = match error {
            RetryError::Rejected(err) => FailureKind::from_fetcher(err),
            RetryError::Exhausted { .. } | RetryError::Limiter(_) | RetryError::Cancelled => {
                FailureKind::RetryExhausted
            }
        };
        Self {
            window,
            kind,
            message: error.to_string(),
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing to fetch: the bookmark already reaches the end of the range
    UpToDate,
    /// Every planned window committed
    Complete {
        /// Last day synced (inclusive)
        synced_through: NaiveDate,
    },
    /// A window failed; the bookmark reflects real progress
    Stopped {
        /// First failed window
        at: ExtractionWindow,
        /// Failure category
        kind: FailureKind,
        /// Cause
        reason: String,
    },
    /// Shutdown requested; stopped at a window boundary
    Cancelled {
        /// First window not processed
        at: NaiveDate,
    },
}

/// Result of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSummary {
    /// Stream synced
    pub stream: String,
    /// Windows in the plan
    pub windows_planned: usize,
    /// Windows whose records were emitted
    pub windows_emitted: usize,
    /// Windows whose bookmark was committed
    pub windows_committed: usize,
    /// RECORD messages written
    pub records_emitted: u64,
    /// Bookmark at the end of the run
    pub bookmark: Option<NaiveDate>,
    /// Failed windows, in order
    pub failures: Vec<WindowFailure>,
    /// Overall outcome
    pub outcome: SyncOutcome,
}

impl SyncSummary {
    fn new(stream: &str, windows_planned: usize, bookmark: Option<NaiveDate>) -> Self {
        Self {
            stream: stream.to_string(),
            windows_planned,
            windows_emitted: 0,
            windows_committed: 0,
            records_emitted: 0,
            bookmark,
            failures: Vec::new(),
            outcome: SyncOutcome::UpToDate,
        }
    }

    /// Whether every planned window committed (or there was nothing to do)
    pub fn is_success(&self) -> bool {
        matches!(
            self.outcome,
            SyncOutcome::UpToDate | SyncOutcome::Complete { .. }
        )
    }

    /// One-line description for the user
    pub fn describe(&self) -> String {
        let progress = match self.bookmark.and_then(|b| b.checked_sub_days(Days::new(1))) {
            Some(last) => format!("synced through {last}"),
            None => "nothing synced yet".to_string(),
        };

        match &self.outcome {
            SyncOutcome::UpToDate => {
                format!("{}: already up to date ({progress})", self.stream)
            }
            SyncOutcome::Complete { synced_through } => format!(
                "{}: fully synced through {synced_through} ({} window(s), {} record(s))",
                self.stream, self.windows_committed, self.records_emitted
            ),
            SyncOutcome::Stopped { at, reason, .. } => format!(
                "{}: stopped early at {} due to {reason}; {progress} ({} of {} window(s) committed)",
                self.stream, at.start, self.windows_committed, self.windows_planned
            ),
            SyncOutcome::Cancelled { at } => format!(
                "{}: cancelled before {at}; {progress} ({} of {} window(s) committed)",
                self.stream, self.windows_committed, self.windows_planned
            ),
        }
    }
}

/// Composes planner, fetcher, checkpoint store and output writer
pub struct SyncOrchestrator<S, C, W> {
    stream: String,
    planner: PlannerConfig,
    columns: Vec<String>,
    fetcher: ReportFetcher<S>,
    store: C,
    writer: W,
    continue_on_malformed: bool,
    today: Option<NaiveDate>,
    shutdown: Option<SharedShutdown>,
    progress: bool,
    phase: SyncPhase,
}

impl<S, C, W> SyncOrchestrator<S, C, W>
where
    S: ReportSource,
    C: CheckpointStore,
    W: MessageWriter,
{
    /// Create an orchestrator for the `reports` stream
    ///
    /// # Arguments
    /// * `planner` - Window planning inputs
    /// * `columns` - Selected columns (for the SCHEMA message)
    /// * `fetcher` - Fetcher wrapping the report source
    /// * `store` - Checkpoint store owning the bookmark
    /// * `writer` - Downstream message sink
    pub fn new(
        planner: PlannerConfig,
        columns: Vec<String>,
        fetcher: ReportFetcher<S>,
        store: C,
        writer: W,
    ) -> Self {
        Self {
            stream: REPORTS_STREAM.to_string(),
            planner,
            columns,
            fetcher,
            store,
            writer,
            continue_on_malformed: true,
            today: None,
            shutdown: None,
            progress: false,
            phase: SyncPhase::Planning,
        }
    }

    /// Create an orchestrator from validated configuration
    pub fn from_config(config: &ValidatedConfig, source: S, store: C, writer: W) -> Self {
        let retry = RetryController::new(config.retry.clone(), Arc::new(config.rate_limiter()));
        let mut orchestrator = Self::new(
            config.planner.clone(),
            config.endpoint.columns.clone(),
            ReportFetcher::new(source, retry),
            store,
            writer,
        );
        orchestrator.continue_on_malformed = config.continue_on_malformed;
        orchestrator
    }

    /// Fix the current date (defaults to today in UTC)
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    /// Observe a shutdown coordinator at window boundaries and during backoff
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.fetcher = self.fetcher.with_shutdown(shutdown.clone());
        self.shutdown = Some(shutdown);
        self
    }

    /// Show a progress bar over windows on stderr
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Whether later windows are fetched after a malformed one
    pub fn with_continue_on_malformed(mut self, continue_on_malformed: bool) -> Self {
        self.continue_on_malformed = continue_on_malformed;
        self
    }

    /// Current phase
    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Consume the orchestrator, returning store and writer
    pub fn into_parts(self) -> (C, W) {
        (self.store, self.writer)
    }

    fn transition(&mut self, next: SyncPhase) {
        debug!(stream = %self.stream, from = %self.phase, to = %next, "Sync phase transition");
        self.phase = next;
    }

    fn is_cancelled(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|s| s.is_shutdown_requested())
            .unwrap_or(false)
    }

    /// Run the sync to completion or to the first unrecoverable error
    ///
    /// Window-level failures are reported in the returned summary. An
    /// `Err` means the output or the checkpoint store failed; the bookmark
    /// then still reflects the last window committed before the failure.
    pub async fn run(&mut self) -> Result<SyncSummary, SyncError> {
        self.transition(SyncPhase::Planning);
        match self.run_inner().await {
            Ok(summary) => {
                let terminal = if summary.is_success()
                    || matches!(summary.outcome, SyncOutcome::Cancelled { .. })
                {
                    SyncPhase::Done
                } else {
                    SyncPhase::Failed
                };
                self.transition(terminal);
                Ok(summary)
            }
            Err(err) => {
                error!(stream = %self.stream, error = %err, "Sync aborted");
                self.transition(SyncPhase::Failed);
                Err(err)
            }
        }
    }

    async fn run_inner(&mut self) -> Result<SyncSummary, SyncError> {
        let today = self.today.unwrap_or_else(|| Utc::now().date_naive());
        let bookmark = self.store.load(&self.stream)?.map(|b| b.replication_key);
        let plan = WindowPlan::new(&self.planner, bookmark, today);

        info!(
            stream = %self.stream,
            bookmark = ?bookmark,
            start = %plan.start(),
            end = %plan.end(),
            windows = plan.len(),
            "Planned extraction windows"
        );

        self.writer
            .write_message(&Message::schema(&StreamDescriptor::reports(&self.columns)))?;
        self.writer.flush()?;

        let mut summary = SyncSummary::new(&self.stream, plan.len(), bookmark);
        if plan.is_empty() {
            info!(stream = %self.stream, "Nothing to sync");
            return Ok(summary);
        }

        let progress = self.progress_bar(plan.len());
        // Set once a window fails without stopping the run
        let mut frozen = false;
        let mut outcome = None;

        for (index, window) in plan.iter().enumerate() {
            if self.is_cancelled() {
                warn!(stream = %self.stream, %window, "Cancelled at window boundary");
                outcome = Some(SyncOutcome::Cancelled { at: window.start });
                break;
            }

            self.transition(SyncPhase::Running(index));
            progress.set_message(window.to_string());

            let records = match self.fetcher.fetch_window(window).await {
                Ok(records) => records,
                Err(RetryError::Cancelled) => {
                    warn!(stream = %self.stream, %window, "Cancelled during window fetch");
                    outcome = Some(SyncOutcome::Cancelled { at: window.start });
                    break;
                }
                Err(err) => {
                    let failure = WindowFailure::from_retry(window, &err);
                    metrics::record_window_failed(&self.stream, failure.kind.label());
                    error!(
                        stream = %self.stream,
                        %window,
                        kind = failure.kind.label(),
                        error = %failure.message,
                        "Window failed"
                    );
                    summary.failures.push(failure.clone());

                    if failure.kind == FailureKind::Malformed && self.continue_on_malformed {
                        if !frozen {
                            warn!(
                                stream = %self.stream,
                                %window,
                                "Bookmark frozen; later windows are emitted but not committed"
                            );
                        }
                        frozen = true;
                        progress.inc(1);
                        continue;
                    }

                    outcome = Some(SyncOutcome::Stopped {
                        at: failure.window,
                        kind: failure.kind,
                        reason: failure.message,
                    });
                    break;
                }
            };

            let count = records.len() as u64;
            let extracted = Utc::now();
            for record in records {
                self.writer
                    .write_message(&Message::record(&self.stream, record, extracted))?;
            }
            self.writer.flush()?;
            summary.windows_emitted += 1;
            summary.records_emitted += count;
            metrics::record_records_emitted(&self.stream, count);

            if frozen {
                debug!(stream = %self.stream, %window, records = count, "Window emitted, commit skipped");
                progress.inc(1);
                continue;
            }

            self.transition(SyncPhase::Committing(index));
            match self.store.commit(&self.stream, window.end)? {
                CommitOutcome::Advanced { from, to } => {
                    summary.bookmark = Some(to);
                    summary.windows_committed += 1;
                    metrics::record_window_committed(&self.stream);
                    info!(
                        stream = %self.stream,
                        %window,
                        records = count,
                        from = ?from,
                        to = %to,
                        "Window committed"
                    );
                }
                other => {
                    debug!(stream = %self.stream, %window, outcome = ?other, "Bookmark not advanced");
                }
            }

            let state = StateDocument::from_bookmarks(self.store.bookmarks());
            self.writer.write_message(&Message::state(state))?;
            self.writer.flush()?;
            progress.inc(1);
        }

        progress.finish_and_clear();

        summary.outcome = match outcome {
            Some(outcome) => outcome,
            None => match summary.failures.first() {
                Some(first) => SyncOutcome::Stopped {
                    at: first.window,
                    kind: first.kind,
                    reason: first.message.clone(),
                },
                None => SyncOutcome::Complete {
                    synced_through: plan
                        .end()
                        .checked_sub_days(Days::new(1))
                        .unwrap_or(plan.end()),
                },
            },
        };

        info!(stream = %self.stream, "{}", summary.describe());
        Ok(summary)
    }

    fn progress_bar(&self, windows: usize) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(windows as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} windows {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    }
}
