//! Retry/backoff controller
//!
//! [`RetryState`] is the pure decision machine: given a policy and an error
//! it says whether to try again and how long to wait. [`RetryController`]
//! drives it around real calls, adding the shared rate limiter, per-call
//! timeouts and cancellation of backoff sleeps.

use crate::config::RetrySettings;
use crate::fetcher::retry_formatter::{CallScope, RetryContext};
use crate::fetcher::{FetcherError, FetcherResult};
use crate::metrics;
use crate::shutdown::SharedShutdown;
use crate::sync::config::{
    apply_jitter, calculate_backoff, DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_JITTER,
    DEFAULT_MAX_ATTEMPTS, INITIAL_BACKOFF_MS, MAX_BACKOFF_MS,
};
use crate::sync::rate_limit::{RateLimitError, RateLimiter};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

/// Retry policy for a single call
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Delay after the first failure
    pub base_delay: Duration,
    /// Upper bound for any computed delay
    pub max_delay: Duration,
    /// Jitter fraction in `[0, 1]`
    pub jitter: f64,
    /// Timeout applied to each attempt
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_delay: Duration::from_millis(MAX_BACKOFF_MS),
            jitter: DEFAULT_JITTER,
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
        }
    }
}

impl RetryPolicy {
    /// Build from validated settings
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            jitter: settings.jitter,
            call_timeout: Duration::from_secs(settings.request_timeout_secs),
        }
    }

    /// Override the attempt ceiling
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Un-jittered delay after failed `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.base_delay, self.max_delay)
    }
}

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for `delay`, then try again
    Retry {
        /// Backoff before the next attempt
        delay: Duration,
    },
    /// Stop; the error is terminal for this call
    GiveUp,
}

/// Ephemeral per-call retry bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    attempt: u32,
    next_delay: Option<Duration>,
    terminal: bool,
}

impl RetryState {
    /// Fresh state before the first attempt
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts started so far
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay chosen after the last failure
    pub fn next_delay(&self) -> Option<Duration> {
        self.next_delay
    }

    /// Whether the call has failed terminally
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Record the start of an attempt and return its 1-based number
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.next_delay = None;
        self.attempt
    }

    /// Decide what follows a failed attempt
    ///
    /// Non-retryable errors give up without consuming further budget.
    /// A `Retry-After` hint raises the delay to at least the hint, still
    /// bounded by `max_delay`.
    pub fn on_failure<R: Rng + ?Sized>(
        &mut self,
        policy: &RetryPolicy,
        error: &FetcherError,
        rng: &mut R,
    ) -> RetryDecision {
        if !error.is_retryable() || self.attempt >= policy.max_attempts {
            self.terminal = true;
            self.next_delay = None;
            return RetryDecision::GiveUp;
        }

        let mut delay = apply_jitter(
            policy.backoff(self.attempt),
            policy.jitter,
            policy.max_delay,
            rng,
        );
        if let FetcherError::RateLimited {
            retry_after: Some(hint),
        } = error
        {
            delay = delay.max(*hint).min(policy.max_delay);
        }

        self.next_delay = Some(delay);
        RetryDecision::Retry { delay }
    }
}

/// Terminal outcome of a retried call
#[derive(Debug, Clone, thiserror::Error)]
pub enum RetryError {
    /// Non-retryable error, returned on first occurrence
    #[error("{0}")]
    Rejected(FetcherError),

    /// Retryable error persisted through every attempt
    #[error("gave up after {attempts} attempt(s): {last}")]
    Exhausted {
        /// Attempts made
        attempts: u32,
        /// Error of the final attempt
        last: FetcherError,
    },

    /// Shutdown requested while waiting
    #[error("cancelled by shutdown request")]
    Cancelled,

    /// Rate limiter closed
    #[error(transparent)]
    Limiter(#[from] RateLimitError),
}

/// Runs calls under a [`RetryPolicy`] and a shared [`RateLimiter`]
#[derive(Debug, Clone)]
pub struct RetryController {
    policy: RetryPolicy,
    limiter: Arc<RateLimiter>,
    shutdown: Option<SharedShutdown>,
}

impl RetryController {
    /// Create a controller
    pub fn new(policy: RetryPolicy, limiter: Arc<RateLimiter>) -> Self {
        Self {
            policy,
            limiter,
            shutdown: None,
        }
    }

    /// Abort backoff sleeps when shutdown is requested
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Active policy
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Shared limiter
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    fn is_cancelled(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|s| s.is_shutdown_requested())
            .unwrap_or(false)
    }

    /// Run `op` until it succeeds, fails terminally or attempts run out
    ///
    /// Every attempt takes a rate-limit permit and is bounded by the
    /// policy's call timeout; an elapsed timeout counts as a transient
    /// network error.
    pub async fn run<T, F, Fut>(&self, scope: &CallScope, mut op: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = FetcherResult<T>>,
    {
        let mut state = RetryState::new();
        let mut recovered_from: Option<FetcherError> = None;

        loop {
            if self.is_cancelled() {
                return Err(RetryError::Cancelled);
            }

            let attempt = state.begin_attempt();
            self.limiter.acquire().await?;

            let result = match timeout(self.policy.call_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(FetcherError::TransientNetwork(format!(
                    "call timed out after {:.1}s",
                    self.policy.call_timeout.as_secs_f64()
                ))),
            };

            let err = match result {
                Ok(value) => {
                    if let Some(previous) = recovered_from {
                        let ctx = RetryContext::new(
                            attempt,
                            self.policy.max_attempts,
                            previous,
                            Duration::ZERO,
                            scope.clone(),
                        );
                        info!("{}", ctx.format_success());
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            let decision = {
                let mut rng = rand::thread_rng();
                state.on_failure(&self.policy, &err, &mut rng)
            };

            match decision {
                RetryDecision::GiveUp if !err.is_retryable() => {
                    debug!(attempt, error = %err, endpoint = %scope.endpoint, "Non-retryable error");
                    return Err(RetryError::Rejected(err));
                }
                RetryDecision::GiveUp => {
                    let ctx = RetryContext::new(
                        attempt,
                        self.policy.max_attempts,
                        err.clone(),
                        Duration::ZERO,
                        scope.clone(),
                    );
                    error!("{}", ctx.format_failure());
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: err,
                    });
                }
                RetryDecision::Retry { delay } => {
                    let ctx = RetryContext::new(
                        attempt,
                        self.policy.max_attempts,
                        err.clone(),
                        delay,
                        scope.clone(),
                    );
                    warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        error = %err,
                        "{}",
                        ctx.format_retry()
                    );
                    metrics::record_retry(delay);

                    self.backoff(delay).await?;
                    recovered_from = Some(err);
                }
            }
        }
    }

    async fn backoff(&self, delay: Duration) -> Result<(), RetryError> {
        match &self.shutdown {
            Some(shutdown) => {
                tokio::select! {
                    _ = sleep(delay) => Ok(()),
                    _ = shutdown.wait_for_shutdown() => {
                        info!("Shutdown requested during backoff");
                        Err(RetryError::Cancelled)
                    }
                }
            }
            None => {
                sleep(delay).await;
                Ok(())
            }
        }
    }
}
