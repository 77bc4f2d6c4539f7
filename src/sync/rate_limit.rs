//! Shared request-rate limiter
//!
//! Every call to the report API takes a permit first. A permit is held for
//! the whole rate window after it is taken, so at most `max_requests` calls
//! start in any window regardless of how many tasks share the limiter.

use crate::metrics;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::trace;

/// Request-based rate limiter
#[derive(Debug, Clone)]
pub struct RateLimiter {
    semaphore: Arc<Semaphore>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    /// Create a request-based rate limiter
    ///
    /// # Arguments
    /// * `max_requests` - Maximum requests per window (at least 1)
    /// * `window` - Time window for rate limit
    pub fn request_based(max_requests: usize, window: Duration) -> Self {
        let max_requests = max_requests.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_requests)),
            max_requests,
            window,
        }
    }

    /// A limiter that never waits; for tests and offline tools
    pub fn unlimited() -> Self {
        Self::request_based(Semaphore::MAX_PERMITS, Duration::ZERO)
    }

    /// Maximum requests per window
    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Rate window
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Permits currently available
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a permit for one request
    ///
    /// The permit is released `window` after acquisition, not when the
    /// request completes.
    pub async fn acquire(&self) -> Result<(), RateLimitError> {
        let started = Instant::now();
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| RateLimitError::AcquireError(e.to_string()))?;

        let waited = started.elapsed();
        metrics::record_rate_limit_wait(waited);
        trace!(
            available = self.semaphore.available_permits(),
            wait_ms = waited.as_millis(),
            "Rate limit permit acquired"
        );

        if self.window.is_zero() {
            return Ok(());
        }

        let window = self.window;
        tokio::spawn(async move {
            sleep(window).await;
            drop(permit);
        });

        Ok(())
    }
}

/// Rate limiter errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum RateLimitError {
    /// Failed to acquire permits
    #[error("failed to acquire rate limit permits: {0}")]
    AcquireError(String),
}
