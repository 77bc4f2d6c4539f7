//! Retry, backoff and throttling defaults

use rand::Rng;
use std::time::Duration;

/// Maximum number of attempts per call, including the first one.
/// 5 attempts with exponential backoff recovers from short outages while
/// keeping a persistently failing window bounded to about a minute.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Upper bound accepted for `max_attempts`
pub const MAX_ATTEMPTS_LIMIT: u32 = 20;

/// Initial backoff delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 1000; // 1 second

/// Maximum backoff delay in milliseconds.
/// Attempt 6 would be 32s; capped to 30s.
pub const MAX_BACKOFF_MS: u64 = 30000; // 30 seconds

/// Default jitter fraction applied to each backoff delay (±20%)
pub const DEFAULT_JITTER: f64 = 0.2;

/// Per-call timeout in seconds
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

/// TCP connect timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Requests allowed per rate-limit window.
/// The report API does not publish its ceiling; one request per second
/// stays well clear of observed 429s.
pub const DEFAULT_MAX_REQUESTS: usize = 1;

/// Rate-limit window in seconds
pub const DEFAULT_RATE_WINDOW_SECS: u64 = 1;

/// Calculate the un-jittered exponential backoff delay
///
/// `attempt` is 1-based: the delay after the first failure is `base`.
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.saturating_mul(2u32.saturating_pow(exponent)).min(max)
}

/// Scale `delay` by a uniform factor in `[1 - jitter, 1 + jitter]`, re-capped at `max`
pub fn apply_jitter<R: Rng + ?Sized>(delay: Duration, jitter: f64, max: Duration, rng: &mut R) -> Duration {
    let jitter = jitter.clamp(0.0, 1.0);
    if jitter == 0.0 {
        return delay.min(max);
    }
    let factor = rng.gen_range((1.0 - jitter)..=(1.0 + jitter));
    delay.mul_f64(factor).min(max)
}
