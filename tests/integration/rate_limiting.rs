//! Integration tests for request rate limiting

use super::support::fast_policy;
use std::sync::Arc;
use std::time::Duration;
use tap_applovin::fetcher::retry_formatter::CallScope;
use tap_applovin::fetcher::FetcherError;
use tap_applovin::sync::{RateLimiter, RetryController};
use tokio::time::Instant;

#[test]
fn test_rate_limiter_request_based_initialization() {
    let limiter = RateLimiter::request_based(5, Duration::from_secs(1));
    assert_eq!(limiter.max_requests(), 5);
    assert_eq!(limiter.window(), Duration::from_secs(1));
    assert_eq!(limiter.available(), 5);
}

#[test]
fn test_rate_limiter_zero_requests_clamped_to_one() {
    let limiter = RateLimiter::request_based(0, Duration::from_secs(1));
    assert_eq!(limiter.max_requests(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_requests_within_limit_do_not_wait() {
    let limiter = RateLimiter::request_based(3, Duration::from_secs(1));
    let start = Instant::now();

    for _ in 0..3 {
        limiter.acquire().await.unwrap();
    }

    assert!(start.elapsed() < Duration::from_millis(10));
}

#[tokio::test(start_paused = true)]
async fn test_request_over_limit_waits_for_window() {
    let limiter = RateLimiter::request_based(2, Duration::from_secs(1));
    let start = Instant::now();

    limiter.acquire().await.unwrap();
    limiter.acquire().await.unwrap();
    limiter.acquire().await.unwrap();

    assert!(start.elapsed() >= Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_limiter_shared_across_tasks() {
    let limiter = Arc::new(RateLimiter::request_based(2, Duration::from_secs(1)));
    let start = Instant::now();

    let tasks: Vec<_> = (0..6)
        .map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire().await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    // 6 requests at 2 per second need two extra windows
    assert!(start.elapsed() >= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_retries_take_a_permit_per_attempt() {
    let limiter = Arc::new(RateLimiter::request_based(1, Duration::from_millis(500)));
    let retry = RetryController::new(fast_policy(3), limiter);
    let start = Instant::now();

    let result: Result<(), _> = retry
        .run(&CallScope::new("fake://reports", None), || async {
            Err(FetcherError::TransientNetwork("reset".into()))
        })
        .await;

    assert!(result.is_err());
    assert!(start.elapsed() >= Duration::from_millis(1000));
}
