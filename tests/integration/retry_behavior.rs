//! Retry controller behavior against scripted failures

use super::support::{date, fast_policy};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tap_applovin::fetcher::retry_formatter::CallScope;
use tap_applovin::fetcher::FetcherError;
use tap_applovin::shutdown::ShutdownCoordinator;
use tap_applovin::sync::{RateLimiter, RetryController, RetryError, RetryPolicy};
use tap_applovin::window::ExtractionWindow;

fn scope() -> CallScope {
    let window = ExtractionWindow::new(date(2024, 1, 7), date(2024, 1, 8)).unwrap();
    CallScope::new("fake://reports", Some(window))
}

fn controller(policy: RetryPolicy) -> RetryController {
    RetryController::new(policy, Arc::new(RateLimiter::unlimited()))
}

#[tokio::test]
async fn test_always_transient_attempts_exactly_max_attempts() {
    for max_attempts in [1u32, 3, 5] {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = controller(fast_policy(max_attempts))
            .run(&scope(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FetcherError::TransientNetwork("connection refused".into())) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), max_attempts);
        match result {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, max_attempts);
                assert!(matches!(last, FetcherError::TransientNetwork(_)));
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_fatal_errors_are_not_retried() {
    let errors = vec![
        FetcherError::Auth("bad key".into()),
        FetcherError::InvalidRequest {
            status: 400,
            message: "unknown column".into(),
        },
        FetcherError::MalformedResponse("not json".into()),
    ];

    for error in errors {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = controller(fast_policy(5))
            .run(&scope(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                let error = error.clone();
                async move { Err(error) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(RetryError::Rejected(_))));
    }
}

#[tokio::test]
async fn test_rate_limited_then_success() {
    let calls = AtomicU32::new(0);
    let result = controller(fast_policy(4))
        .run(&scope(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(FetcherError::RateLimited { retry_after: None })
                } else {
                    Ok(n)
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_hint_is_honored() {
    let calls = AtomicU32::new(0);
    let start = tokio::time::Instant::now();

    let policy = RetryPolicy {
        max_delay: Duration::from_secs(30),
        ..fast_policy(3)
    };

    let result = controller(policy)
        .run(&scope(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(FetcherError::RateLimited {
                        retry_after: Some(Duration::from_secs(7)),
                    })
                } else {
                    Ok(())
                }
            }
        })
        .await;

    assert!(result.is_ok());
    assert!(start.elapsed() >= Duration::from_secs(7));
}

#[tokio::test(start_paused = true)]
async fn test_oversized_retry_after_is_capped_at_max_delay() {
    let calls = AtomicU32::new(0);
    let start = tokio::time::Instant::now();
    let policy = RetryPolicy {
        max_delay: Duration::from_secs(30),
        ..fast_policy(3)
    };

    let result = controller(policy)
        .run(&scope(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(FetcherError::RateLimited {
                        retry_after: Some(Duration::from_secs(86_400)),
                    })
                } else {
                    Ok(())
                }
            }
        })
        .await;

    assert!(result.is_ok());
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(30));
    assert!(elapsed < Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_slow_call_times_out_as_transient() {
    let policy = RetryPolicy {
        call_timeout: Duration::from_millis(50),
        ..fast_policy(2)
    };
    let calls = AtomicU32::new(0);

    let result: Result<(), _> = controller(policy)
        .run(&scope(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }
        })
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    match result {
        Err(RetryError::Exhausted { last, .. }) => {
            assert!(matches!(last, FetcherError::TransientNetwork(_)))
        }
        other => panic!("expected Exhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn test_shutdown_interrupts_backoff() {
    let shutdown = ShutdownCoordinator::shared();
    let policy = RetryPolicy {
        base_delay: Duration::from_secs(30),
        max_delay: Duration::from_secs(30),
        ..fast_policy(5)
    };
    let retry = controller(policy).with_shutdown(shutdown.clone());

    let trigger = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            shutdown.request_shutdown();
        })
    };

    let result: Result<(), _> = tokio::time::timeout(
        Duration::from_secs(5),
        retry.run(&scope(), || async {
            Err(FetcherError::TransientNetwork("reset".into()))
        }),
    )
    .await
    .expect("backoff was not interrupted");

    trigger.await.unwrap();
    assert!(matches!(result, Err(RetryError::Cancelled)));
}
