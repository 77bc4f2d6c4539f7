use std::time::Duration;

use chrono::NaiveDate;
use reqwest::StatusCode;
use tap_applovin::fetcher::retry_formatter::{
    classify_status, parse_retry_after, CallScope, RetryContext,
};
use tap_applovin::fetcher::FetcherError;
use tap_applovin::window::ExtractionWindow;

fn sample_context(error: FetcherError) -> RetryContext {
    let window = ExtractionWindow::new(
        NaiveDate::from_ymd_opt(2024, 1, 7).unwrap(),
        NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
    )
    .unwrap();
    RetryContext::new(
        2,
        5,
        error,
        Duration::from_secs(4),
        CallScope::new("https://r.applovin.com/report", Some(window)),
    )
}

#[test]
fn format_retry_captures_attempt_and_wait() {
    let ctx = sample_context(FetcherError::RateLimited { retry_after: None });
    let message = ctx.format_retry();
    assert!(message.contains("attempt 3/5"));
    assert!(message.contains("rate limit exceeded"));
    assert!(message.contains("4.0 seconds"));
    assert!(message.contains("[2024-01-07, 2024-01-08)"));
}

#[test]
fn format_success_includes_window() {
    let ctx = sample_context(FetcherError::TransientNetwork("timeout".into()));
    let message = ctx.format_success();
    assert!(message.contains("Attempt 2/5 succeeded after network error"));
    assert!(message.contains("2024-01-07"));
}

#[test]
fn format_failure_lists_context_and_suggestions() {
    let ctx = sample_context(FetcherError::TransientNetwork("connection reset".into()));
    let message = ctx.format_failure();
    assert!(message.starts_with("[FAILED] Request failed after 2 attempt(s)"));
    assert!(message.contains("Last error: transient network error: connection reset"));
    assert!(message.contains("Endpoint: https://r.applovin.com/report"));
    assert!(message.contains("--max-attempts (current: 5)"));
}

#[test]
fn fatal_errors_do_not_suggest_more_attempts() {
    let ctx = sample_context(FetcherError::Auth("status 401".into()));
    let suggestions = ctx.format_suggestions();
    assert_eq!(suggestions.len(), 1);
    assert!(suggestions[0].contains("API key"));
}

#[test]
fn status_mapping_follows_error_taxonomy() {
    assert!(matches!(
        classify_status(StatusCode::UNAUTHORIZED, "", None),
        FetcherError::Auth(_)
    ));
    assert!(matches!(
        classify_status(StatusCode::FORBIDDEN, "", None),
        FetcherError::Auth(_)
    ));
    assert!(matches!(
        classify_status(StatusCode::BAD_GATEWAY, "", None),
        FetcherError::TransientNetwork(_)
    ));
    assert!(matches!(
        classify_status(StatusCode::REQUEST_TIMEOUT, "", None),
        FetcherError::TransientNetwork(_)
    ));
    assert!(matches!(
        classify_status(StatusCode::BAD_REQUEST, "bad column", None),
        FetcherError::InvalidRequest { status: 400, .. }
    ));

    let limited = classify_status(
        StatusCode::TOO_MANY_REQUESTS,
        "",
        parse_retry_after("12"),
    );
    assert!(matches!(
        limited,
        FetcherError::RateLimited { retry_after: Some(d) } if d == Duration::from_secs(12)
    ));
}
