//! Error classification and retry message formatting.
//!
//! Maps HTTP statuses and transport failures onto [`FetcherError`] and
//! renders consistent log lines for retries, recoveries and final failures.

use crate::fetcher::FetcherError;
use crate::window::ExtractionWindow;
use reqwest::{Error as ReqwestError, StatusCode};
use std::time::Duration;

/// Maximum length of a response body kept in error messages
const BODY_PREVIEW_LEN: usize = 300;

/// Where a call is going and what it is for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallScope {
    /// Endpoint or source description
    pub endpoint: String,
    /// Window being extracted, if any
    pub window: Option<ExtractionWindow>,
}

impl CallScope {
    /// Build a scope
    pub fn new(endpoint: impl Into<String>, window: Option<ExtractionWindow>) -> Self {
        Self {
            endpoint: endpoint.into(),
            window,
        }
    }
}

/// Short user-facing description of an error kind
pub fn describe(error: &FetcherError) -> &'static str {
    match error {
        FetcherError::Auth(_) => "authentication failed",
        FetcherError::InvalidRequest { status: 404, .. } => "resource not found",
        FetcherError::InvalidRequest { .. } => "request rejected",
        FetcherError::RateLimited { .. } => "rate limit exceeded",
        FetcherError::TransientNetwork(_) => "network error",
        FetcherError::MalformedResponse(_) => "malformed response",
    }
}

/// Suggested remediation shown after a terminal failure
pub fn suggestion(error: &FetcherError) -> &'static str {
    match error {
        FetcherError::Auth(_) => "Verify the report API key in the config file",
        FetcherError::InvalidRequest { .. } => {
            "Check the configured columns, report_type and date range"
        }
        FetcherError::RateLimited { .. } => {
            "Lower rate_limit.max_requests or wait before re-running"
        }
        FetcherError::TransientNetwork(_) => {
            "Check network connectivity; the API may be degraded, try again later"
        }
        FetcherError::MalformedResponse(_) => {
            "The report format may have changed; the window will be retried on the next run"
        }
    }
}

/// Context for formatting retry messages.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Current attempt number (1-based)
    pub attempt: u32,
    /// Maximum number of attempts configured
    pub max_attempts: u32,
    /// Error that triggered the retry
    pub error: FetcherError,
    /// Backoff duration until next attempt
    pub backoff_duration: Duration,
    /// Call being retried
    pub scope: CallScope,
}

impl RetryContext {
    /// Convenience constructor used throughout the retry logic.
    pub fn new(
        attempt: u32,
        max_attempts: u32,
        error: FetcherError,
        backoff_duration: Duration,
        scope: CallScope,
    ) -> Self {
        Self {
            attempt,
            max_attempts,
            error,
            backoff_duration,
            scope,
        }
    }

    /// Format standardized retry message with attempt counters and context.
    pub fn format_retry(&self) -> String {
        let mut message = format!(
            "Retrying (attempt {}/{}) after {} - waiting {:.1} seconds...",
            self.attempt + 1,
            self.max_attempts,
            describe(&self.error),
            self.backoff_duration.as_secs_f64()
        );
        append_window(&mut message, self.scope.window);
        message
    }

    /// Format retry success message when a previous attempt eventually works.
    pub fn format_success(&self) -> String {
        let mut message = format!(
            "Attempt {}/{} succeeded after {}",
            self.attempt,
            self.max_attempts,
            describe(&self.error)
        );
        append_window(&mut message, self.scope.window);
        message
    }

    /// Format final failure summary with actionable suggestions.
    pub fn format_failure(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!(
            "[FAILED] Request failed after {} attempt(s)",
            self.attempt
        ));
        lines.push(format!("  Last error: {}", self.error));

        let window_display = self
            .scope
            .window
            .map(|w| w.to_string())
            .unwrap_or_else(|| "none".to_string());
        lines.push(format!("  Window: {window_display}"));
        lines.push(format!("  Endpoint: {}", self.scope.endpoint));
        lines.push("  Suggestions:".to_string());

        for suggestion in self.format_suggestions() {
            lines.push(format!("    - {suggestion}"));
        }

        lines.join("\n")
    }

    /// Derive suggestions tailored to the current retry context.
    pub fn format_suggestions(&self) -> Vec<String> {
        let mut suggestions = vec![suggestion(&self.error).to_string()];
        if self.error.is_retryable() {
            suggestions.push(format!(
                "Try increasing --max-attempts (current: {})",
                self.max_attempts
            ));
        }
        suggestions
    }
}

/// Map a non-success HTTP status onto a [`FetcherError`]
pub fn classify_status(
    status: StatusCode,
    body: &str,
    retry_after: Option<Duration>,
) -> FetcherError {
    let message = body_preview(body);
    match status.as_u16() {
        401 | 403 => FetcherError::Auth(format!("status {}: {message}", status.as_u16())),
        408 => FetcherError::TransientNetwork(format!("request timeout (408): {message}")),
        429 => FetcherError::RateLimited { retry_after },
        code if status.is_server_error() => {
            FetcherError::TransientNetwork(format!("server error {code}: {message}"))
        }
        code => FetcherError::InvalidRequest {
            status: code,
            message,
        },
    }
}

/// Map a transport-level reqwest failure onto a [`FetcherError`]
pub fn classify_transport(err: ReqwestError) -> FetcherError {
    let decode = err.is_decode();
    let kind = if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    // Strip the URL: it carries the API key in its query string
    let err = err.without_url();

    if decode {
        return FetcherError::MalformedResponse(format!("failed to decode body: {err}"));
    }
    FetcherError::TransientNetwork(format!("{kind}: {err}"))
}

/// Parse a `Retry-After` header value given in seconds
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

fn body_preview(body: &str) -> String {
    let body = body.trim();
    if body.len() <= BODY_PREVIEW_LEN {
        return body.to_string();
    }
    let mut end = BODY_PREVIEW_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

fn append_window(buffer: &mut String, window: Option<ExtractionWindow>) {
    if let Some(window) = window {
        buffer.push_str(" for window ");
        buffer.push_str(&window.to_string());
    }
}
