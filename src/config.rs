//! Configuration loading and validation
//!
//! The config file is JSON. [`TapConfig`] mirrors the file; validation turns
//! it into a [`ValidatedConfig`] with typed dates, durations and endpoint
//! settings so the engine never re-checks ranges.

use crate::fetcher::applovin_config::{
    with_required_columns, PaginationMode, ReportEndpointConfig, DATE_FORMAT, DEFAULT_BASE_URL,
    DEFAULT_COLUMNS, DEFAULT_REPORT_TYPE,
};
use crate::sync::config::{
    DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_JITTER, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_REQUESTS, DEFAULT_RATE_WINDOW_SECS, INITIAL_BACKOFF_MS, MAX_ATTEMPTS_LIMIT,
    MAX_BACKOFF_MS,
};
use crate::sync::rate_limit::RateLimiter;
use crate::sync::retry::RetryPolicy;
use crate::window::PlannerConfig;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Default lookback when no start date is configured
pub const DEFAULT_REPORT_RANGE_DAYS: u32 = 30;

/// Largest accepted trailing overlap
pub const MAX_OVERLAP_DAYS: u32 = 30;

/// Largest accepted window width
pub const MAX_WINDOW_DAYS: u32 = 31;

/// Rows per page in offset pagination mode when unset
pub const DEFAULT_PAGE_SIZE: u64 = 10_000;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config {path}: {message}")]
    Io {
        /// Config path
        path: String,
        /// Underlying error
        message: String,
    },

    /// Config file is not valid JSON for this schema
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// A field violates its constraint
    #[error("invalid config field '{field}': {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// Violated constraint
        reason: String,
    },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Column selection: a JSON list or a comma-separated string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnSelection {
    /// `["day", "clicks"]`
    List(Vec<String>),
    /// `"day,clicks"`
    Csv(String),
}

impl ColumnSelection {
    /// Individual column names
    pub fn into_columns(self) -> Vec<String> {
        match self {
            ColumnSelection::List(columns) => columns,
            ColumnSelection::Csv(text) => text.split(',').map(|c| c.to_string()).collect(),
        }
    }
}

/// Pagination strategy name in the config file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaginationKind {
    /// Follow `next_page`
    #[default]
    Cursor,
    /// `limit`/`offset`
    Offset,
}

/// Retry and timeout settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Attempts per call, first included (1..=20)
    pub max_attempts: u32,
    /// Delay after the first failure
    pub base_delay_ms: u64,
    /// Delay cap
    pub max_delay_ms: u64,
    /// Jitter fraction (0..=1)
    pub jitter: f64,
    /// Per-call timeout
    pub request_timeout_secs: u64,
    /// TCP connect timeout
    pub connect_timeout_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: INITIAL_BACKOFF_MS,
            max_delay_ms: MAX_BACKOFF_MS,
            jitter: DEFAULT_JITTER,
            request_timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

/// Request-rate ceiling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Requests allowed per window
    pub max_requests: usize,
    /// Window length in seconds
    pub per_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            per_secs: DEFAULT_RATE_WINDOW_SECS,
        }
    }
}

/// Raw configuration file
#[derive(Clone, Serialize, Deserialize)]
pub struct TapConfig {
    /// Report API key
    pub api_key: String,
    /// Lookback in days when no start date or bookmark applies
    #[serde(default = "default_report_range_days")]
    pub report_range_days: i64,
    /// `YYYY-MM-DD`; overrides `report_range_days`
    #[serde(default)]
    pub start_date: Option<String>,
    /// `YYYY-MM-DD`, exclusive; defaults to today
    #[serde(default)]
    pub end_date: Option<String>,
    /// Selected report columns
    #[serde(default)]
    pub columns: Option<ColumnSelection>,
    /// `report_type` parameter
    #[serde(default)]
    pub report_type: Option<String>,
    /// API root
    #[serde(default)]
    pub base_url: Option<String>,
    /// Trailing days re-fetched on resume
    #[serde(default)]
    pub overlap_days: i64,
    /// Days per extraction window
    #[serde(default = "default_window_days")]
    pub window_days: i64,
    /// Pagination strategy
    #[serde(default)]
    pub pagination: PaginationKind,
    /// Rows per page for offset pagination
    #[serde(default)]
    pub page_size: Option<u64>,
    /// Keep fetching later windows after a malformed one
    #[serde(default = "default_true")]
    pub continue_on_malformed: bool,
    /// Retry settings
    #[serde(default)]
    pub retry: RetrySettings,
    /// Rate limit settings
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
}

fn default_report_range_days() -> i64 {
    i64::from(DEFAULT_REPORT_RANGE_DAYS)
}

fn default_window_days() -> i64 {
    1
}

fn default_true() -> bool {
    true
}

impl fmt::Debug for TapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TapConfig")
            .field("api_key", &"<redacted>")
            .field("report_range_days", &self.report_range_days)
            .field("start_date", &self.start_date)
            .field("end_date", &self.end_date)
            .field("columns", &self.columns)
            .field("report_type", &self.report_type)
            .field("base_url", &self.base_url)
            .field("overlap_days", &self.overlap_days)
            .field("window_days", &self.window_days)
            .field("pagination", &self.pagination)
            .field("page_size", &self.page_size)
            .field("continue_on_malformed", &self.continue_on_malformed)
            .field("retry", &self.retry)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

impl TapConfig {
    /// Minimal config with every optional field at its default
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            report_range_days: default_report_range_days(),
            start_date: None,
            end_date: None,
            columns: None,
            report_type: None,
            base_url: None,
            overlap_days: 0,
            window_days: default_window_days(),
            pagination: PaginationKind::default(),
            page_size: None,
            continue_on_malformed: true,
            retry: RetrySettings::default(),
            rate_limit: RateLimitSettings::default(),
        }
    }

    /// Read and parse a JSON config file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&raw)
    }

    /// Parse JSON config text
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply a command-line `--max-attempts` override
    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        if let Some(max_attempts) = max_attempts {
            self.retry.max_attempts = max_attempts;
        }
        self
    }

    /// Check every constraint and produce the engine's config
    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        let api_key = self.api_key.trim().to_string();
        if api_key.is_empty() {
            return Err(invalid("api_key", "must not be empty"));
        }

        let report_range_days = u32::try_from(self.report_range_days)
            .ok()
            .filter(|d| *d >= 1)
            .ok_or_else(|| invalid("report_range_days", "must be an integer >= 1"))?;

        let overlap_days = u32::try_from(self.overlap_days)
            .ok()
            .filter(|d| *d <= MAX_OVERLAP_DAYS)
            .ok_or_else(|| invalid("overlap_days", format!("must be within 0..={MAX_OVERLAP_DAYS}")))?;

        let window_days = u32::try_from(self.window_days)
            .ok()
            .filter(|d| (1..=MAX_WINDOW_DAYS).contains(d))
            .ok_or_else(|| invalid("window_days", format!("must be within 1..={MAX_WINDOW_DAYS}")))?;

        let start_date = match self.start_date.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(text) => match NaiveDate::parse_from_str(text, DATE_FORMAT) {
                Ok(date) => Some(date),
                Err(_) => {
                    warn!(
                        start_date = text,
                        "Invalid start_date format, using report_range_days instead"
                    );
                    None
                }
            },
        };

        let end_date = match self.end_date.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(text) => Some(
                NaiveDate::parse_from_str(text, DATE_FORMAT)
                    .map_err(|e| invalid("end_date", format!("'{text}' is not YYYY-MM-DD: {e}")))?,
            ),
        };

        let retry = &self.retry;
        if !(1..=MAX_ATTEMPTS_LIMIT).contains(&retry.max_attempts) {
            return Err(invalid(
                "retry.max_attempts",
                format!("must be within 1..={MAX_ATTEMPTS_LIMIT}"),
            ));
        }
        if retry.base_delay_ms == 0 {
            return Err(invalid("retry.base_delay_ms", "must be > 0"));
        }
        if retry.max_delay_ms < retry.base_delay_ms {
            return Err(invalid("retry.max_delay_ms", "must be >= retry.base_delay_ms"));
        }
        if !(0.0..=1.0).contains(&retry.jitter) {
            return Err(invalid("retry.jitter", "must be within 0.0..=1.0"));
        }
        if retry.request_timeout_secs == 0 {
            return Err(invalid("retry.request_timeout_secs", "must be > 0"));
        }
        if retry.connect_timeout_secs == 0 {
            return Err(invalid("retry.connect_timeout_secs", "must be > 0"));
        }
        if self.rate_limit.max_requests == 0 {
            return Err(invalid("rate_limit.max_requests", "must be >= 1"));
        }

        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(invalid("base_url", "must start with http:// or https://"));
        }

        let pagination = match self.pagination {
            PaginationKind::Cursor => PaginationMode::Cursor,
            PaginationKind::Offset => {
                let page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
                if page_size == 0 {
                    return Err(invalid("page_size", "must be >= 1"));
                }
                PaginationMode::Offset { page_size }
            }
        };

        let selected = match self.columns {
            Some(selection) => selection.into_columns(),
            None => DEFAULT_COLUMNS.iter().map(|c| c.to_string()).collect(),
        };
        let columns = with_required_columns(selected);

        let report_type = self
            .report_type
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REPORT_TYPE.to_string());

        Ok(ValidatedConfig {
            api_key,
            planner: PlannerConfig {
                report_range_days,
                start_date,
                end_date,
                overlap_days,
                window_days,
            },
            endpoint: ReportEndpointConfig {
                base_url,
                report_type,
                columns,
                pagination,
            },
            retry: RetryPolicy::from_settings(&self.retry),
            connect_timeout: Duration::from_secs(self.retry.connect_timeout_secs),
            rate_limit: self.rate_limit,
            continue_on_malformed: self.continue_on_malformed,
        })
    }
}

/// Configuration after validation
#[derive(Clone)]
pub struct ValidatedConfig {
    /// Report API key
    pub api_key: String,
    /// Window planning inputs
    pub planner: PlannerConfig,
    /// Endpoint, columns and pagination
    pub endpoint: ReportEndpointConfig,
    /// Retry policy
    pub retry: RetryPolicy,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Request-rate ceiling
    pub rate_limit: RateLimitSettings,
    /// Keep fetching later windows after a malformed one
    pub continue_on_malformed: bool,
}

impl ValidatedConfig {
    /// Rate limiter shared by every request of a run
    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::request_based(
            self.rate_limit.max_requests,
            Duration::from_secs(self.rate_limit.per_secs),
        )
    }
}

impl fmt::Debug for ValidatedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatedConfig")
            .field("api_key", &"<redacted>")
            .field("planner", &self.planner)
            .field("endpoint", &self.endpoint)
            .field("retry", &self.retry)
            .field("connect_timeout", &self.connect_timeout)
            .field("rate_limit", &self.rate_limit)
            .field("continue_on_malformed", &self.continue_on_malformed)
            .finish()
    }
}
