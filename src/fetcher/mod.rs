//! Report fetchers
//!
//! A [`ReportSource`] knows how to fetch one page of one window. The
//! [`ReportFetcher`] drives a source across all pages of a window, running
//! every page request through the shared [`RetryController`].

use crate::shutdown::SharedShutdown;
use crate::sync::retry::{RetryController, RetryError};
use crate::window::ExtractionWindow;
use crate::ReportRecord;
use async_trait::async_trait;
use futures_util::TryStreamExt;
use std::time::Duration;
use tracing::{debug, info};

pub mod applovin_config;
pub mod applovin_http;
pub mod applovin_parser;
pub mod pagination;
pub mod retry_formatter;

/// How an error must be handled by the retry controller and the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry with backoff until the attempt ceiling
    Retryable,
    /// Stop the whole run
    Fatal,
    /// Fail only the affected window
    DataIntegrity,
}

/// Fetcher errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetcherError {
    /// Invalid or expired API key (401/403)
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Request rejected by the API for a reason other than auth (4xx)
    #[error("request rejected with status {status}: {message}")]
    InvalidRequest {
        /// HTTP status code
        status: u16,
        /// Body or reason returned by the API
        message: String,
    },

    /// Rate limit exceeded (429)
    #[error("rate limit exceeded")]
    RateLimited {
        /// Server-provided `Retry-After` hint
        retry_after: Option<Duration>,
    },

    /// Timeout, connection failure or 5xx
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// Response does not match the expected report schema
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl FetcherError {
    /// Classify the error; exhaustive so new variants must pick a policy
    pub fn class(&self) -> ErrorClass {
        match self {
            FetcherError::RateLimited { .. } | FetcherError::TransientNetwork(_) => {
                ErrorClass::Retryable
            }
            FetcherError::Auth(_) | FetcherError::InvalidRequest { .. } => ErrorClass::Fatal,
            FetcherError::MalformedResponse(_) => ErrorClass::DataIntegrity,
        }
    }

    /// Whether the retry controller may try again
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// Position of a page within a window
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageToken {
    /// First request of the window
    First,
    /// Opaque cursor returned by the previous page
    Cursor(String),
    /// Row offset for offset/limit pagination
    Offset(u64),
}

/// One page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Window being extracted
    pub window: ExtractionWindow,
    /// Page position
    pub token: PageToken,
}

/// One page of results
#[derive(Debug, Clone, Default)]
pub struct ReportPage {
    /// Normalized rows of the page
    pub records: Vec<ReportRecord>,
    /// Token for the following page; `None` when the window is exhausted
    pub next: Option<PageToken>,
}

/// Source of report pages (the remote API, or a fake in tests)
#[async_trait]
pub trait ReportSource: Send + Sync {
    /// Fetch a single page; must not retry internally
    async fn fetch_page(&self, request: &PageRequest) -> FetcherResult<ReportPage>;

    /// Short description for logs (e.g., the endpoint URL)
    fn describe(&self) -> String;
}

#[async_trait]
impl<S: ReportSource + ?Sized> ReportSource for Box<S> {
    async fn fetch_page(&self, request: &PageRequest) -> FetcherResult<ReportPage> {
        (**self).fetch_page(request).await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Fetches every page of a window through the retry controller
pub struct ReportFetcher<S> {
    source: S,
    retry: RetryController,
}

impl<S: ReportSource> ReportFetcher<S> {
    /// Create a fetcher around a source
    pub fn new(source: S, retry: RetryController) -> Self {
        Self { source, retry }
    }

    /// Abort retry backoff when shutdown is requested
    pub fn with_shutdown(self, shutdown: SharedShutdown) -> Self {
        Self {
            source: self.source,
            retry: self.retry.with_shutdown(shutdown),
        }
    }

    /// Fetch all records of a window
    ///
    /// Returns only once every page has been fetched; any page failing
    /// terminally fails the whole window.
    pub async fn fetch_window(
        &self,
        window: ExtractionWindow,
    ) -> Result<Vec<ReportRecord>, RetryError> {
        debug!(%window, source = %self.source.describe(), "Fetching window");

        let pages = pagination::page_stream(&self.source, &self.retry, window);
        let records = pages
            .try_fold(Vec::new(), |mut records, page| async move {
                records.extend(page.records);
                Ok(records)
            })
            .await?;

        info!(%window, records = records.len(), "Window fetched");
        Ok(records)
    }
}
