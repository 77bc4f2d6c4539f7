//! AppLovin Reporting API client
//!
//! Implements [`ReportSource`] over HTTP:
//! - Query construction (key, columns, day range, paging)
//! - Status and transport error classification
//! - Response decoding into normalized records
//!
//! The client performs exactly one request per call; retries, backoff and
//! throttling belong to [`crate::sync::retry::RetryController`].

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use crate::config::ValidatedConfig;
use crate::fetcher::applovin_config::{
    PaginationMode, ReportEndpointConfig, DATE_FORMAT, PAGE_PARAM, REPORT_ENDPOINT,
    RESPONSE_FORMAT,
};
use crate::fetcher::applovin_parser::parse_report;
use crate::fetcher::retry_formatter::{classify_status, classify_transport, parse_retry_after};
use crate::fetcher::{FetcherError, FetcherResult, PageRequest, PageToken, ReportPage, ReportSource};
use crate::metrics::HttpRequestMetrics;

/// Build the HTTP client shared by all requests of a run
///
/// Configured with explicit timeouts so no request can hang indefinitely.
pub fn build_http_client(
    connect_timeout: Duration,
    request_timeout: Duration,
) -> FetcherResult<Client> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(request_timeout)
        .user_agent(concat!("tap-applovin/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| {
            FetcherError::TransientNetwork(format!(
                "failed to build HTTP client: {e}. Check system TLS configuration."
            ))
        })
}

/// HTTP client for the AppLovin report endpoint
pub struct ApplovinHttpClient {
    client: Arc<Client>,
    api_key: String,
    endpoint: ReportEndpointConfig,
}

impl ApplovinHttpClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `client` - Shared HTTP client (Arc for cheap cloning)
    /// * `api_key` - Report API key
    /// * `endpoint` - Endpoint, columns and paging settings
    pub fn new(client: Arc<Client>, api_key: impl Into<String>, endpoint: ReportEndpointConfig) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            endpoint,
        }
    }

    /// Create a client from validated configuration
    pub fn from_config(config: &ValidatedConfig) -> FetcherResult<Self> {
        let client = build_http_client(config.connect_timeout, config.retry.call_timeout)?;
        Ok(Self::new(
            Arc::new(client),
            config.api_key.clone(),
            config.endpoint.clone(),
        ))
    }

    /// Endpoint settings
    pub fn endpoint(&self) -> &ReportEndpointConfig {
        &self.endpoint
    }

    /// Query parameters for a page request
    ///
    /// `end` is the last day of the window (the API treats it as inclusive).
    pub fn query_params(&self, request: &PageRequest) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("api_key", self.api_key.clone()),
            ("format", RESPONSE_FORMAT.to_string()),
            ("report_type", self.endpoint.report_type.clone()),
            ("columns", self.endpoint.columns_param()),
            ("start", request.window.start.format(DATE_FORMAT).to_string()),
            ("end", request.window.last_day().format(DATE_FORMAT).to_string()),
        ];

        match (&self.endpoint.pagination, &request.token) {
            (PaginationMode::Cursor, PageToken::Cursor(cursor)) => {
                params.push((PAGE_PARAM, cursor.clone()));
            }
            (PaginationMode::Offset { page_size }, token) => {
                let offset = match token {
                    PageToken::Offset(offset) => *offset,
                    _ => 0,
                };
                params.push(("limit", page_size.to_string()));
                params.push(("offset", offset.to_string()));
            }
            _ => {}
        }

        params
    }

    fn next_token(&self, request: &PageRequest, rows: usize, cursor: Option<String>) -> Option<PageToken> {
        match self.endpoint.pagination {
            PaginationMode::Cursor => cursor.map(PageToken::Cursor),
            PaginationMode::Offset { page_size } => {
                let offset = match request.token {
                    PageToken::Offset(offset) => offset,
                    _ => 0,
                };
                let rows = rows as u64;
                (rows >= page_size).then(|| PageToken::Offset(offset + rows))
            }
        }
    }
}

impl fmt::Debug for ApplovinHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplovinHttpClient")
            .field("api_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[async_trait]
impl ReportSource for ApplovinHttpClient {
    async fn fetch_page(&self, request: &PageRequest) -> FetcherResult<ReportPage> {
        let url = self.endpoint.report_url();
        let params = self.query_params(request);

        debug!(
            url = %url,
            window = %request.window,
            token = ?request.token,
            "Sending report request"
        );

        let metrics = HttpRequestMetrics::start(REPORT_ENDPOINT);
        let response = match self.client.get(&url).query(&params).send().await {
            Ok(response) => response,
            Err(e) => {
                metrics.record_transport_error();
                return Err(classify_transport(e));
            }
        };

        let status = response.status();
        metrics.record_complete(status.as_u16());

        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let body = response.text().await.unwrap_or_default();

            if status.is_client_error() && status.as_u16() != 429 {
                error!(
                    status = status.as_u16(),
                    body = %body,
                    window = %request.window,
                    "Report API rejected the request"
                );
            }
            return Err(classify_status(status, &body, retry_after));
        }

        let body: Value = response.json().await.map_err(classify_transport)?;
        let parsed = parse_report(&body, request.window)?;
        let next = self.next_token(request, parsed.records.len(), parsed.next_cursor);

        debug!(
            window = %request.window,
            rows = parsed.records.len(),
            has_next = next.is_some(),
            "Report page received"
        );

        Ok(ReportPage {
            records: parsed.records,
            next,
        })
    }

    fn describe(&self) -> String {
        self.endpoint.report_url()
    }
}
