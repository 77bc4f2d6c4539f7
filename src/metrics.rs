//! Observability metrics for the report extractor
//!
//! Counters and histograms for API requests, 429s, retries and sync
//! progress. Recording is always cheap: without an installed recorder the
//! `metrics` macros are no-ops. `init_metrics` installs a Prometheus
//! exporter when `--metrics-addr` is given.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

static METRICS_INITIALIZED: OnceCell<SocketAddr> = OnceCell::new();

/// Correlation ID generator for request tracing
static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Metrics setup errors
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Prometheus exporter could not be installed
    #[error("failed to install Prometheus exporter on {addr}: {message}")]
    Install {
        /// Requested listen address
        addr: SocketAddr,
        /// Underlying error
        message: String,
    },
}

/// Initialize metrics system with Prometheus exporter
///
/// Must be called from within a tokio runtime. Idempotent: later calls are
/// ignored.
///
/// # Arguments
/// * `addr` - Socket address to bind Prometheus scrape endpoint (e.g., "0.0.0.0:9090")
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    if let Some(existing) = METRICS_INITIALIZED.get() {
        debug!(%existing, "Metrics already initialized, skipping");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::Install {
            addr,
            message: e.to_string(),
        })?;

    describe_counter!(
        "http_requests_total",
        Unit::Count,
        "Total number of HTTP requests made to the report API"
    );
    describe_counter!(
        "http_429_errors_total",
        Unit::Count,
        "Total number of 429 rate limit errors received"
    );
    describe_counter!(
        "http_retries_total",
        Unit::Count,
        "Total number of retry attempts"
    );
    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "HTTP request duration in seconds"
    );
    describe_histogram!(
        "retry_backoff_duration_seconds",
        Unit::Seconds,
        "Duration of retry backoff in seconds"
    );
    describe_histogram!(
        "rate_limit_queue_wait_seconds",
        Unit::Seconds,
        "Time spent waiting for rate limit permits"
    );
    describe_counter!(
        "records_emitted_total",
        Unit::Count,
        "Total number of RECORD messages emitted"
    );
    describe_counter!(
        "windows_committed_total",
        Unit::Count,
        "Total number of windows whose bookmark was committed"
    );
    describe_counter!(
        "windows_failed_total",
        Unit::Count,
        "Total number of windows that failed"
    );

    let _ = METRICS_INITIALIZED.set(addr);
    info!(%addr, "Metrics system initialized");
    Ok(())
}

/// Generate a new correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    let id = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("req-{id:08x}")
}

/// Timing and outcome of one HTTP request
pub struct HttpRequestMetrics {
    endpoint: &'static str,
    start_time: Instant,
    correlation_id: String,
}

impl HttpRequestMetrics {
    /// Start recording a new HTTP request
    pub fn start(endpoint: &'static str) -> Self {
        let correlation_id = generate_correlation_id();
        debug!(correlation_id = %correlation_id, endpoint, "Starting HTTP request");
        Self {
            endpoint,
            start_time: Instant::now(),
            correlation_id,
        }
    }

    /// Record completion of the HTTP request
    pub fn record_complete(&self, status_code: u16) {
        let duration = self.start_time.elapsed();

        counter!(
            "http_requests_total",
            "endpoint" => self.endpoint,
            "status" => status_code.to_string(),
        )
        .increment(1);
        histogram!("http_request_duration_seconds", "endpoint" => self.endpoint)
            .record(duration.as_secs_f64());

        if status_code == 429 {
            counter!("http_429_errors_total", "endpoint" => self.endpoint).increment(1);
            warn!(
                correlation_id = %self.correlation_id,
                endpoint = self.endpoint,
                duration_ms = duration.as_millis(),
                "Rate limit error (429) recorded"
            );
        }

        debug!(
            correlation_id = %self.correlation_id,
            endpoint = self.endpoint,
            status = status_code,
            duration_ms = duration.as_millis(),
            "HTTP request completed"
        );
    }

    /// Record a transport failure (no status code)
    pub fn record_transport_error(&self) {
        let duration = self.start_time.elapsed();

        counter!(
            "http_requests_total",
            "endpoint" => self.endpoint,
            "status" => "network_error",
        )
        .increment(1);
        histogram!("http_request_duration_seconds", "endpoint" => self.endpoint)
            .record(duration.as_secs_f64());

        debug!(
            correlation_id = %self.correlation_id,
            endpoint = self.endpoint,
            duration_ms = duration.as_millis(),
            "HTTP transport error recorded"
        );
    }

    /// Correlation ID for this request
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// Record a retry and its backoff
pub fn record_retry(backoff: Duration) {
    counter!("http_retries_total").increment(1);
    histogram!("retry_backoff_duration_seconds").record(backoff.as_secs_f64());
}

/// Record time spent waiting for a rate-limit permit
pub fn record_rate_limit_wait(wait: Duration) {
    histogram!("rate_limit_queue_wait_seconds").record(wait.as_secs_f64());
}

/// Record RECORD messages emitted for a stream
pub fn record_records_emitted(stream: &str, count: u64) {
    counter!("records_emitted_total", "stream" => stream.to_string()).increment(count);
}

/// Record a committed window
pub fn record_window_committed(stream: &str) {
    counter!("windows_committed_total", "stream" => stream.to_string()).increment(1);
}

/// Record a failed window
pub fn record_window_failed(stream: &str, reason: &'static str) {
    counter!(
        "windows_failed_total",
        "stream" => stream.to_string(),
        "reason" => reason,
    )
    .increment(1);
}
