//! # tap-applovin
//!
//! Incremental extractor for AppLovin hourly advertising reports. Reports are
//! broken down by campaign, creative, country and platform, fetched day by day
//! from the AppLovin Reporting API and emitted as a JSON-lines record stream
//! (SCHEMA / RECORD / STATE messages) for a downstream loader.
//!
//! ## Features
//!
//! - **Incremental sync**: a per-stream bookmark records the last fully
//!   emitted day so re-runs resume instead of re-fetching
//! - **Window planning**: date ranges are split into contiguous, half-open
//!   windows with an optional trailing overlap for late-arriving data
//! - **Retry with backoff**: transient failures and 429s are retried with
//!   jittered exponential backoff under a hard attempt ceiling
//! - **Rate limiting**: every request goes through one shared limiter
//! - **Crash safety**: the bookmark only advances after a window's records
//!   are flushed downstream, and state files are written atomically
//!
//! ## Quick Start
//!
//! ```no_run
//! use tap_applovin::config::TapConfig;
//! use tap_applovin::fetcher::applovin_http::ApplovinHttpClient;
//! use tap_applovin::output::JsonLinesWriter;
//! use tap_applovin::resume::MemoryCheckpointStore;
//! use tap_applovin::sync::SyncOrchestrator;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TapConfig::from_path("config.json")?.validate()?;
//! let source = ApplovinHttpClient::from_config(&config)?;
//!
//! let mut orchestrator = SyncOrchestrator::from_config(
//!     &config,
//!     source,
//!     MemoryCheckpointStore::default(),
//!     JsonLinesWriter::new(std::io::stdout()),
//! );
//! let summary = orchestrator.run().await?;
//! eprintln!("{}", summary.describe());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`window`] - Window Planner (date range → ordered extraction windows)
//! - [`fetcher`] - Report Fetcher, pagination and the AppLovin HTTP source
//! - [`sync`] - Retry/Backoff Controller, rate limiter and Sync Orchestrator
//! - [`resume`] - Checkpoint Store (bookmarks, state files, locking)
//! - [`output`] - Record-stream protocol writer
//! - [`catalog`] - Stream schema declaration
//! - [`config`] - Configuration loading and validation

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::{DateTime, Timelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Stream catalog and schema declaration
pub mod catalog;

/// CLI command implementations
pub mod cli;

/// Configuration loading and validation
pub mod config;

/// Report fetchers
pub mod fetcher;

/// Prometheus metrics
pub mod metrics;

/// Record-stream protocol output
pub mod output;

/// Bookmark persistence
pub mod resume;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

/// Retry, rate limiting and sync orchestration
pub mod sync;

/// Extraction window planning
pub mod window;

// Re-export commonly used types
pub use window::ExtractionWindow;

/// Name of the single stream this tap produces
pub const REPORTS_STREAM: &str = "reports";

/// One row of the hourly AppLovin report
///
/// Dimensions and the `hour` timestamp form the natural key (see
/// [`ReportRecord::key`]). Metrics the caller did not select stay `None`;
/// every other selected column is kept verbatim in `attributes`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportRecord {
    /// Start of the hour this row aggregates (UTC)
    pub hour: DateTime<Utc>,
    /// External campaign id (`campaign_id_external`)
    pub campaign_id: String,
    /// Creative set id (`creative_set_id`)
    pub creative_id: String,
    /// Country code as reported by AppLovin (lowercase ISO-3166 alpha-2)
    pub country: String,
    /// Platform (`android`, `ios`, ...)
    pub platform: String,
    /// Impressions served
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impressions: Option<u64>,
    /// Clicks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clicks: Option<u64>,
    /// Conversions (installs for app campaigns)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversions: Option<u64>,
    /// Spend in account currency
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<Decimal>,
    /// Attributed sales
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sales: Option<Decimal>,
    /// Remaining selected columns, passed through untouched
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// Natural composite key of a [`ReportRecord`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    /// Hour bucket
    pub hour: DateTime<Utc>,
    /// Campaign id
    pub campaign_id: String,
    /// Creative id
    pub creative_id: String,
    /// Country code
    pub country: String,
    /// Platform
    pub platform: String,
}

impl ReportRecord {
    /// Field names making up the natural key, in key order
    pub const KEY_PROPERTIES: [&'static str; 5] =
        ["hour", "campaign_id", "creative_id", "country", "platform"];

    /// Natural key used by downstream consumers to deduplicate rows
    pub fn key(&self) -> RecordKey {
        RecordKey {
            hour: self.hour,
            campaign_id: self.campaign_id.clone(),
            creative_id: self.creative_id.clone(),
            country: self.country.clone(),
            platform: self.platform.clone(),
        }
    }

    /// Validate record integrity
    pub fn validate(&self) -> Result<(), String> {
        if self.campaign_id.is_empty() {
            return Err("campaign id cannot be empty".to_string());
        }

        if self.platform.is_empty() {
            return Err("platform cannot be empty".to_string());
        }

        if self.hour.minute() != 0 || self.hour.second() != 0 {
            return Err(format!(
                "hour should be at an exact hour boundary, got {}",
                self.hour
            ));
        }

        if let Some(cost) = self.cost {
            if cost < Decimal::ZERO {
                return Err(format!("cost must be non-negative, got {cost}"));
            }
        }

        Ok(())
    }
}
