//! AppLovin Reporting API configuration
//!
//! Endpoint constants and column sets. The API serves one flat table per
//! call; `columns` selects both the dimensions the rows are grouped by and
//! the metrics returned.

/// Default API root
pub const DEFAULT_BASE_URL: &str = "https://r.applovin.com";

/// Report endpoint path
pub const REPORT_ENDPOINT: &str = "/report";

/// Default report type
pub const DEFAULT_REPORT_TYPE: &str = "advertiser";

/// Response format requested from the API
pub const RESPONSE_FORMAT: &str = "json";

/// Date format used by the `start`/`end` query parameters and `day` column
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// JSON key holding the rows of a response
pub const RESULTS_KEY: &str = "results";

/// JSON key holding the next-page cursor of a response
pub const NEXT_PAGE_KEY: &str = "next_page";

/// Query parameter carrying the page cursor
pub const PAGE_PARAM: &str = "page";

/// Columns that make up the natural key; always requested
pub const REQUIRED_COLUMNS: [&str; 6] = [
    "day",
    "hour",
    "campaign_id_external",
    "creative_set_id",
    "country",
    "platform",
];

/// Columns requested when the config does not select any
pub const DEFAULT_COLUMNS: [&str; 22] = [
    "day",
    "hour",
    "campaign",
    "campaign_id_external",
    "cost",
    "country",
    "platform",
    "impressions",
    "clicks",
    "ctr",
    "conversions",
    "conversion_rate",
    "sales",
    "ad",
    "ad_id",
    "ad_type",
    "creative_set",
    "creative_set_id",
    "campaign_type",
    "campaign_roas_goal",
    "device_type",
    "size",
];

/// How the API is paged within a day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationMode {
    /// Follow the `next_page` cursor until it is absent
    Cursor,
    /// `limit`/`offset` paging; a short page ends the window
    Offset {
        /// Rows per page (the API's row cap)
        page_size: u64,
    },
}

/// Settings for one report endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEndpointConfig {
    /// API root (e.g., <https://r.applovin.com>)
    pub base_url: String,
    /// Value of the `report_type` parameter
    pub report_type: String,
    /// Selected columns, required columns included
    pub columns: Vec<String>,
    /// Paging strategy
    pub pagination: PaginationMode,
}

impl ReportEndpointConfig {
    /// Full URL of the report endpoint
    pub fn report_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), REPORT_ENDPOINT)
    }

    /// Comma-joined column list for the `columns` query parameter
    pub fn columns_param(&self) -> String {
        self.columns.join(",")
    }
}

impl Default for ReportEndpointConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            report_type: DEFAULT_REPORT_TYPE.to_string(),
            columns: with_required_columns(DEFAULT_COLUMNS.iter().map(|c| c.to_string())),
            pagination: PaginationMode::Cursor,
        }
    }
}

/// Deduplicate `selected` and make sure every required column is present
///
/// Required columns the caller left out are prepended in their canonical
/// order; the caller's own order is kept otherwise.
pub fn with_required_columns(selected: impl IntoIterator<Item = String>) -> Vec<String> {
    let selected: Vec<String> = selected
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();

    let mut columns: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|required| !selected.iter().any(|c| c == *required))
        .map(|c| c.to_string())
        .collect();

    for column in selected {
        if !columns.contains(&column) {
            columns.push(column);
        }
    }
    columns
}
