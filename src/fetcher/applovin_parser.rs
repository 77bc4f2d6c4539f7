//! AppLovin report payload parsing
//!
//! Converts the JSON body of a report response into [`ReportRecord`]s.
//! Any deviation from the expected shape is a
//! [`FetcherError::MalformedResponse`]: rows are never silently dropped.

use crate::fetcher::applovin_config::{DATE_FORMAT, NEXT_PAGE_KEY, RESULTS_KEY};
use crate::fetcher::{FetcherError, FetcherResult};
use crate::window::ExtractionWindow;
use crate::ReportRecord;
use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::str::FromStr;

/// Columns mapped onto typed [`ReportRecord`] fields
const TYPED_COLUMNS: [&str; 11] = [
    "day",
    "hour",
    "campaign_id_external",
    "creative_set_id",
    "country",
    "platform",
    "impressions",
    "clicks",
    "conversions",
    "cost",
    "sales",
];

/// Parsed report page
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPage {
    /// Rows of the page
    pub records: Vec<ReportRecord>,
    /// Cursor for the next page, if the API returned one
    pub next_cursor: Option<String>,
}

/// Parse a full response body
///
/// # Arguments
/// * `body` - Decoded JSON body
/// * `window` - Window the request covered; rows outside it are rejected
pub fn parse_report(body: &Value, window: ExtractionWindow) -> FetcherResult<ParsedPage> {
    let object = body
        .as_object()
        .ok_or_else(|| malformed("response body is not a JSON object"))?;

    if let Some(code) = object.get("code").and_then(Value::as_u64) {
        match code {
            200 => {}
            401 | 403 => {
                return Err(FetcherError::Auth(format!(
                    "API returned code {code} in response body"
                )))
            }
            429 => return Err(FetcherError::RateLimited { retry_after: None }),
            500..=599 => {
                return Err(FetcherError::TransientNetwork(format!(
                    "API returned code {code} in response body"
                )))
            }
            other => return Err(malformed(format!("API returned code {other} in response body"))),
        }
    }

    let rows = object
        .get(RESULTS_KEY)
        .and_then(Value::as_array)
        .ok_or_else(|| malformed(format!("missing '{RESULTS_KEY}' array")))?;

    let records = rows
        .iter()
        .enumerate()
        .map(|(index, row)| {
            parse_row(row, window).map_err(|e| match e {
                FetcherError::MalformedResponse(msg) => malformed(format!("row {index}: {msg}")),
                other => other,
            })
        })
        .collect::<FetcherResult<Vec<_>>>()?;

    let next_cursor = match object.get(NEXT_PAGE_KEY) {
        None | Some(Value::Null) | Some(Value::Bool(false)) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(other) => return Err(malformed(format!("unexpected '{NEXT_PAGE_KEY}' value {other}"))),
    };

    Ok(ParsedPage {
        records,
        next_cursor,
    })
}

/// Parse a single row object
pub fn parse_row(row: &Value, window: ExtractionWindow) -> FetcherResult<ReportRecord> {
    let row = row
        .as_object()
        .ok_or_else(|| malformed("row is not a JSON object"))?;

    let day_str = required_text(row, "day")?;
    let day = NaiveDate::parse_from_str(&day_str, DATE_FORMAT)
        .map_err(|e| malformed(format!("invalid day '{day_str}': {e}")))?;
    if !window.contains(day) {
        return Err(malformed(format!("day {day} outside requested window {window}")));
    }

    let hour = parse_hour(field(row, "hour")?)?;
    let hour = day
        .and_time(NaiveTime::from_hms_opt(hour, 0, 0).ok_or_else(|| malformed("invalid hour"))?)
        .and_utc();

    let attributes: Map<String, Value> = row
        .iter()
        .filter(|(key, _)| !TYPED_COLUMNS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    let record = ReportRecord {
        hour,
        campaign_id: required_text(row, "campaign_id_external")?,
        creative_id: required_text(row, "creative_set_id")?,
        country: required_text(row, "country")?.to_lowercase(),
        platform: required_text(row, "platform")?,
        impressions: parse_count(row, "impressions")?,
        clicks: parse_count(row, "clicks")?,
        conversions: parse_count(row, "conversions")?,
        cost: parse_decimal(row, "cost")?,
        sales: parse_decimal(row, "sales")?,
        attributes,
    };

    record.validate().map_err(malformed)?;
    Ok(record)
}

/// Parse the `hour` column
///
/// Accepts `13`, `"13"`, `"13:00"` and `"2024-01-07 13:00:00"`.
pub fn parse_hour(value: &Value) -> FetcherResult<u32> {
    let hour = match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|h| u32::try_from(h).ok())
            .ok_or_else(|| malformed(format!("invalid hour {n}")))?,
        Value::String(s) => {
            let s = s.trim();
            let time_part = s.rsplit(' ').next().unwrap_or(s);
            let hour_part = time_part.split(':').next().unwrap_or(time_part);
            hour_part
                .parse::<u32>()
                .map_err(|_| malformed(format!("invalid hour '{s}'")))?
        }
        other => return Err(malformed(format!("invalid hour {other}"))),
    };

    if hour > 23 {
        return Err(malformed(format!("hour {hour} out of range")));
    }
    Ok(hour)
}

fn field<'a>(row: &'a Map<String, Value>, column: &str) -> FetcherResult<&'a Value> {
    row.get(column)
        .ok_or_else(|| malformed(format!("missing column '{column}'")))
}

fn required_text(row: &Map<String, Value>, column: &str) -> FetcherResult<String> {
    match optional_text(row, column)? {
        Some(text) if !text.is_empty() => Ok(text),
        _ => Err(malformed(format!("missing column '{column}'"))),
    }
}

fn optional_text(row: &Map<String, Value>, column: &str) -> FetcherResult<Option<String>> {
    match row.get(column) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(malformed(format!(
            "column '{column}' has unexpected value {other}"
        ))),
    }
}

fn parse_count(row: &Map<String, Value>, column: &str) -> FetcherResult<Option<u64>> {
    match row.get(column) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
            .map(Some)
            .ok_or_else(|| malformed(format!("column '{column}' is not a count: {n}"))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| malformed(format!("column '{column}' is not a count: '{s}'"))),
        Some(other) => Err(malformed(format!(
            "column '{column}' is not a count: {other}"
        ))),
    }
}

fn parse_decimal(row: &Map<String, Value>, column: &str) -> FetcherResult<Option<Decimal>> {
    let text = match row.get(column) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(Value::String(s)) => s.trim().trim_start_matches('$').to_string(),
        Some(other) => {
            return Err(malformed(format!(
                "column '{column}' is not a number: {other}"
            )))
        }
    };

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map(Some)
        .map_err(|_| malformed(format!("column '{column}' is not a number: '{text}'")))
}

fn malformed(message: impl Into<String>) -> FetcherError {
    FetcherError::MalformedResponse(message.into())
}
