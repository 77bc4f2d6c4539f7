//! Protocol message types

use crate::catalog::StreamDescriptor;
use crate::resume::StateDocument;
use crate::ReportRecord;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// One line of the record stream
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Stream declaration, emitted once before any record
    Schema {
        /// Stream name
        stream: String,
        /// JSON Schema of the records
        schema: Value,
        /// Natural key fields
        key_properties: Vec<String>,
        /// Fields the bookmark is derived from
        bookmark_properties: Vec<String>,
    },
    /// One report row
    Record {
        /// Stream name
        stream: String,
        /// Row data
        record: ReportRecord,
        /// When the row was fetched
        time_extracted: DateTime<Utc>,
    },
    /// Current bookmarks, emitted after each committed window
    State {
        /// Bookmarks of every stream
        value: StateDocument,
    },
}

impl Message {
    /// SCHEMA message for a stream
    pub fn schema(descriptor: &StreamDescriptor) -> Self {
        Message::Schema {
            stream: descriptor.stream.clone(),
            schema: descriptor.schema.clone(),
            key_properties: descriptor.key_properties.clone(),
            bookmark_properties: descriptor.bookmark_properties.clone(),
        }
    }

    /// RECORD message
    pub fn record(stream: &str, record: ReportRecord, time_extracted: DateTime<Utc>) -> Self {
        Message::Record {
            stream: stream.to_string(),
            record,
            time_extracted,
        }
    }

    /// STATE message
    pub fn state(value: StateDocument) -> Self {
        Message::State { value }
    }

    /// Protocol type tag
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Schema { .. } => "SCHEMA",
            Message::Record { .. } => "RECORD",
            Message::State { .. } => "STATE",
        }
    }
}
