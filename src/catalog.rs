//! Stream catalog
//!
//! Describes the `reports` stream: its JSON Schema (derived from the
//! selected columns), natural key and bookmark field.

use crate::{ReportRecord, REPORTS_STREAM};
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Report columns carried as numbers when selected as pass-through attributes
const NUMERIC_COLUMNS: [&str; 7] = [
    "ctr",
    "conversion_rate",
    "campaign_roas_goal",
    "average_cpa",
    "average_cpc",
    "ecpm",
    "roas",
];

/// Declaration of one output stream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamDescriptor {
    /// Stream name
    pub stream: String,
    /// Stable stream id
    pub tap_stream_id: String,
    /// JSON Schema of a record
    pub schema: Value,
    /// Natural key fields
    pub key_properties: Vec<String>,
    /// Fields the bookmark is derived from
    pub bookmark_properties: Vec<String>,
    /// Replication method
    pub replication_method: String,
}

/// Full catalog printed by `discover`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Catalog {
    /// Declared streams
    pub streams: Vec<StreamDescriptor>,
}

impl Catalog {
    /// Catalog for a column selection
    pub fn for_columns(columns: &[String]) -> Self {
        Self {
            streams: vec![StreamDescriptor::reports(columns)],
        }
    }
}

impl StreamDescriptor {
    /// Descriptor of the `reports` stream for a column selection
    pub fn reports(columns: &[String]) -> Self {
        Self {
            stream: REPORTS_STREAM.to_string(),
            tap_stream_id: REPORTS_STREAM.to_string(),
            schema: report_schema(columns),
            key_properties: ReportRecord::KEY_PROPERTIES
                .iter()
                .map(|k| k.to_string())
                .collect(),
            bookmark_properties: vec!["hour".to_string()],
            replication_method: "INCREMENTAL".to_string(),
        }
    }
}

/// JSON Schema for records produced with `columns` selected
pub fn report_schema(columns: &[String]) -> Value {
    let mut properties = Map::new();
    properties.insert(
        "hour".into(),
        json!({"type": "string", "format": "date-time"}),
    );
    for key in ["campaign_id", "creative_id", "country", "platform"] {
        properties.insert(key.into(), json!({"type": "string"}));
    }

    for column in columns {
        let (name, schema) = match column.as_str() {
            "campaign_id_external" | "creative_set_id" | "country" | "platform" | "day"
            | "hour" => continue,
            "impressions" | "clicks" | "conversions" => {
                (column.as_str(), json!({"type": ["null", "integer"], "minimum": 0}))
            }
            "cost" | "sales" => (
                column.as_str(),
                json!({"type": ["null", "string"], "format": "singer.decimal"}),
            ),
            other if NUMERIC_COLUMNS.contains(&other) => {
                (other, json!({"type": ["null", "number", "string"]}))
            }
            other => (other, json!({"type": ["null", "string", "number"]})),
        };
        properties.insert(name.to_string(), schema);
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": ["hour", "campaign_id", "creative_id", "country", "platform"],
        "additionalProperties": true,
    })
}
