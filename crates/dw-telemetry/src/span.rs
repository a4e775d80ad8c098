//! Span records and their expansion into per-detection rows.
//!
//! A prediction span carries call-level attributes in `SpanAttributes` and
//! one attribute map per detected object in `Events.Attributes`. Unnesting
//! turns a span with k events into k `PredictionEvent`s.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use dw_common::event::{coerce_f64, coerce_i64};
use dw_common::PredictionEvent;
use serde::Deserialize;
use thiserror::Error;

pub const ATTR_PREDICTION_ID: &str = "prediction_id";
pub const ATTR_PROCESSING_TIME: &str = "processing_time_seconds";
pub const ATTR_FILENAME: &str = "filename";
pub const ATTR_MODEL_NAME: &str = "model_name";
pub const ATTR_CLASS_NAME: &str = "class_name";
pub const ATTR_CONFIDENCE: &str = "confidence";
pub const ATTR_OBJECT_INDEX: &str = "object_index";

/// Malformed warehouse output.
#[derive(Debug, Error)]
pub enum SpanError {
    #[error("line {line}: invalid JSON row: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("line {line}: unparseable Timestamp '{raw}'")]
    Timestamp { line: usize, raw: String },
}

/// One span row as returned by the warehouse.
#[derive(Debug, Clone, Deserialize)]
pub struct SpanRecord {
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "SpanAttributes", default)]
    pub span_attributes: HashMap<String, String>,
    #[serde(rename = "EventAttributes", default)]
    pub event_attributes: Vec<HashMap<String, String>>,
}

impl SpanRecord {
    /// Expand into one row per nested event, repeating the span's scalars.
    pub fn unnest(&self, timestamp: DateTime<Utc>) -> impl Iterator<Item = PredictionEvent> + '_ {
        let attr = |key: &str| self.span_attributes.get(key).cloned();
        let prediction_id = attr(ATTR_PREDICTION_ID);
        let processing_time = self
            .span_attributes
            .get(ATTR_PROCESSING_TIME)
            .and_then(|v| coerce_f64(v));
        let filename = attr(ATTR_FILENAME);
        let model_name = attr(ATTR_MODEL_NAME);

        self.event_attributes.iter().map(move |event| PredictionEvent {
            timestamp,
            prediction_id: prediction_id.clone(),
            processing_time,
            filename: filename.clone(),
            model_name: model_name.clone(),
            class_name: event.get(ATTR_CLASS_NAME).cloned(),
            confidence: event.get(ATTR_CONFIDENCE).and_then(|v| coerce_f64(v)),
            object_index: event.get(ATTR_OBJECT_INDEX).and_then(|v| coerce_i64(v)),
        })
    }
}

/// Parse a `JSONEachRow` body and unnest every span, preserving order.
///
/// A blank body is a genuinely empty result and yields no rows.
pub fn parse_and_unnest(body: &str) -> Result<Vec<PredictionEvent>, SpanError> {
    let mut rows = Vec::new();
    for (idx, line) in body.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let span: SpanRecord = serde_json::from_str(line).map_err(|source| SpanError::Json {
            line: idx + 1,
            source,
        })?;
        let timestamp = parse_timestamp(&span.timestamp).ok_or_else(|| SpanError::Timestamp {
            line: idx + 1,
            raw: span.timestamp.clone(),
        })?;
        rows.extend(span.unnest(timestamp));
    }
    Ok(rows)
}

/// Accepts RFC 3339 (`date_time_output_format=iso`) and ClickHouse's
/// simple `YYYY-MM-DD hh:mm:ss[.fff]` form, both read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
