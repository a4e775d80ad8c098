//! Per-detection row types.
//!
//! `PredictionEvent` is one detected object from one inference call. Every
//! field that comes from a string-keyed attribute map is an explicit
//! `Option`, so a missing or unparseable attribute is a typed `None` rather
//! than a failed row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// One row per detected object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionEvent {
    pub timestamp: DateTime<Utc>,
    /// Groups all detections of one inference call.
    pub prediction_id: Option<String>,
    /// Seconds; shared by every row of the same prediction.
    pub processing_time: Option<f64>,
    pub filename: Option<String>,
    pub model_name: Option<String>,
    pub class_name: Option<String>,
    pub confidence: Option<f64>,
    /// Position of the object within its inference call.
    pub object_index: Option<i64>,
}

/// The drift feature projection of a row.
///
/// Downloaded datasets arrive in this shape; numeric cells may be JSON
/// numbers, numeric strings, or null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub confidence: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub processing_time: Option<f64>,
}

impl From<&PredictionEvent> for FeatureRecord {
    fn from(event: &PredictionEvent) -> Self {
        FeatureRecord {
            class_name: event.class_name.clone(),
            confidence: event.confidence,
            processing_time: event.processing_time,
        }
    }
}

/// Parse a float attribute; anything unparseable or non-finite is `None`.
pub fn coerce_f64(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse an integer attribute. Integral floats such as `"2.0"` are accepted.
pub fn coerce_i64(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(v) = raw.parse::<i64>() {
        return Some(v);
    }
    coerce_f64(raw)
        .filter(|v| v.fract() == 0.0 && v.abs() < i64::MAX as f64)
        .map(|v| v as i64)
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64().filter(|v| v.is_finite()),
        Some(serde_json::Value::String(s)) => coerce_f64(&s),
        _ => None,
    })
}
