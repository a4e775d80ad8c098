//! Feature preparation.
//!
//! Both sides of a comparison go through [`prepare`], so they always carry
//! the identical projection `{class_name, confidence, processing_time}`.
//! Identity columns (prediction ids, filenames, raw timestamps) would show
//! up as spurious drift and are never shipped.

use dw_common::{Error, FeatureRecord, PredictionEvent, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A cleaned row: class and confidence are guaranteed present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub class_name: String,
    pub confidence: f64,
    pub processing_time: Option<f64>,
}

/// Labelled, non-empty feature table ready for the drift-service.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedDataset {
    pub label: String,
    pub rows: Vec<FeatureRow>,
    /// Input rows discarded for missing class or confidence.
    pub dropped: usize,
}

impl PreparedDataset {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Project per-detection events onto the feature columns.
pub fn project_events(events: &[PredictionEvent]) -> Vec<FeatureRecord> {
    events.iter().map(FeatureRecord::from).collect()
}

/// Validate and clean one side of a comparison.
///
/// Empty input is rejected, and so is input that becomes empty once rows
/// missing `class_name` or `confidence` are dropped.
pub fn prepare(records: &[FeatureRecord], label: &str) -> Result<PreparedDataset> {
    if records.is_empty() {
        return Err(Error::Validation {
            dataset: label.to_string(),
            message: "input has no rows".to_string(),
        });
    }

    let rows: Vec<FeatureRow> = records
        .iter()
        .filter_map(|r| match (&r.class_name, r.confidence) {
            (Some(class_name), Some(confidence)) => Some(FeatureRow {
                class_name: class_name.clone(),
                confidence,
                processing_time: r.processing_time,
            }),
            _ => None,
        })
        .collect();

    let dropped = records.len() - rows.len();
    if rows.is_empty() {
        return Err(Error::Validation {
            dataset: label.to_string(),
            message: format!("all {dropped} rows lack class_name or confidence"),
        });
    }
    debug!(dataset = label, kept = rows.len(), dropped, "prepared feature table");

    Ok(PreparedDataset {
        label: label.to_string(),
        rows,
        dropped,
    })
}
