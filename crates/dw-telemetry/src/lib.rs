//! driftwatch telemetry extraction.
//!
//! This crate provides:
//! - The `Warehouse` transport seam and its ClickHouse HTTP implementation
//! - Query construction for every extraction intent
//! - Unnesting of span records into one `PredictionEvent` per detection
//! - `TelemetryExtractor`, the read-only entry point used by the pipeline

pub mod extractor;
pub mod query;
pub mod span;
pub mod warehouse;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use extractor::{ClassShare, PredictionSummary, ReferenceCriteria, TelemetryExtractor};
pub use query::{QueryIntent, TimeWindow, WindowOutOfRange};
pub use span::SpanRecord;
pub use warehouse::{ClickHouseHttp, Warehouse, WarehouseError};

/// Span name emitted by the detection service for one inference call.
pub const PREDICTION_SPAN_NAME: &str = "yolo_prediction";
