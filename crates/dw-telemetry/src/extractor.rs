//! Telemetry extractor.
//!
//! Read-only entry point for every extraction intent. Holds its warehouse
//! transport for its own lifetime and issues one statement per call.
//!
//! Failures keep their meaning: an unreachable warehouse is a
//! connectivity error, a refused or undecodable query is an extraction
//! error, and only a genuinely empty result becomes an empty vector.

use chrono::{DateTime, Utc};
use dw_common::{Error, PredictionEvent, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::query::{QueryBuilder, QueryIntent, TimeWindow};
use crate::span::{parse_and_unnest, parse_timestamp};
use crate::warehouse::{Warehouse, WarehouseError};
use crate::PREDICTION_SPAN_NAME;

/// Reference curation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceCriteria {
    pub class_name: String,
    /// Strict lower bound on confidence.
    pub min_confidence: f64,
    pub limit: usize,
}

impl ReferenceCriteria {
    pub fn accepts(&self, event: &PredictionEvent) -> bool {
        event.class_name.as_deref() == Some(self.class_name.as_str())
            && event.confidence.is_some_and(|c| c > self.min_confidence)
    }
}

/// Aggregate statistics over all prediction spans.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionSummary {
    pub total_predictions: u64,
    pub unique_predictions: u64,
    pub earliest_prediction: Option<DateTime<Utc>>,
    pub latest_prediction: Option<DateTime<Utc>>,
    pub avg_processing_time: Option<f64>,
}

/// Detection count and mean confidence for one class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassShare {
    pub class_name: String,
    pub count: u64,
    pub avg_confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SummaryRow {
    total_predictions: serde_json::Value,
    unique_predictions: serde_json::Value,
    earliest_prediction: Option<String>,
    latest_prediction: Option<String>,
    avg_processing_time: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ClassShareRow {
    #[serde(default)]
    class_name: String,
    count: serde_json::Value,
    avg_confidence: Option<serde_json::Value>,
}

/// Extracts prediction telemetry from the warehouse.
pub struct TelemetryExtractor<W> {
    warehouse: W,
    queries: QueryBuilder,
}

impl<W: Warehouse> TelemetryExtractor<W> {
    /// `table` is the fully qualified `database.table` name.
    pub fn new(warehouse: W, table: impl Into<String>) -> Self {
        Self {
            warehouse,
            queries: QueryBuilder::new(table, PREDICTION_SPAN_NAME),
        }
    }

    /// Explicit reachability probe, reported separately from query results.
    ///
    /// Only a transport failure means unreachable; a probe the warehouse
    /// answers with an error (bad credentials, unknown database) is an
    /// extraction error.
    pub fn ping(&self) -> Result<()> {
        self.warehouse
            .ping()
            .map_err(|e| self.classify("ping", e))?;
        debug!(warehouse = self.warehouse.name(), "warehouse reachable");
        Ok(())
    }

    /// Detections from the last `days` days, newest first.
    pub fn current_window(&self, days: i64) -> Result<Vec<PredictionEvent>> {
        self.current_window_at(Utc::now(), days)
    }

    pub fn current_window_at(&self, now: DateTime<Utc>, days: i64) -> Result<Vec<PredictionEvent>> {
        let intent = QueryIntent::CurrentWindow { days };
        let window = TimeWindow::last_days(now, days)
            .map_err(|e| Error::extraction(intent.to_string(), e))?;
        self.windowed(intent, window)
    }

    /// Historical backfill: one day of detections ending `hours_ago` hours ago.
    pub fn offset_window(&self, hours_ago: i64) -> Result<Vec<PredictionEvent>> {
        self.offset_window_at(Utc::now(), hours_ago)
    }

    pub fn offset_window_at(
        &self,
        now: DateTime<Utc>,
        hours_ago: i64,
    ) -> Result<Vec<PredictionEvent>> {
        let intent = QueryIntent::OffsetWindow { hours_ago };
        let window = TimeWindow::day_ending_hours_ago(now, hours_ago)
            .map_err(|e| Error::extraction(intent.to_string(), e))?;
        self.windowed(intent, window)
    }

    /// Curated reference sample: matching class, confidence above the
    /// threshold, newest first, at most `limit` rows.
    pub fn reference_snapshot(&self, criteria: &ReferenceCriteria) -> Result<Vec<PredictionEvent>> {
        let intent = QueryIntent::ReferenceSnapshot;
        let sql = self
            .queries
            .prediction_spans(None, Some(criteria.class_name.as_str()));
        let rows = self.fetch_events(intent, &sql)?;
        let scanned = rows.len();
        let curated: Vec<PredictionEvent> = rows
            .into_iter()
            .filter(|event| criteria.accepts(event))
            .take(criteria.limit)
            .collect();
        info!(
            class = %criteria.class_name,
            min_confidence = criteria.min_confidence,
            scanned,
            kept = curated.len(),
            "reference snapshot curated"
        );
        Ok(curated)
    }

    pub fn summary(&self) -> Result<PredictionSummary> {
        let intent = QueryIntent::Summary;
        let body = self.run(intent, &self.queries.summary())?;
        let line = body
            .lines()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| Error::extraction(intent.to_string(), "aggregate returned no row"))?;
        let row: SummaryRow =
            serde_json::from_str(line).map_err(|e| Error::extraction(intent.to_string(), e))?;

        let total = lenient_u64(&row.total_predictions)
            .ok_or_else(|| Error::extraction(intent.to_string(), "non-numeric count"))?;
        // min/max over an empty table are the epoch, not real observations.
        let bound = |raw: Option<String>| {
            if total == 0 {
                None
            } else {
                raw.as_deref().and_then(parse_timestamp)
            }
        };
        Ok(PredictionSummary {
            total_predictions: total,
            unique_predictions: lenient_u64(&row.unique_predictions).unwrap_or(0),
            earliest_prediction: bound(row.earliest_prediction),
            latest_prediction: bound(row.latest_prediction),
            avg_processing_time: row.avg_processing_time.as_ref().and_then(lenient_f64),
        })
    }

    /// Per-class detection counts, optionally restricted to the last `hours` hours.
    pub fn class_distribution(&self, hours: Option<i64>) -> Result<Vec<ClassShare>> {
        self.class_distribution_at(Utc::now(), hours)
    }

    pub fn class_distribution_at(
        &self,
        now: DateTime<Utc>,
        hours: Option<i64>,
    ) -> Result<Vec<ClassShare>> {
        let intent = QueryIntent::ClassDistribution { hours };
        let window = hours
            .map(|h| TimeWindow::last_hours(now, h))
            .transpose()
            .map_err(|e| Error::extraction(intent.to_string(), e))?;
        let body = self.run(intent, &self.queries.class_distribution(window.as_ref()))?;

        let mut shares = Vec::new();
        for line in body.lines().filter(|l| !l.trim().is_empty()) {
            let row: ClassShareRow =
                serde_json::from_str(line).map_err(|e| Error::extraction(intent.to_string(), e))?;
            shares.push(ClassShare {
                class_name: row.class_name,
                count: lenient_u64(&row.count).unwrap_or(0),
                avg_confidence: row.avg_confidence.as_ref().and_then(lenient_f64),
            });
        }
        Ok(shares)
    }

    fn windowed(&self, intent: QueryIntent, window: TimeWindow) -> Result<Vec<PredictionEvent>> {
        let sql = self.queries.prediction_spans(Some(&window), None);
        let mut rows = self.fetch_events(intent, &sql)?;
        let before = rows.len();
        // Re-apply the bounds so clock skew on the warehouse side cannot leak rows.
        rows.retain(|event| window.contains(event.timestamp));
        if rows.len() != before {
            debug!(
                %intent,
                dropped = before - rows.len(),
                "dropped rows outside the requested window"
            );
        }
        info!(%intent, rows = rows.len(), "extracted prediction rows");
        Ok(rows)
    }

    fn fetch_events(&self, intent: QueryIntent, sql: &str) -> Result<Vec<PredictionEvent>> {
        let body = self.run(intent, sql)?;
        parse_and_unnest(&body).map_err(|e| Error::extraction(intent.to_string(), e))
    }

    fn run(&self, intent: QueryIntent, sql: &str) -> Result<String> {
        debug!(%intent, "querying warehouse");
        self.warehouse
            .query(sql)
            .map_err(|e| self.classify(&intent.to_string(), e))
    }

    fn classify(&self, intent: &str, err: WarehouseError) -> Error {
        if err.is_transport() {
            Error::connectivity(format!("warehouse ({})", self.warehouse.name()), err)
        } else {
            Error::extraction(intent, err)
        }
    }
}

fn lenient_u64(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_f64(value: &serde_json::Value) -> Option<f64> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => dw_common::event::coerce_f64(s),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{span_line, ScriptedWarehouse};
    use chrono::TimeZone;

    const TABLE: &str = "yolo_analytics.otel_traces";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap()
    }

    fn criteria() -> ReferenceCriteria {
        ReferenceCriteria {
            class_name: "book".to_string(),
            min_confidence: 0.8,
            limit: 10,
        }
    }

    #[test]
    fn current_window_unnests_scenario_rows() {
        let wh = ScriptedWarehouse::with_spans(&[
            span_line("2026-10-17T10:00:00Z", "p1", "0.12", &[("book", "0.91"), ("cup", "0.55")]),
            span_line("2026-10-16T10:00:00Z", "p2", "0.08", &[("book", "0.83")]),
            span_line("2026-10-15T10:00:00Z", "p3", "0.05", &[]),
        ]);
        let extractor = TelemetryExtractor::new(&wh, TABLE);
        let rows = extractor.current_window_at(now(), 7).unwrap();
        assert_eq!(rows.len(), 3);

        let executed = wh.executed();
        assert_eq!(executed.len(), 1);
        assert!(executed[0].contains("Timestamp >= toDateTime64('2026-10-10 12:00:00.000000'"));
    }

    #[test]
    fn current_window_drops_rows_outside_bounds() {
        let wh = ScriptedWarehouse::with_spans(&[
            span_line("2026-10-17T13:00:00Z", "future", "0.1", &[("book", "0.9")]),
            span_line("2026-10-17T11:00:00Z", "inside", "0.1", &[("book", "0.9")]),
            span_line("2026-10-01T11:00:00Z", "stale", "0.1", &[("book", "0.9")]),
        ]);
        let rows = TelemetryExtractor::new(&wh, TABLE)
            .current_window_at(now(), 7)
            .unwrap();
        let window = TimeWindow::last_days(now(), 7).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows.iter().all(|r| window.contains(r.timestamp)));
        assert_eq!(rows[0].prediction_id.as_deref(), Some("inside"));
    }

    #[test]
    fn offset_window_is_distinct_from_most_recent() {
        let wh = ScriptedWarehouse::with_spans(&[
            span_line("2026-10-17T11:00:00Z", "recent", "0.1", &[("book", "0.9")]),
            span_line("2026-10-16T00:00:00Z", "historic", "0.1", &[("book", "0.9")]),
        ]);
        let rows = TelemetryExtractor::new(&wh, TABLE)
            .offset_window_at(now(), 24)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].prediction_id.as_deref(), Some("historic"));
    }

    #[test]
    fn reference_snapshot_curates_to_limit() {
        let mut lines = Vec::new();
        for i in 0..15 {
            let ts = format!("2026-10-{:02}T10:00:00Z", 16 - (i % 10));
            lines.push(span_line(&ts, &format!("hi{i:02}"), "0.1", &[("book", "0.9")]));
        }
        for i in 0..5 {
            lines.push(span_line("2026-10-01T10:00:00Z", &format!("lo{i}"), "0.1", &[("book", "0.5")]));
        }
        lines.push(span_line("2026-10-02T10:00:00Z", "cup", "0.1", &[("cup", "0.99")]));
        let wh = ScriptedWarehouse::with_spans(&lines);
        let extractor = TelemetryExtractor::new(&wh, TABLE);

        let first = extractor.reference_snapshot(&criteria()).unwrap();
        assert_eq!(first.len(), 10);
        assert!(first
            .iter()
            .all(|r| r.class_name.as_deref() == Some("book") && r.confidence == Some(0.9)));

        let second = extractor.reference_snapshot(&criteria()).unwrap();
        assert_eq!(first, second);
        assert!(wh.executed()[0].contains("'book'"));
    }

    #[test]
    fn reference_threshold_is_strict() {
        let wh = ScriptedWarehouse::with_spans(&[span_line(
            "2026-10-17T10:00:00Z",
            "p1",
            "0.1",
            &[("book", "0.8"), ("book", "0.81"), ("book", "oops")],
        )]);
        let rows = TelemetryExtractor::new(&wh, TABLE)
            .reference_snapshot(&criteria())
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].confidence, Some(0.81));
    }

    #[test]
    fn unreachable_warehouse_is_connectivity_error() {
        let wh = ScriptedWarehouse::unreachable();
        let extractor = TelemetryExtractor::new(&wh, TABLE);
        assert!(extractor.ping().unwrap_err().is_connectivity());
        assert!(extractor.current_window(7).unwrap_err().is_connectivity());
    }

    #[test]
    fn rejected_probe_is_not_reported_as_unreachable() {
        let wh = ScriptedWarehouse::denying(401, "Code: 516. default: Authentication failed");
        let err = TelemetryExtractor::new(&wh, TABLE).ping().unwrap_err();
        assert!(!err.is_connectivity());
        match err {
            Error::Extraction { intent, source } => {
                assert_eq!(intent, "ping");
                assert!(source.to_string().contains("Authentication failed"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn oversized_windows_fail_without_querying() {
        let wh = ScriptedWarehouse::with_body("");
        let extractor = TelemetryExtractor::new(&wh, TABLE);
        assert!(matches!(
            extractor.current_window_at(now(), 100_000_000).unwrap_err(),
            Error::Extraction { .. }
        ));
        assert!(matches!(
            extractor.offset_window_at(now(), i64::MAX).unwrap_err(),
            Error::Extraction { .. }
        ));
        assert!(matches!(
            extractor.class_distribution_at(now(), Some(i64::MAX)).unwrap_err(),
            Error::Extraction { .. }
        ));
        assert!(wh.executed().is_empty());
    }

    #[test]
    fn rejected_query_is_extraction_error_not_empty() {
        let wh = ScriptedWarehouse::rejecting(404, "Code: 60. Table yolo_analytics.otel_traces does not exist");
        let extractor = TelemetryExtractor::new(&wh, TABLE);
        extractor.ping().unwrap();
        let err = extractor.current_window(7).unwrap_err();
        match err {
            Error::Extraction { intent, source } => {
                assert_eq!(intent, "current_window(days=7)");
                assert!(source.to_string().contains("does not exist"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(
            extractor.class_distribution(None).unwrap_err(),
            Error::Extraction { .. }
        ));
        assert!(matches!(extractor.summary().unwrap_err(), Error::Extraction { .. }));
    }

    #[test]
    fn summary_parses_aggregate_row() {
        let wh = ScriptedWarehouse::with_body(
            r#"{"total_predictions":42,"unique_predictions":"40","earliest_prediction":"2026-10-01T00:00:00Z","latest_prediction":"2026-10-17T11:59:00Z","avg_processing_time":0.115}"#,
        );
        let summary = TelemetryExtractor::new(&wh, TABLE).summary().unwrap();
        assert_eq!(summary.total_predictions, 42);
        assert_eq!(summary.unique_predictions, 40);
        assert_eq!(
            summary.earliest_prediction,
            Some(Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(summary.avg_processing_time, Some(0.115));
    }

    #[test]
    fn summary_of_empty_table_has_no_bounds() {
        let wh = ScriptedWarehouse::with_body(
            r#"{"total_predictions":0,"unique_predictions":0,"earliest_prediction":"1970-01-01T00:00:00Z","latest_prediction":"1970-01-01T00:00:00Z","avg_processing_time":null}"#,
        );
        let summary = TelemetryExtractor::new(&wh, TABLE).summary().unwrap();
        assert_eq!(summary.total_predictions, 0);
        assert_eq!(summary.earliest_prediction, None);
        assert_eq!(summary.avg_processing_time, None);
    }

    #[test]
    fn class_distribution_keeps_warehouse_order() {
        let wh = ScriptedWarehouse::with_body(
            "{\"class_name\":\"book\",\"count\":12,\"avg_confidence\":0.87}\n\
             {\"class_name\":\"cup\",\"count\":\"3\",\"avg_confidence\":null}\n",
        );
        let shares = TelemetryExtractor::new(&wh, TABLE)
            .class_distribution_at(now(), Some(24))
            .unwrap();
        assert_eq!(shares.len(), 2);
        assert_eq!(shares[0].class_name, "book");
        assert_eq!(shares[1].count, 3);
        assert_eq!(shares[1].avg_confidence, None);
        assert!(wh.executed()[0].contains("ARRAY JOIN Events.Attributes AS ev"));
        assert!(wh.executed()[0].contains("toDateTime64('2026-10-16 12:00:00.000000'"));
    }
}
