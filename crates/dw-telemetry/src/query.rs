//! Query intents, time windows, and SQL construction.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// What a single extraction call is asking the warehouse for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryIntent {
    /// Every prediction, newest first; curated in Rust afterwards.
    ReferenceSnapshot,
    /// The rolling last-N-days window.
    CurrentWindow { days: i64 },
    /// A day-wide slice ending `hours_ago` hours before now.
    OffsetWindow { hours_ago: i64 },
    Summary,
    ClassDistribution { hours: Option<i64> },
}

impl fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryIntent::ReferenceSnapshot => write!(f, "reference_snapshot"),
            QueryIntent::CurrentWindow { days } => write!(f, "current_window(days={days})"),
            QueryIntent::OffsetWindow { hours_ago } => {
                write!(f, "offset_window(hours_ago={hours_ago})")
            }
            QueryIntent::Summary => write!(f, "summary"),
            QueryIntent::ClassDistribution { hours: Some(h) } => {
                write!(f, "class_distribution(hours={h})")
            }
            QueryIntent::ClassDistribution { hours: None } => write!(f, "class_distribution"),
        }
    }
}

/// Closed time interval `[start, end]` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A window whose bounds fall outside the representable date range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("time window of {amount} {unit} before {now} is out of range")]
pub struct WindowOutOfRange {
    pub amount: i64,
    pub unit: &'static str,
    pub now: DateTime<Utc>,
}

fn shift_back(
    now: DateTime<Utc>,
    delta: Option<Duration>,
    amount: i64,
    unit: &'static str,
) -> Result<DateTime<Utc>, WindowOutOfRange> {
    delta
        .and_then(|d| now.checked_sub_signed(d))
        .ok_or(WindowOutOfRange { amount, unit, now })
}

impl TimeWindow {
    /// `[now - days, now]`.
    pub fn last_days(now: DateTime<Utc>, days: i64) -> Result<Self, WindowOutOfRange> {
        let start = shift_back(now, Duration::try_days(days), days, "days")?;
        Ok(Self { start, end: now })
    }

    /// `[now - (hours_ago + 24)h, now - hours_ago h]`: one day of history
    /// ending at the offset.
    pub fn day_ending_hours_ago(
        now: DateTime<Utc>,
        hours_ago: i64,
    ) -> Result<Self, WindowOutOfRange> {
        let end = shift_back(now, Duration::try_hours(hours_ago), hours_ago, "hours")?;
        let start = shift_back(end, Duration::try_hours(24), hours_ago.saturating_add(24), "hours")?;
        Ok(Self { start, end })
    }

    /// `[now - hours, now]`.
    pub fn last_hours(now: DateTime<Utc>, hours: i64) -> Result<Self, WindowOutOfRange> {
        let start = shift_back(now, Duration::try_hours(hours), hours, "hours")?;
        Ok(Self { start, end: now })
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }
}

/// Builds the SQL for each intent against one table.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    table: String,
    span_name: String,
}

impl QueryBuilder {
    pub fn new(table: impl Into<String>, span_name: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            span_name: span_name.into(),
        }
    }

    /// Span-level rows with their nested event attributes, newest first.
    ///
    /// `class_hint` only narrows which spans are shipped; per-detection
    /// filtering happens after unnesting.
    pub fn prediction_spans(&self, window: Option<&TimeWindow>, class_hint: Option<&str>) -> String {
        let mut sql = format!(
            "SELECT Timestamp, SpanAttributes, Events.Attributes AS EventAttributes\n\
             FROM {}\n\
             WHERE SpanName = {}",
            self.table,
            quote(&self.span_name)
        );
        if let Some(window) = window {
            push_window(&mut sql, window);
        }
        if let Some(class) = class_hint {
            sql.push_str(&format!(
                "\n  AND has(arrayMap(a -> a['class_name'], Events.Attributes), {})",
                quote(class)
            ));
        }
        sql.push_str(
            "\nORDER BY Timestamp DESC, SpanAttributes['prediction_id'] ASC\nFORMAT JSONEachRow",
        );
        sql
    }

    pub fn summary(&self) -> String {
        format!(
            "SELECT\n    \
             count() AS total_predictions,\n    \
             uniqExact(SpanAttributes['prediction_id']) AS unique_predictions,\n    \
             min(Timestamp) AS earliest_prediction,\n    \
             max(Timestamp) AS latest_prediction,\n    \
             avg(toFloat64OrNull(SpanAttributes['processing_time_seconds'])) AS avg_processing_time\n\
             FROM {}\n\
             WHERE SpanName = {}\n\
             FORMAT JSONEachRow",
            self.table,
            quote(&self.span_name)
        )
    }

    pub fn class_distribution(&self, window: Option<&TimeWindow>) -> String {
        let mut sql = format!(
            "SELECT\n    \
             ev['class_name'] AS class_name,\n    \
             count() AS count,\n    \
             avg(toFloat64OrNull(ev['confidence'])) AS avg_confidence\n\
             FROM {}\n\
             ARRAY JOIN Events.Attributes AS ev\n\
             WHERE SpanName = {}",
            self.table,
            quote(&self.span_name)
        );
        if let Some(window) = window {
            push_window(&mut sql, window);
        }
        sql.push_str("\nGROUP BY class_name\nORDER BY count DESC, class_name ASC\nFORMAT JSONEachRow");
        sql
    }
}

fn push_window(sql: &mut String, window: &TimeWindow) {
    sql.push_str(&format!(
        "\n  AND Timestamp >= {}\n  AND Timestamp <= {}",
        datetime_literal(window.start),
        datetime_literal(window.end)
    ));
}

fn datetime_literal(ts: DateTime<Utc>) -> String {
    format!(
        "toDateTime64('{}', 6, 'UTC')",
        ts.format("%Y-%m-%d %H:%M:%S%.6f")
    )
}

/// Single-quoted SQL string literal.
pub fn quote(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('\'');
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap()
    }

    #[test]
    fn offset_window_is_one_day_ending_at_offset() {
        let w = TimeWindow::day_ending_hours_ago(now(), 48).unwrap();
        assert_eq!(w.end, Utc.with_ymd_and_hms(2026, 10, 15, 12, 0, 0).unwrap());
        assert_eq!(w.start, Utc.with_ymd_and_hms(2026, 10, 14, 12, 0, 0).unwrap());
        assert!(!w.contains(now()));
    }

    #[test]
    fn last_days_bounds_are_inclusive() {
        let w = TimeWindow::last_days(now(), 7).unwrap();
        assert!(w.contains(now()));
        assert!(w.contains(now() - Duration::days(7)));
        assert!(!w.contains(now() - Duration::days(7) - Duration::seconds(1)));
        assert!(!w.contains(now() + Duration::seconds(1)));
    }

    #[test]
    fn out_of_range_windows_are_errors() {
        let err = TimeWindow::last_days(now(), 100_000_000).unwrap_err();
        assert_eq!(err.amount, 100_000_000);
        assert_eq!(err.unit, "days");
        assert!(TimeWindow::last_hours(now(), i64::MAX).is_err());
        assert!(TimeWindow::day_ending_hours_ago(now(), 2_000_000_000_000).is_err());
        assert!(TimeWindow::last_days(now(), 36_500).is_ok());
    }

    #[test]
    fn span_query_renders_window_and_order() {
        let q = QueryBuilder::new("yolo_analytics.otel_traces", "yolo_prediction");
        let sql = q.prediction_spans(Some(&TimeWindow::last_days(now(), 7).unwrap()), None);
        assert!(sql.contains("FROM yolo_analytics.otel_traces"));
        assert!(sql.contains("SpanName = 'yolo_prediction'"));
        assert!(sql.contains("Timestamp >= toDateTime64('2026-10-10 12:00:00.000000', 6, 'UTC')"));
        assert!(sql.contains("Timestamp <= toDateTime64('2026-10-17 12:00:00.000000', 6, 'UTC')"));
        assert!(sql.contains("ORDER BY Timestamp DESC"));
        assert!(sql.ends_with("FORMAT JSONEachRow"));
    }

    #[test]
    fn class_hint_is_quoted() {
        let q = QueryBuilder::new("t", "yolo_prediction");
        let sql = q.prediction_spans(None, Some("it's"));
        assert!(sql.contains(r"Events.Attributes), 'it\'s')"));
        assert!(!sql.contains("Timestamp >="));
    }

    #[test]
    fn quote_escapes_backslashes_and_quotes() {
        assert_eq!(quote(r"a\b'c"), r"'a\\b\'c'");
    }

    #[test]
    fn intent_labels_are_stable() {
        assert_eq!(
            QueryIntent::CurrentWindow { days: 7 }.to_string(),
            "current_window(days=7)"
        );
        assert_eq!(
            QueryIntent::ClassDistribution { hours: None }.to_string(),
            "class_distribution"
        );
    }
}
