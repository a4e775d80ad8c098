//! Pipeline orchestrator.
//!
//! # State Machine
//!
//! ```text
//! Idle ──▶ Validating ──▶ ExtractingCurrent ──▶ Comparing ──▶ Done
//!              │                 │                  │
//!              ▼                 ▼                  ▼
//!            Failed            Failed             Failed
//! ```
//!
//! Stages run strictly in sequence: each stage's output is the next one's
//! precondition. A failure is logged with its stage and handed back to the
//! caller; nothing is swallowed or retried.

use std::fmt;

use chrono::Utc;
use dw_common::{DatasetId, Error, InvocationId};
use dw_config::{Requirement, Settings};
use dw_drift::dataset::project_events;
use dw_drift::{DriftClient, DriftService, HttpDriftService};
use dw_telemetry::{
    ClassShare, ClickHouseHttp, PredictionSummary, ReferenceCriteria, TelemetryExtractor, Warehouse,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, info_span, warn};

/// Runtime state of a drift analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Validating,
    ExtractingCurrent,
    Comparing,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Validating => "validating",
            RunState::ExtractingCurrent => "extracting_current",
            RunState::Comparing => "comparing",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Stage a pipeline error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    ProbingWarehouse,
    ExtractingCurrent,
    ExtractingReference,
    ResolvingProject,
    Uploading,
    Comparing,
    Inspecting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validating => "validating configuration",
            Stage::ProbingWarehouse => "probing warehouse",
            Stage::ExtractingCurrent => "extracting current window",
            Stage::ExtractingReference => "extracting reference snapshot",
            Stage::ResolvingProject => "resolving drift project",
            Stage::Uploading => "uploading dataset",
            Stage::Comparing => "comparing against reference",
            Stage::Inspecting => "inspecting warehouse",
        };
        f.write_str(name)
    }
}

/// An error with the stage it happened in.
#[derive(Debug, Error)]
#[error("{stage} failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: Error,
}

impl PipelineError {
    /// Individual configuration violations, if this is a configuration failure.
    pub fn configuration_issues(&self) -> Option<&[String]> {
        match &self.source {
            Error::Configuration(issues) => Some(issues),
            _ => None,
        }
    }
}

/// Warehouse summary plus class distribution.
#[derive(Debug, Clone, Serialize)]
pub struct WarehouseOverview {
    pub summary: PredictionSummary,
    pub classes: Vec<ClassShare>,
}

/// Drives one batch run end to end.
pub struct Orchestrator<W, S> {
    settings: Settings,
    extractor: TelemetryExtractor<W>,
    drift: DriftClient<S>,
    state: RunState,
    invocation: InvocationId,
}

impl Orchestrator<ClickHouseHttp, HttpDriftService> {
    /// Orchestrator over the production transports. No connection is made here.
    pub fn connect(settings: Settings) -> Self {
        let warehouse = ClickHouseHttp::from_settings(&settings.warehouse);
        let service = HttpDriftService::from_settings(&settings.drift);
        Self::new(settings, warehouse, service)
    }
}

impl<W: Warehouse, S: DriftService> Orchestrator<W, S> {
    pub fn new(settings: Settings, warehouse: W, service: S) -> Self {
        let extractor = TelemetryExtractor::new(warehouse, settings.warehouse.qualified_table());
        let drift = DriftClient::from_settings(service, &settings.drift);
        Self {
            settings,
            extractor,
            drift,
            state: RunState::Idle,
            invocation: InvocationId::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Effective settings this orchestrator was built with.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Full drift analysis. Returns the report URL.
    pub fn run(&mut self) -> Result<String, PipelineError> {
        let span = info_span!("drift_run", invocation = %self.invocation);
        let _guard = span.enter();
        info!(config = %self.settings.summary_line(), "starting drift analysis");

        self.enter(RunState::Validating);
        if let Err(e) = self.settings.ensure_valid(Requirement::Analysis) {
            return Err(self.fail(Stage::Validating, e));
        }
        let reference_id = match self.settings.reference.dataset_id.clone() {
            Some(id) => DatasetId(id),
            None => {
                let e = Error::Configuration(vec!["REFERENCE_DATASET_ID is required".to_string()]);
                return Err(self.fail(Stage::Validating, e));
            }
        };

        self.enter(RunState::ExtractingCurrent);
        if let Err(e) = self.extractor.ping() {
            return Err(self.fail(Stage::ProbingWarehouse, e));
        }
        let days = self.settings.current.days;
        let current = match self.extractor.current_window(days) {
            Ok(rows) => rows,
            Err(e) => return Err(self.fail(Stage::ExtractingCurrent, e)),
        };
        if current.is_empty() {
            let e = Error::EmptyDataset {
                dataset: "current".to_string(),
                detail: format!("no predictions in the last {days} days"),
            };
            return Err(self.fail(Stage::ExtractingCurrent, e));
        }
        info!(rows = current.len(), days, "current dataset extracted");

        self.enter(RunState::Comparing);
        let report = match self
            .drift
            .run_and_publish(&reference_id, &project_events(&current))
        {
            Ok(report) => report,
            Err(e) => return Err(self.fail(Stage::Comparing, e)),
        };

        self.enter(RunState::Done);
        info!(run_id = %report.run_id, url = %report.url, "drift analysis completed");
        Ok(report.url)
    }

    /// Curate a reference snapshot from the warehouse and upload it.
    ///
    /// Returns the durable id to configure as `REFERENCE_DATASET_ID`.
    pub fn create_reference(&mut self) -> Result<DatasetId, PipelineError> {
        let span = info_span!("create_reference", invocation = %self.invocation);
        let _guard = span.enter();

        self.settings
            .ensure_valid(Requirement::Curation)
            .map_err(|e| self.fail(Stage::Validating, e))?;
        self.extractor
            .ping()
            .map_err(|e| self.fail(Stage::ProbingWarehouse, e))?;

        let reference = &self.settings.reference;
        let criteria = ReferenceCriteria {
            class_name: reference.class_name.clone(),
            min_confidence: reference.min_confidence,
            limit: usize::try_from(reference.limit).unwrap_or(0),
        };
        let rows = self
            .extractor
            .reference_snapshot(&criteria)
            .map_err(|e| self.fail(Stage::ExtractingReference, e))?;
        if rows.is_empty() {
            let e = Error::EmptyDataset {
                dataset: "reference".to_string(),
                detail: format!(
                    "no '{}' detections with confidence above {}",
                    criteria.class_name, criteria.min_confidence
                ),
            };
            return Err(self.fail(Stage::ExtractingReference, e));
        }

        self.drift
            .resolve_project()
            .map_err(|e| self.fail(Stage::ResolvingProject, e))?;

        let name = format!(
            "reference_{}_{}",
            criteria.class_name,
            Utc::now().format("%Y%m%d_%H%M%S")
        );
        let description = format!(
            "Reference: class={}, confidence>{}, limit={}, rows={}",
            criteria.class_name,
            criteria.min_confidence,
            criteria.limit,
            rows.len()
        );
        let dataset_id = self
            .drift
            .upload(&project_events(&rows), &name, Some(&description))
            .map_err(|e| self.fail(Stage::Uploading, e))?;
        info!(%dataset_id, rows = rows.len(), "reference dataset created");
        Ok(dataset_id)
    }

    /// Prediction summary and class distribution, optionally for the last `hours`.
    pub fn summarize(&mut self, hours: Option<i64>) -> Result<WarehouseOverview, PipelineError> {
        self.settings
            .ensure_valid(Requirement::Inspection)
            .map_err(|e| self.fail(Stage::Validating, e))?;
        self.extractor
            .ping()
            .map_err(|e| self.fail(Stage::ProbingWarehouse, e))?;
        let summary = self
            .extractor
            .summary()
            .map_err(|e| self.fail(Stage::Inspecting, e))?;
        let classes = self
            .extractor
            .class_distribution(hours)
            .map_err(|e| self.fail(Stage::Inspecting, e))?;
        Ok(WarehouseOverview { summary, classes })
    }

    /// Validate the full analysis configuration and probe the warehouse.
    pub fn check(&mut self) -> Result<(), PipelineError> {
        self.settings
            .ensure_valid(Requirement::Analysis)
            .map_err(|e| self.fail(Stage::Validating, e))?;
        self.extractor
            .ping()
            .map_err(|e| self.fail(Stage::ProbingWarehouse, e))?;
        info!("configuration valid and warehouse reachable");
        Ok(())
    }

    fn enter(&mut self, next: RunState) {
        info!(from = %self.state, to = %next, "pipeline state");
        self.state = next;
    }

    fn fail(&mut self, stage: Stage, source: Error) -> PipelineError {
        if source.is_connectivity() {
            warn!(%stage, "dependency unreachable");
        }
        error!(%stage, code = source.code(), error = %source, "pipeline failed");
        self.state = RunState::Failed;
        PipelineError { stage, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use dw_common::{RemoteFailure, ResourceKind};
    use dw_drift::testing::{features, RecordingDriftService};
    use dw_telemetry::testing::{span_line, ScriptedWarehouse};
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Settings {
        let mut env: HashMap<String, String> = [
            ("EVIDENTLY_API_KEY", "sk-test"),
            ("REFERENCE_DATASET_ID", "ref-1"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in pairs {
            env.insert(k.to_string(), v.to_string());
        }
        Settings::from_lookup(|k| env.get(k).cloned())
    }

    fn recent(hours_ago: i64) -> String {
        (Utc::now() - Duration::hours(hours_ago)).to_rfc3339()
    }

    fn recent_spans() -> Vec<String> {
        vec![
            span_line(&recent(1), "p1", "0.12", &[("book", "0.91"), ("cup", "0.55")]),
            span_line(&recent(2), "p2", "0.08", &[("book", "0.83")]),
            span_line(&recent(3), "p3", "0.05", &[]),
        ]
    }

    fn reference_service() -> RecordingDriftService {
        RecordingDriftService::new()
            .with_project("p-1", "detection-drift")
            .with_dataset("ref-1", features(&[("book", 0.9), ("book", 0.95)]))
    }

    #[test]
    fn happy_path_returns_report_url() {
        let wh = ScriptedWarehouse::with_spans(&recent_spans());
        let svc = reference_service();
        let mut orch = Orchestrator::new(settings(&[]), &wh, &svc);

        let url = orch.run().unwrap();
        assert_eq!(url, "https://drift.test/projects/p-1/reports/run-1");
        assert_eq!(orch.state(), RunState::Done);
        assert_eq!(svc.last_run().unwrap().current.len(), 3);
    }

    #[test]
    fn missing_reference_id_fails_before_any_network_call() {
        let wh = ScriptedWarehouse::with_spans(&recent_spans());
        let svc = reference_service();
        let s = settings(&[("REFERENCE_DATASET_ID", ""), ("REFERENCE_LIMIT", "-1")]);
        let mut orch = Orchestrator::new(s, &wh, &svc);

        let err = orch.run().unwrap_err();
        assert_eq!(err.stage, Stage::Validating);
        let issues = err.configuration_issues().unwrap();
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().any(|i| i.contains("REFERENCE_DATASET_ID")));
        assert!(wh.executed().is_empty());
        assert!(svc.calls().is_empty());
        assert_eq!(orch.state(), RunState::Failed);
    }

    #[test]
    fn oversized_current_window_fails_validation_without_panicking() {
        let wh = ScriptedWarehouse::with_spans(&recent_spans());
        let svc = reference_service();
        let mut orch = Orchestrator::new(settings(&[("CURRENT_DAYS_AGO", "100000000")]), &wh, &svc);

        let err = orch.run().unwrap_err();
        assert_eq!(err.stage, Stage::Validating);
        let issues = err.configuration_issues().unwrap();
        assert_eq!(issues, ["CURRENT_DAYS_AGO must be at most 36500, got 100000000"]);
        assert!(wh.executed().is_empty());
        assert!(svc.calls().is_empty());
    }

    #[test]
    fn oversized_summary_window_is_an_error() {
        let wh = ScriptedWarehouse::with_body(
            r#"{"total_predictions":1,"unique_predictions":1,"earliest_prediction":"2026-10-01T00:00:00Z","latest_prediction":"2026-10-01T00:00:00Z","avg_processing_time":0.1}"#,
        );
        let svc = RecordingDriftService::new();
        let mut orch = Orchestrator::new(settings(&[]), &wh, &svc);

        let err = orch.summarize(Some(i64::MAX)).unwrap_err();
        assert_eq!(err.stage, Stage::Inspecting);
        assert!(matches!(err.source, Error::Extraction { .. }));
    }

    #[test]
    fn settings_are_exposed_for_reporting() {
        let wh = ScriptedWarehouse::with_body("");
        let svc = RecordingDriftService::new();
        let orch = Orchestrator::new(settings(&[("CURRENT_DAYS_AGO", "3")]), &wh, &svc);
        assert_eq!(orch.settings().current.days, 3);
        assert_eq!(orch.state(), RunState::Idle);
    }

    #[test]
    fn empty_current_window_fails_before_drift_service() {
        let wh = ScriptedWarehouse::with_body("");
        let svc = reference_service();
        let mut orch = Orchestrator::new(settings(&[]), &wh, &svc);

        let err = orch.run().unwrap_err();
        assert_eq!(err.stage, Stage::ExtractingCurrent);
        assert!(matches!(err.source, Error::EmptyDataset { .. }));
        assert!(svc.calls().is_empty());
    }

    #[test]
    fn unreachable_warehouse_is_reported_as_connectivity() {
        let wh = ScriptedWarehouse::unreachable();
        let svc = reference_service();
        let mut orch = Orchestrator::new(settings(&[]), &wh, &svc);

        let err = orch.run().unwrap_err();
        assert_eq!(err.stage, Stage::ProbingWarehouse);
        assert!(err.source.is_connectivity());
        assert_eq!(wh.executed(), ["SELECT 1"]);
        assert!(svc.calls().is_empty());
    }

    #[test]
    fn failed_query_is_not_mistaken_for_empty() {
        let wh = ScriptedWarehouse::rejecting(500, "Code: 241. Memory limit exceeded");
        let svc = reference_service();
        let mut orch = Orchestrator::new(settings(&[]), &wh, &svc);

        let err = orch.run().unwrap_err();
        assert_eq!(err.stage, Stage::ExtractingCurrent);
        assert!(matches!(err.source, Error::Extraction { .. }));
        assert!(svc.calls().is_empty());
    }

    #[test]
    fn comparison_failure_carries_stage_context() {
        let wh = ScriptedWarehouse::with_spans(&recent_spans());
        let svc = reference_service().with_run_failure(RemoteFailure::QuotaExceeded);
        let mut orch = Orchestrator::new(settings(&[]), &wh, &svc);

        let err = orch.run().unwrap_err();
        assert_eq!(err.stage, Stage::Comparing);
        assert!(matches!(
            err.source,
            Error::RemoteResource {
                resource: ResourceKind::Run,
                failure: RemoteFailure::QuotaExceeded,
                ..
            }
        ));
        assert!(err.to_string().starts_with("comparing against reference failed"));
    }

    #[test]
    fn unknown_project_id_aborts_comparison() {
        let wh = ScriptedWarehouse::with_spans(&recent_spans());
        let svc = reference_service();
        let mut orch = Orchestrator::new(settings(&[("EVIDENTLY_PROJECT_ID", "nope")]), &wh, &svc);

        let err = orch.run().unwrap_err();
        assert_eq!(err.stage, Stage::Comparing);
        assert_eq!(svc.calls(), ["get_project:nope"]);
    }

    #[test]
    fn create_reference_uploads_curated_rows() {
        let mut spans = Vec::new();
        for i in 0..15 {
            spans.push(span_line(&recent(i), &format!("hi{i}"), "0.1", &[("book", "0.9")]));
        }
        for i in 0..5 {
            spans.push(span_line(&recent(20 + i), &format!("lo{i}"), "0.1", &[("book", "0.5")]));
        }
        let wh = ScriptedWarehouse::with_spans(&spans);
        let svc = RecordingDriftService::new();
        let mut orch = Orchestrator::new(settings(&[("REFERENCE_DATASET_ID", "")]), &wh, &svc);

        let id = orch.create_reference().unwrap();
        let stored = svc.load_dataset(&id).unwrap();
        assert_eq!(stored.len(), 10);
        assert!(stored
            .iter()
            .all(|r| r.class_name.as_deref() == Some("book") && r.confidence == Some(0.9)));
        let calls = svc.calls();
        assert_eq!(calls[0], "list_projects");
        assert_eq!(calls[1], "create_project:detection-drift");
        assert!(calls[2].starts_with("add_dataset:reference_book_"));
    }

    #[test]
    fn create_reference_with_no_matches_is_empty_dataset() {
        let wh = ScriptedWarehouse::with_spans(&[span_line(&recent(1), "p", "0.1", &[("cup", "0.99")])]);
        let svc = RecordingDriftService::new();
        let mut orch = Orchestrator::new(settings(&[]), &wh, &svc);

        let err = orch.create_reference().unwrap_err();
        assert_eq!(err.stage, Stage::ExtractingReference);
        assert!(matches!(err.source, Error::EmptyDataset { .. }));
        assert!(svc.calls().is_empty());
    }

    #[test]
    fn summarize_needs_only_warehouse_settings() {
        let wh = ScriptedWarehouse::with_body(
            r#"{"total_predictions":3,"unique_predictions":3,"earliest_prediction":"2026-10-01T00:00:00Z","latest_prediction":"2026-10-02T00:00:00Z","avg_processing_time":0.1,"class_name":"book","count":3,"avg_confidence":0.9}"#,
        );
        let svc = RecordingDriftService::new();
        let s = settings(&[("EVIDENTLY_API_KEY", ""), ("REFERENCE_DATASET_ID", "")]);
        let mut orch = Orchestrator::new(s, &wh, &svc);

        let overview = orch.summarize(None).unwrap();
        assert_eq!(overview.summary.total_predictions, 3);
        assert_eq!(overview.classes[0].class_name, "book");
        assert!(svc.calls().is_empty());
    }
}
