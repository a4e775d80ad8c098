//! Test utilities: an in-memory drift-service that records every call.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use dw_common::{
    DatasetId, Error, FeatureRecord, ProjectId, RemoteFailure, ResourceKind, Result, RunId,
};

use crate::service::{DatasetUpload, DriftService, Project, RunRequest};

/// Build feature records from `(class_name, confidence)` pairs.
pub fn features(pairs: &[(&str, f64)]) -> Vec<FeatureRecord> {
    pairs
        .iter()
        .map(|(class, conf)| FeatureRecord {
            class_name: Some(class.to_string()),
            confidence: Some(*conf),
            processing_time: Some(0.1),
        })
        .collect()
}

/// In-memory drift-service double.
#[derive(Default)]
pub struct RecordingDriftService {
    projects: RefCell<Vec<Project>>,
    datasets: RefCell<HashMap<DatasetId, Vec<FeatureRecord>>>,
    runs: RefCell<Vec<RunRequest>>,
    calls: RefCell<Vec<String>>,
    run_failure: Option<RemoteFailure>,
    next_id: Cell<u32>,
}

impl RecordingDriftService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(self, id: &str, name: &str) -> Self {
        self.projects.borrow_mut().push(Project {
            id: ProjectId::from(id),
            name: name.to_string(),
        });
        self
    }

    pub fn with_dataset(self, id: &str, rows: Vec<FeatureRecord>) -> Self {
        self.datasets.borrow_mut().insert(DatasetId::from(id), rows);
        self
    }

    /// Make every `add_run` fail with the given failure.
    pub fn with_run_failure(mut self, failure: RemoteFailure) -> Self {
        self.run_failure = Some(failure);
        self
    }

    /// Operations performed so far, as `op[:arg]` strings.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn last_run(&self) -> Option<RunRequest> {
        self.runs.borrow().last().cloned()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }

    fn next(&self, prefix: &str) -> String {
        let n = self.next_id.get() + 1;
        self.next_id.set(n);
        format!("{prefix}-{n}")
    }
}

impl DriftService for RecordingDriftService {
    fn base_url(&self) -> &str {
        "https://drift.test"
    }

    fn get_project(&self, id: &ProjectId) -> Result<Project> {
        self.record(format!("get_project:{id}"));
        self.projects
            .borrow()
            .iter()
            .find(|p| &p.id == id)
            .cloned()
            .ok_or_else(|| Error::remote(ResourceKind::Project, id.as_str(), RemoteFailure::NotFound))
    }

    fn list_projects(&self) -> Result<Vec<Project>> {
        self.record("list_projects".to_string());
        Ok(self.projects.borrow().clone())
    }

    fn create_project(&self, name: &str) -> Result<Project> {
        self.record(format!("create_project:{name}"));
        let project = Project {
            id: ProjectId(self.next("p")),
            name: name.to_string(),
        };
        self.projects.borrow_mut().push(project.clone());
        Ok(project)
    }

    fn add_dataset(&self, upload: &DatasetUpload) -> Result<DatasetId> {
        self.record(format!("add_dataset:{}", upload.name));
        let id = DatasetId(self.next("ds"));
        let rows = upload
            .rows
            .iter()
            .map(|r| FeatureRecord {
                class_name: Some(r.class_name.clone()),
                confidence: Some(r.confidence),
                processing_time: r.processing_time,
            })
            .collect();
        self.datasets.borrow_mut().insert(id.clone(), rows);
        Ok(id)
    }

    fn load_dataset(&self, id: &DatasetId) -> Result<Vec<FeatureRecord>> {
        self.record(format!("load_dataset:{id}"));
        self.datasets
            .borrow()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::remote(ResourceKind::Dataset, id.as_str(), RemoteFailure::NotFound))
    }

    fn add_run(&self, project: &ProjectId, run: &RunRequest) -> Result<RunId> {
        self.record(format!("add_run:{project}"));
        if let Some(failure) = &self.run_failure {
            return Err(Error::remote(ResourceKind::Run, project.as_str(), failure.clone()));
        }
        self.runs.borrow_mut().push(run.clone());
        Ok(RunId(format!("run-{}", self.runs.borrow().len())))
    }
}
