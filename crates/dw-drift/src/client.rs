//! Drift-service client.
//!
//! Owns the resolved project for its own lifetime. Concurrent runs must use
//! separate clients.

use chrono::Utc;
use dw_common::{DatasetId, Error, FeatureRecord, ProjectId, RemoteFailure, ResourceKind, Result, RunId};
use dw_config::DriftServiceSettings;
use tracing::{info, warn};

use crate::dataset::{prepare, PreparedDataset};
use crate::service::{DatasetUpload, DriftService, Project, RunRequest};
use crate::{DRIFT_PRESET, MONITORING_TAG};

/// A published comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftReport {
    pub project_id: ProjectId,
    pub run_id: RunId,
    pub url: String,
    pub tags: Vec<String>,
}

/// High-level drift-service operations for one run.
pub struct DriftClient<S> {
    service: S,
    project_id: Option<ProjectId>,
    project_name: String,
    project: Option<Project>,
}

impl<S: DriftService> DriftClient<S> {
    pub fn new(service: S, project_id: Option<ProjectId>, project_name: impl Into<String>) -> Self {
        Self {
            service,
            project_id,
            project_name: project_name.into(),
            project: None,
        }
    }

    pub fn from_settings(service: S, settings: &DriftServiceSettings) -> Self {
        Self::new(
            service,
            settings.project_id.clone().map(ProjectId),
            settings.project_name.clone(),
        )
    }

    /// The project resolved so far, if any.
    pub fn project(&self) -> Option<&Project> {
        self.project.as_ref()
    }

    /// Lookup-by-id, else lookup-by-name, else create; cached afterwards.
    ///
    /// A configured id that does not exist is an error: falling back to the
    /// name would silently write into a different project.
    pub fn resolve_project(&mut self) -> Result<Project> {
        if let Some(project) = &self.project {
            return Ok(project.clone());
        }

        let project = match &self.project_id {
            Some(id) => self.service.get_project(id)?,
            None => {
                let existing = self
                    .service
                    .list_projects()?
                    .into_iter()
                    .find(|p| p.name == self.project_name);
                match existing {
                    Some(project) => project,
                    None => {
                        info!(name = %self.project_name, "no matching drift project, creating one");
                        self.service.create_project(&self.project_name)?
                    }
                }
            }
        };

        info!(project_id = %project.id, name = %project.name, "drift project resolved");
        self.project = Some(project.clone());
        Ok(project)
    }

    /// Validate and clean one side of a comparison.
    pub fn prepare(&self, records: &[FeatureRecord], label: &str) -> Result<PreparedDataset> {
        prepare(records, label)
    }

    /// Upload a prepared dataset under the resolved project.
    pub fn upload(
        &self,
        records: &[FeatureRecord],
        name: &str,
        description: Option<&str>,
    ) -> Result<DatasetId> {
        let project = self.project.as_ref().ok_or_else(|| {
            Error::remote(
                ResourceKind::Project,
                self.project_label(),
                RemoteFailure::Unresolved,
            )
        })?;

        let prepared = prepare(records, name)?;
        let rows = prepared.len();
        let upload = DatasetUpload {
            name: name.to_string(),
            project_id: project.id.clone(),
            description: description.map(str::to_string).unwrap_or_else(|| {
                format!(
                    "Detection predictions dataset uploaded at {}",
                    Utc::now().to_rfc3339()
                )
            }),
            rows: prepared.rows,
        };
        let dataset_id = self.service.add_dataset(&upload).map_err(|e| {
            warn!(dataset = name, error = %e, "dataset upload failed");
            e
        })?;
        info!(dataset = name, dataset_id = %dataset_id, rows, "dataset uploaded");
        Ok(dataset_id)
    }

    /// Fetch a previously uploaded dataset.
    pub fn download(&self, dataset_id: &DatasetId) -> Result<Vec<FeatureRecord>> {
        let records = self.service.load_dataset(dataset_id)?;
        info!(dataset_id = %dataset_id, rows = records.len(), "dataset downloaded");
        Ok(records)
    }

    /// Compare `current` against a stored reference and publish the report.
    ///
    /// Nothing is submitted unless every earlier step succeeded; on error the
    /// run must be treated as not submitted.
    pub fn run_and_publish(
        &mut self,
        reference_dataset_id: &DatasetId,
        current: &[FeatureRecord],
    ) -> Result<DriftReport> {
        let project = self.resolve_project()?;
        let reference_records = self.download(reference_dataset_id)?;

        let reference = prepare(&reference_records, "reference")?;
        let current = prepare(current, "current")?;

        let tags = vec![
            MONITORING_TAG.to_string(),
            format!("reference_dataset:{reference_dataset_id}"),
            format!("created:{}", Utc::now().format("%Y%m%d_%H%M%S")),
        ];
        let request = RunRequest {
            metrics: vec![DRIFT_PRESET.to_string()],
            tags: tags.clone(),
            reference: reference.rows,
            current: current.rows,
            include_data: true,
        };
        let run_id = self.service.add_run(&project.id, &request)?;

        let url = format!(
            "{}/projects/{}/reports/{}",
            self.service.base_url().trim_end_matches('/'),
            project.id,
            run_id
        );
        info!(
            run_id = %run_id,
            reference_rows = request.reference.len(),
            current_rows = request.current.len(),
            %url,
            "drift report published"
        );
        Ok(DriftReport {
            project_id: project.id,
            run_id,
            url,
            tags,
        })
    }

    fn project_label(&self) -> String {
        match &self.project_id {
            Some(id) => id.to_string(),
            None => self.project_name.clone(),
        }
    }
}
