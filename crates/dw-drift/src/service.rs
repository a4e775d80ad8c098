//! Remote drift-service surface.

use dw_common::{DatasetId, FeatureRecord, ProjectId, Result, RunId};
use serde::{Deserialize, Serialize};

use crate::dataset::FeatureRow;

/// A drift-service project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
}

/// Payload of a dataset upload.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetUpload {
    pub name: String,
    pub project_id: ProjectId,
    pub description: String,
    pub rows: Vec<FeatureRow>,
}

/// Payload of a comparison submission.
#[derive(Debug, Clone, Serialize)]
pub struct RunRequest {
    pub metrics: Vec<String>,
    pub tags: Vec<String>,
    pub reference: Vec<FeatureRow>,
    pub current: Vec<FeatureRow>,
    /// Attach both input tables to the published report.
    pub include_data: bool,
}

/// Project, dataset and run operations offered by the drift-service.
///
/// Implementations report transport failures as `Error::Connectivity` and
/// refused operations as `Error::RemoteResource`.
pub trait DriftService {
    /// Base URL used to build report links.
    fn base_url(&self) -> &str;
    fn get_project(&self, id: &ProjectId) -> Result<Project>;
    fn list_projects(&self) -> Result<Vec<Project>>;
    fn create_project(&self, name: &str) -> Result<Project>;
    fn add_dataset(&self, upload: &DatasetUpload) -> Result<DatasetId>;
    fn load_dataset(&self, id: &DatasetId) -> Result<Vec<FeatureRecord>>;
    fn add_run(&self, project: &ProjectId, run: &RunRequest) -> Result<RunId>;
}

impl<S: DriftService + ?Sized> DriftService for &S {
    fn base_url(&self) -> &str {
        (**self).base_url()
    }
    fn get_project(&self, id: &ProjectId) -> Result<Project> {
        (**self).get_project(id)
    }
    fn list_projects(&self) -> Result<Vec<Project>> {
        (**self).list_projects()
    }
    fn create_project(&self, name: &str) -> Result<Project> {
        (**self).create_project(name)
    }
    fn add_dataset(&self, upload: &DatasetUpload) -> Result<DatasetId> {
        (**self).add_dataset(upload)
    }
    fn load_dataset(&self, id: &DatasetId) -> Result<Vec<FeatureRecord>> {
        (**self).load_dataset(id)
    }
    fn add_run(&self, project: &ProjectId, run: &RunRequest) -> Result<RunId> {
        (**self).add_run(project, run)
    }
}
