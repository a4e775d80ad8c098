//! JSON-over-HTTP drift-service transport.

use dw_common::{
    DatasetId, Error, FeatureRecord, ProjectId, RemoteFailure, ResourceKind, Result, RunId,
};
use dw_config::DriftServiceSettings;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::service::{DatasetUpload, DriftService, Project, RunRequest};

#[derive(Debug, Deserialize)]
struct DatasetCreated {
    dataset_id: DatasetId,
}

#[derive(Debug, Deserialize)]
struct DatasetContent {
    #[serde(default)]
    rows: Vec<FeatureRecord>,
}

#[derive(Debug, Deserialize)]
struct RunCreated {
    run_id: RunId,
}

/// Bearer-token HTTP client for the drift-service API.
pub struct HttpDriftService {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
}

impl HttpDriftService {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn from_settings(settings: &DriftServiceSettings) -> Self {
        Self::new(settings.base_url.clone(), settings.api_key.clone())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        self.agent
            .request(method, &self.url(path))
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .set("Accept", "application/json")
    }

    fn send(
        &self,
        request: ureq::Request,
        payload: Option<serde_json::Value>,
        resource: ResourceKind,
        id: &str,
    ) -> Result<ureq::Response> {
        trace!(method = request.method(), url = request.url(), "drift-service request");
        let outcome = match payload {
            Some(body) => request.send_json(body),
            None => request.call(),
        };
        match outcome {
            Ok(response) => Ok(response),
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                Err(Error::remote(resource, id, status_failure(status, body)))
            }
            Err(ureq::Error::Transport(transport)) => {
                Err(Error::connectivity("drift-service", transport))
            }
        }
    }
}

fn decode<T: DeserializeOwned>(
    response: ureq::Response,
    resource: ResourceKind,
    id: &str,
) -> Result<T> {
    response
        .into_json::<T>()
        .map_err(|e| Error::remote(resource, id, RemoteFailure::MalformedResponse(e.to_string())))
}

/// Map a non-2xx status onto a resource failure.
pub fn status_failure(status: u16, body: String) -> RemoteFailure {
    match status {
        401 | 403 => RemoteFailure::Unauthorized,
        404 => RemoteFailure::NotFound,
        402 | 429 => RemoteFailure::QuotaExceeded,
        _ => RemoteFailure::Rejected {
            status,
            body: body.trim().chars().take(512).collect(),
        },
    }
}

impl DriftService for HttpDriftService {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get_project(&self, id: &ProjectId) -> Result<Project> {
        let response = self.send(
            self.request("GET", &format!("projects/{id}")),
            None,
            ResourceKind::Project,
            id.as_str(),
        )?;
        decode(response, ResourceKind::Project, id.as_str())
    }

    fn list_projects(&self) -> Result<Vec<Project>> {
        let response = self.send(self.request("GET", "projects"), None, ResourceKind::Project, "*")?;
        decode(response, ResourceKind::Project, "*")
    }

    fn create_project(&self, name: &str) -> Result<Project> {
        let payload = serde_json::json!({ "name": name });
        let response = self.send(
            self.request("POST", "projects"),
            Some(payload),
            ResourceKind::Project,
            name,
        )?;
        let project: Project = decode(response, ResourceKind::Project, name)?;
        debug!(project_id = %project.id, name, "created drift project");
        Ok(project)
    }

    fn add_dataset(&self, upload: &DatasetUpload) -> Result<DatasetId> {
        let payload = serde_json::to_value(upload)?;
        let response = self.send(
            self.request("POST", "datasets"),
            Some(payload),
            ResourceKind::Dataset,
            &upload.name,
        )?;
        let created: DatasetCreated = decode(response, ResourceKind::Dataset, &upload.name)?;
        Ok(created.dataset_id)
    }

    fn load_dataset(&self, id: &DatasetId) -> Result<Vec<FeatureRecord>> {
        let response = self.send(
            self.request("GET", &format!("datasets/{id}/data")),
            None,
            ResourceKind::Dataset,
            id.as_str(),
        )?;
        let content: DatasetContent = decode(response, ResourceKind::Dataset, id.as_str())?;
        Ok(content.rows)
    }

    fn add_run(&self, project: &ProjectId, run: &RunRequest) -> Result<RunId> {
        let payload = serde_json::to_value(run)?;
        let response = self.send(
            self.request("POST", &format!("projects/{project}/runs")),
            Some(payload),
            ResourceKind::Run,
            project.as_str(),
        )?;
        let created: RunCreated = decode(response, ResourceKind::Run, project.as_str())?;
        Ok(created.run_id)
    }
}

impl std::fmt::Debug for HttpDriftService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDriftService")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
