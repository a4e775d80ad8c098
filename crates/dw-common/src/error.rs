//! Error types for driftwatch.

use std::fmt;
use thiserror::Error;

/// Boxed cause carried by connectivity and extraction failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for driftwatch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Remote resource kinds managed by the drift-service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Project,
    Dataset,
    Run,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Project => write!(f, "project"),
            ResourceKind::Dataset => write!(f, "dataset"),
            ResourceKind::Run => write!(f, "run"),
        }
    }
}

/// Why a remote resource operation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteFailure {
    NotFound,
    Unauthorized,
    QuotaExceeded,
    /// The resource must exist locally before the operation (e.g. no project resolved yet).
    Unresolved,
    Rejected { status: u16, body: String },
    /// The service answered 2xx with a body we could not decode.
    MalformedResponse(String),
}

impl fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteFailure::NotFound => write!(f, "not found"),
            RemoteFailure::Unauthorized => write!(f, "unauthorized (check the API key)"),
            RemoteFailure::QuotaExceeded => write!(f, "quota exceeded"),
            RemoteFailure::Unresolved => write!(f, "not resolved yet"),
            RemoteFailure::Rejected { status, body } => {
                write!(f, "rejected with HTTP {status}: {body}")
            }
            RemoteFailure::MalformedResponse(msg) => write!(f, "malformed response: {msg}"),
        }
    }
}

/// Unified error type for driftwatch.
#[derive(Error, Debug)]
pub enum Error {
    /// Every configuration violation found in one validation pass.
    #[error("configuration error: {}", .0.join("; "))]
    Configuration(Vec<String>),

    #[error("{target} unreachable: {source}")]
    Connectivity {
        target: String,
        #[source]
        source: BoxError,
    },

    #[error("extraction failed for {intent}: {source}")]
    Extraction {
        intent: String,
        #[source]
        source: BoxError,
    },

    #[error("dataset '{dataset}' is empty: {detail}")]
    EmptyDataset { dataset: String, detail: String },

    #[error("{resource} '{id}' {failure}")]
    RemoteResource {
        resource: ResourceKind,
        id: String,
        failure: RemoteFailure,
    },

    #[error("invalid input for dataset '{dataset}': {message}")]
    Validation { dataset: String, message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn connectivity(target: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::Connectivity {
            target: target.into(),
            source: source.into(),
        }
    }

    pub fn extraction(intent: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::Extraction {
            intent: intent.into(),
            source: source.into(),
        }
    }

    pub fn remote(resource: ResourceKind, id: impl Into<String>, failure: RemoteFailure) -> Self {
        Error::RemoteResource {
            resource,
            id: id.into(),
            failure,
        }
    }

    /// Returns the error code for this error type.
    pub fn code(&self) -> u32 {
        match self {
            Error::Configuration(_) => 10,
            Error::Connectivity { .. } => 20,
            Error::Extraction { .. } => 30,
            Error::EmptyDataset { .. } => 40,
            Error::RemoteResource { .. } => 50,
            Error::Validation { .. } => 60,
            Error::Json(_) => 70,
        }
    }

    /// True for failures caused by an unreachable dependency rather than bad data.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Error::Connectivity { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_lists_every_violation() {
        let err = Error::Configuration(vec![
            "EVIDENTLY_API_KEY is required".to_string(),
            "REFERENCE_LIMIT must be positive".to_string(),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("EVIDENTLY_API_KEY"));
        assert!(msg.contains("REFERENCE_LIMIT"));
        assert_eq!(err.code(), 10);
    }

    #[test]
    fn remote_resource_names_kind_and_id() {
        let err = Error::remote(ResourceKind::Project, "p-42", RemoteFailure::NotFound);
        assert_eq!(err.to_string(), "project 'p-42' not found");
        assert_eq!(err.code(), 50);
    }

    #[test]
    fn extraction_preserves_cause() {
        let cause = std::io::Error::new(std::io::ErrorKind::Other, "syntax error at line 3");
        let err = Error::extraction("current_window", cause);
        let source = std::error::Error::source(&err).expect("source kept");
        assert!(source.to_string().contains("syntax error"));
        assert!(!err.is_connectivity());
    }
}
