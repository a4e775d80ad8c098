//! driftwatch drift-service client.
//!
//! This crate provides:
//! - The `DriftService` seam over the remote project/dataset/run API
//! - `HttpDriftService`, the bearer-token JSON transport
//! - Feature preparation shared by both sides of a comparison
//! - `DriftClient`: project resolution, dataset upload/download, and the
//!   all-or-nothing `run_and_publish`

pub mod client;
pub mod dataset;
pub mod http;
pub mod service;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use client::{DriftClient, DriftReport};
pub use dataset::{prepare, FeatureRow, PreparedDataset};
pub use http::HttpDriftService;
pub use service::{DatasetUpload, DriftService, Project, RunRequest};

/// Tag attached to every published comparison.
pub const MONITORING_TAG: &str = "detection_monitoring";

/// Metric preset requested from the drift-service.
pub const DRIFT_PRESET: &str = "DataDriftPreset";
