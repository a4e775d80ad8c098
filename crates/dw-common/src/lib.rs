//! driftwatch common types, IDs, and errors.
//!
//! This crate provides foundational types shared across the workspace:
//! - Per-detection row types produced by the telemetry extractor
//! - Drift-service resource identifiers
//! - The unified error taxonomy

pub mod error;
pub mod event;
pub mod id;

pub use error::{BoxError, Error, RemoteFailure, ResourceKind, Result};
pub use event::{FeatureRecord, PredictionEvent};
pub use id::{DatasetId, InvocationId, ProjectId, RunId};
