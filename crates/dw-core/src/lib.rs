//! driftwatch pipeline orchestration.
//!
//! Sequences validation, current-window extraction, and drift comparison
//! for one batch run, plus the supporting reference-curation and
//! warehouse-inspection commands.

pub mod exit_codes;
pub mod logging;
pub mod pipeline;

pub use exit_codes::ExitCode;
pub use pipeline::{Orchestrator, PipelineError, RunState, Stage, WarehouseOverview};
