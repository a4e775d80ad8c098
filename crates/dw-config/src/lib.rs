//! driftwatch configuration loading and validation.
//!
//! This crate provides:
//! - Typed `Settings` read once from the environment at startup
//! - Eager validation that reports every violation in one pass

pub mod settings;
pub mod validate;

pub use settings::{
    CurrentWindowSettings, DriftServiceSettings, ReferenceSettings, Settings, WarehouseSettings,
    MAX_WINDOW_DAYS, MAX_WINDOW_HOURS,
};
pub use validate::{Requirement, ValidationIssue};
