//! Configuration validation.
//!
//! Validation never stops at the first problem: operators get the full list
//! before any remote call is made.

use thiserror::Error;

/// Which command the settings are validated for.
///
/// Not every command needs every credential: inspecting the warehouse
/// does not touch the drift-service, and curating a new reference dataset
/// cannot require the id of the dataset it is about to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Full drift analysis: warehouse, drift-service and reference id.
    Analysis,
    /// Reference curation: warehouse and drift-service.
    Curation,
    /// Warehouse-only inspection.
    Inspection,
}

impl Requirement {
    pub fn needs_drift_service(self) -> bool {
        matches!(self, Requirement::Analysis | Requirement::Curation)
    }

    pub fn needs_reference_id(self) -> bool {
        matches!(self, Requirement::Analysis)
    }
}

/// A single configuration violation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationIssue {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{var} must be a number, got '{raw}'")]
    NotANumber { var: &'static str, raw: String },

    #[error("{var} must be between {min} and {max}, got {value}")]
    OutOfRange {
        var: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },

    #[error("{var} must be positive, got {value}")]
    NotPositive { var: &'static str, value: i64 },

    #[error("{var} must be at most {max}, got {value}")]
    TooLarge {
        var: &'static str,
        max: i64,
        value: i64,
    },

    #[error("{var} must be an http(s) URL, got '{raw}'")]
    InvalidUrl { var: &'static str, raw: String },
}

impl ValidationIssue {
    /// Name of the environment variable this issue is about.
    pub fn var(&self) -> &'static str {
        match self {
            ValidationIssue::Missing(var) => var,
            ValidationIssue::NotANumber { var, .. }
            | ValidationIssue::OutOfRange { var, .. }
            | ValidationIssue::NotPositive { var, .. }
            | ValidationIssue::TooLarge { var, .. }
            | ValidationIssue::InvalidUrl { var, .. } => var,
        }
    }
}

pub(crate) fn check_positive(var: &'static str, value: i64, issues: &mut Vec<ValidationIssue>) {
    if value <= 0 {
        issues.push(ValidationIssue::NotPositive { var, value });
    }
}

/// `1..=max`; reports at most one issue.
pub(crate) fn check_bounded_count(
    var: &'static str,
    value: i64,
    max: i64,
    issues: &mut Vec<ValidationIssue>,
) {
    if value <= 0 {
        issues.push(ValidationIssue::NotPositive { var, value });
    } else if value > max {
        issues.push(ValidationIssue::TooLarge { var, max, value });
    }
}

pub(crate) fn check_unit_interval(var: &'static str, value: f64, issues: &mut Vec<ValidationIssue>) {
    if !(0.0..=1.0).contains(&value) {
        issues.push(ValidationIssue::OutOfRange {
            var,
            min: 0.0,
            max: 1.0,
            value,
        });
    }
}

pub(crate) fn check_http_url(var: &'static str, raw: &str, issues: &mut Vec<ValidationIssue>) {
    let rest = raw
        .strip_prefix("https://")
        .or_else(|| raw.strip_prefix("http://"));
    match rest {
        Some(host) if !host.trim_matches('/').is_empty() => {}
        _ => issues.push(ValidationIssue::InvalidUrl {
            var,
            raw: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_interval_bounds_are_inclusive() {
        let mut issues = Vec::new();
        check_unit_interval("X", 0.0, &mut issues);
        check_unit_interval("X", 1.0, &mut issues);
        assert!(issues.is_empty());
        check_unit_interval("X", 1.01, &mut issues);
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn bounded_count_rejects_zero_and_excess() {
        let mut issues = Vec::new();
        check_bounded_count("D", 1, 10, &mut issues);
        check_bounded_count("D", 10, 10, &mut issues);
        assert!(issues.is_empty());
        check_bounded_count("D", 0, 10, &mut issues);
        check_bounded_count("D", 11, 10, &mut issues);
        assert_eq!(
            issues,
            vec![
                ValidationIssue::NotPositive { var: "D", value: 0 },
                ValidationIssue::TooLarge {
                    var: "D",
                    max: 10,
                    value: 11
                },
            ]
        );
    }

    #[test]
    fn url_requires_scheme_and_host() {
        let mut issues = Vec::new();
        check_http_url("U", "https://app.example.com", &mut issues);
        check_http_url("U", "http://10.0.0.5:8000/", &mut issues);
        assert!(issues.is_empty());
        check_http_url("U", "app.example.com", &mut issues);
        check_http_url("U", "https://", &mut issues);
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].var(), "U");
    }
}
