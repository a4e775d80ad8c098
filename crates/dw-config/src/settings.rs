//! Environment-sourced settings.
//!
//! `Settings` is built once at startup and handed to each component; no
//! component reads the environment on its own.

use std::fmt;

use serde::Serialize;

use crate::validate::{
    check_bounded_count, check_http_url, check_positive, check_unit_interval, Requirement,
    ValidationIssue,
};

pub const ENV_CLICKHOUSE_HOST: &str = "CLICKHOUSE_HOST";
pub const ENV_CLICKHOUSE_PORT: &str = "CLICKHOUSE_PORT";
pub const ENV_CLICKHOUSE_USER: &str = "CLICKHOUSE_USER";
pub const ENV_CLICKHOUSE_PASSWORD: &str = "CLICKHOUSE_PASSWORD";
pub const ENV_CLICKHOUSE_DATABASE: &str = "CLICKHOUSE_DATABASE";
pub const ENV_CLICKHOUSE_TABLE: &str = "CLICKHOUSE_TABLE";
pub const ENV_API_KEY: &str = "EVIDENTLY_API_KEY";
pub const ENV_SERVICE_URL: &str = "EVIDENTLY_URL";
pub const ENV_PROJECT_ID: &str = "EVIDENTLY_PROJECT_ID";
pub const ENV_PROJECT_NAME: &str = "EVIDENTLY_PROJECT_NAME";
pub const ENV_REFERENCE_DATASET_ID: &str = "REFERENCE_DATASET_ID";
pub const ENV_REFERENCE_CLASS_NAME: &str = "REFERENCE_CLASS_NAME";
pub const ENV_REFERENCE_MIN_CONFIDENCE: &str = "REFERENCE_MIN_CONFIDENCE";
pub const ENV_REFERENCE_LIMIT: &str = "REFERENCE_LIMIT";
pub const ENV_CURRENT_DAYS_AGO: &str = "CURRENT_DAYS_AGO";

/// Longest accepted current window, in days.
pub const MAX_WINDOW_DAYS: i64 = 36_500;
/// Longest accepted look-back for hour-based windows.
pub const MAX_WINDOW_HOURS: i64 = MAX_WINDOW_DAYS * 24;

const DEFAULT_SERVICE_URL: &str = "https://app.evidently.cloud";
const DEFAULT_PROJECT_NAME: &str = "detection-drift";

/// Warehouse (ClickHouse HTTP interface) connection settings.
#[derive(Clone, Serialize)]
pub struct WarehouseSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(skip)]
    pub password: String,
    pub database: String,
    pub table: String,
}

impl WarehouseSettings {
    /// Fully qualified `database.table` name.
    pub fn qualified_table(&self) -> String {
        format!("{}.{}", self.database, self.table)
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl Default for WarehouseSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8123,
            user: "default".to_string(),
            password: String::new(),
            database: "yolo_analytics".to_string(),
            table: "otel_traces".to_string(),
        }
    }
}

impl fmt::Debug for WarehouseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarehouseSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("table", &self.table)
            .finish()
    }
}

/// Drift-service connection settings.
#[derive(Clone, Serialize)]
pub struct DriftServiceSettings {
    #[serde(skip)]
    pub api_key: String,
    pub base_url: String,
    /// Explicit project id; when set, name lookup is never attempted.
    pub project_id: Option<String>,
    pub project_name: String,
}

impl Default for DriftServiceSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_SERVICE_URL.to_string(),
            project_id: None,
            project_name: DEFAULT_PROJECT_NAME.to_string(),
        }
    }
}

impl fmt::Debug for DriftServiceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriftServiceSettings")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("project_id", &self.project_id)
            .field("project_name", &self.project_name)
            .finish()
    }
}

/// Reference dataset curation parameters.
#[derive(Debug, Clone, Serialize)]
pub struct ReferenceSettings {
    /// Durable id of the curated reference dataset in the drift-service.
    pub dataset_id: Option<String>,
    pub class_name: String,
    /// Rows must have confidence strictly above this value.
    pub min_confidence: f64,
    pub limit: i64,
}

impl Default for ReferenceSettings {
    fn default() -> Self {
        Self {
            dataset_id: None,
            class_name: "book".to_string(),
            min_confidence: 0.8,
            limit: 10,
        }
    }
}

/// Rolling current-window parameters.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentWindowSettings {
    pub days: i64,
}

impl Default for CurrentWindowSettings {
    fn default() -> Self {
        Self { days: 7 }
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Settings {
    pub warehouse: WarehouseSettings,
    pub drift: DriftServiceSettings,
    pub reference: ReferenceSettings,
    pub current: CurrentWindowSettings,
    /// Values that were present but could not be parsed.
    #[serde(skip)]
    parse_issues: Vec<ValidationIssue>,
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary key lookup.
    ///
    /// Unset or blank variables take their defaults. Malformed numbers keep
    /// the default and are reported later by [`Settings::validate`].
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut settings = Settings::default();
        let mut issues = Vec::new();

        let wh = &mut settings.warehouse;
        if let Some(v) = get(ENV_CLICKHOUSE_HOST) {
            wh.host = v;
        }
        parse_into(get(ENV_CLICKHOUSE_PORT), ENV_CLICKHOUSE_PORT, &mut wh.port, &mut issues);
        if let Some(v) = get(ENV_CLICKHOUSE_USER) {
            wh.user = v;
        }
        // Passwords may legitimately contain surrounding spaces.
        if let Some(v) = lookup(ENV_CLICKHOUSE_PASSWORD) {
            wh.password = v;
        }
        if let Some(v) = get(ENV_CLICKHOUSE_DATABASE) {
            wh.database = v;
        }
        if let Some(v) = get(ENV_CLICKHOUSE_TABLE) {
            wh.table = v;
        }

        let drift = &mut settings.drift;
        if let Some(v) = get(ENV_API_KEY) {
            drift.api_key = v;
        }
        if let Some(v) = get(ENV_SERVICE_URL) {
            drift.base_url = v.trim_end_matches('/').to_string();
        }
        drift.project_id = get(ENV_PROJECT_ID);
        if let Some(v) = get(ENV_PROJECT_NAME) {
            drift.project_name = v;
        }

        let reference = &mut settings.reference;
        reference.dataset_id = get(ENV_REFERENCE_DATASET_ID);
        if let Some(v) = get(ENV_REFERENCE_CLASS_NAME) {
            reference.class_name = v;
        }
        parse_into(
            get(ENV_REFERENCE_MIN_CONFIDENCE),
            ENV_REFERENCE_MIN_CONFIDENCE,
            &mut reference.min_confidence,
            &mut issues,
        );
        parse_into(get(ENV_REFERENCE_LIMIT), ENV_REFERENCE_LIMIT, &mut reference.limit, &mut issues);
        parse_into(
            get(ENV_CURRENT_DAYS_AGO),
            ENV_CURRENT_DAYS_AGO,
            &mut settings.current.days,
            &mut issues,
        );

        settings.parse_issues = issues;
        settings
    }

    /// Every violation for the given command, in one pass.
    pub fn validate(&self, requirement: Requirement) -> Vec<ValidationIssue> {
        let mut issues = self.parse_issues.clone();

        if requirement.needs_drift_service() {
            if self.drift.api_key.is_empty() {
                issues.push(ValidationIssue::Missing(ENV_API_KEY));
            }
            check_http_url(ENV_SERVICE_URL, &self.drift.base_url, &mut issues);
        }
        if requirement.needs_reference_id() && self.reference.dataset_id.is_none() {
            issues.push(ValidationIssue::Missing(ENV_REFERENCE_DATASET_ID));
        }
        if self.warehouse.host.is_empty() {
            issues.push(ValidationIssue::Missing(ENV_CLICKHOUSE_HOST));
        }

        check_unit_interval(
            ENV_REFERENCE_MIN_CONFIDENCE,
            self.reference.min_confidence,
            &mut issues,
        );
        check_positive(ENV_REFERENCE_LIMIT, self.reference.limit, &mut issues);
        check_bounded_count(
            ENV_CURRENT_DAYS_AGO,
            self.current.days,
            MAX_WINDOW_DAYS,
            &mut issues,
        );
        issues
    }

    /// Validate and convert any violations into a configuration error.
    pub fn ensure_valid(&self, requirement: Requirement) -> dw_common::Result<()> {
        let issues = self.validate(requirement);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(dw_common::Error::Configuration(
                issues.iter().map(ToString::to_string).collect(),
            ))
        }
    }

    /// One-line summary safe for logs (no secrets).
    pub fn summary_line(&self) -> String {
        let reference = self
            .reference
            .dataset_id
            .as_deref()
            .map(|id| id.chars().take(8).collect::<String>())
            .unwrap_or_else(|| "unset".to_string());
        format!(
            "warehouse={}:{} | days={} | ref={}... | key={}",
            self.warehouse.host,
            self.warehouse.port,
            self.current.days,
            reference,
            if self.drift.api_key.is_empty() { "missing" } else { "set" },
        )
    }
}

fn parse_into<T: std::str::FromStr>(
    raw: Option<String>,
    var: &'static str,
    slot: &mut T,
    issues: &mut Vec<ValidationIssue>,
) {
    if let Some(raw) = raw {
        match raw.parse::<T>() {
            Ok(v) => *slot = v,
            Err(_) => issues.push(ValidationIssue::NotANumber { var, raw }),
        }
    }
}
