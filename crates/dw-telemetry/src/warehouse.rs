//! Warehouse transport.
//!
//! The extractor talks to the warehouse through the `Warehouse` trait so
//! query construction and row mapping can be exercised without a server.
//! `ClickHouseHttp` is the production transport over ClickHouse's HTTP
//! interface.

use std::time::Instant;

use dw_common::BoxError;
use dw_config::WarehouseSettings;
use thiserror::Error;
use tracing::{debug, trace};

/// Errors returned by a warehouse transport.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// The warehouse could not be reached at all.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    /// The warehouse answered but refused the statement.
    #[error("query rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("failed to read response body: {0}")]
    Body(#[source] std::io::Error),
}

impl WarehouseError {
    pub fn is_transport(&self) -> bool {
        matches!(self, WarehouseError::Transport(_))
    }
}

/// Read-only analytical query surface.
pub trait Warehouse {
    /// Transport name used for logs and connectivity errors.
    fn name(&self) -> &str;
    /// Execute one statement and return the raw response body.
    fn query(&self, sql: &str) -> Result<String, WarehouseError>;
    /// Cheap reachability probe.
    fn ping(&self) -> Result<(), WarehouseError> {
        self.query("SELECT 1").map(|_| ())
    }
}

impl<W: Warehouse + ?Sized> Warehouse for &W {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn query(&self, sql: &str) -> Result<String, WarehouseError> {
        (**self).query(sql)
    }

    fn ping(&self) -> Result<(), WarehouseError> {
        (**self).ping()
    }
}

/// ClickHouse over its HTTP interface.
///
/// The agent is built once and reused for every statement of the run.
pub struct ClickHouseHttp {
    agent: ureq::Agent,
    endpoint: String,
    database: String,
    user: String,
    password: String,
}

impl ClickHouseHttp {
    pub fn new(
        endpoint: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            database: database.into(),
            user: user.into(),
            password: password.into(),
        }
    }

    /// Build from warehouse settings.
    pub fn from_settings(settings: &WarehouseSettings) -> Self {
        Self::new(
            settings.endpoint(),
            settings.database.clone(),
            settings.user.clone(),
            settings.password.clone(),
        )
    }
}

impl std::fmt::Debug for ClickHouseHttp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClickHouseHttp")
            .field("endpoint", &self.endpoint)
            .field("database", &self.database)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl Warehouse for ClickHouseHttp {
    fn name(&self) -> &str {
        "clickhouse"
    }

    fn query(&self, sql: &str) -> Result<String, WarehouseError> {
        let started = Instant::now();
        trace!(sql, "executing warehouse query");
        let response = self
            .agent
            .post(&format!("{}/", self.endpoint))
            .query("database", &self.database)
            .query("date_time_output_format", "iso")
            .query("output_format_json_quote_64bit_integers", "0")
            .set("X-ClickHouse-User", &self.user)
            .set("X-ClickHouse-Key", &self.password)
            .send_string(sql);

        let response = match response {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                let body = response
                    .into_string()
                    .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
                return Err(WarehouseError::Rejected {
                    status,
                    body: body.trim().to_string(),
                });
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(WarehouseError::Transport(Box::new(transport)));
            }
        };

        let body = response.into_string().map_err(WarehouseError::Body)?;
        debug!(
            bytes = body.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "warehouse query finished"
        );
        Ok(body)
    }
}
