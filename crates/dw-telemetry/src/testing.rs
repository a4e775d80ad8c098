//! Test utilities: a scripted in-memory warehouse and span-row builders.

use std::cell::RefCell;

use serde_json::json;

use crate::warehouse::{Warehouse, WarehouseError};

/// Render one `JSONEachRow` span line with `(class_name, confidence)` events.
pub fn span_line(
    timestamp: &str,
    prediction_id: &str,
    processing_time: &str,
    events: &[(&str, &str)],
) -> String {
    let events: Vec<_> = events
        .iter()
        .enumerate()
        .map(|(idx, (class, conf))| {
            json!({
                "class_name": class,
                "confidence": conf,
                "object_index": idx.to_string(),
            })
        })
        .collect();
    json!({
        "Timestamp": timestamp,
        "SpanAttributes": {
            "prediction_id": prediction_id,
            "processing_time_seconds": processing_time,
            "filename": format!("{prediction_id}.jpg"),
            "model_name": "yolov8n",
        },
        "EventAttributes": events,
    })
    .to_string()
}

enum Script {
    Body(String),
    Unreachable,
    Rejected { status: u16, body: String },
    Denied { status: u16, body: String },
}

/// Warehouse double answering every data query with a fixed body.
///
/// `SELECT 1` probes succeed unless the warehouse is scripted as
/// unreachable or denying. Every statement is recorded.
pub struct ScriptedWarehouse {
    script: Script,
    executed: RefCell<Vec<String>>,
}

impl ScriptedWarehouse {
    pub fn with_body(body: impl Into<String>) -> Self {
        Self::new(Script::Body(body.into()))
    }

    pub fn with_spans(lines: &[String]) -> Self {
        Self::with_body(lines.join("\n"))
    }

    pub fn unreachable() -> Self {
        Self::new(Script::Unreachable)
    }

    pub fn rejecting(status: u16, body: impl Into<String>) -> Self {
        Self::new(Script::Rejected {
            status,
            body: body.into(),
        })
    }

    /// Every statement, probes included, is refused (bad credentials).
    pub fn denying(status: u16, body: impl Into<String>) -> Self {
        Self::new(Script::Denied {
            status,
            body: body.into(),
        })
    }

    fn new(script: Script) -> Self {
        Self {
            script,
            executed: RefCell::new(Vec::new()),
        }
    }

    /// Statements executed so far, probes included.
    pub fn executed(&self) -> Vec<String> {
        self.executed.borrow().clone()
    }
}

impl Warehouse for ScriptedWarehouse {
    fn name(&self) -> &str {
        "scripted"
    }

    fn query(&self, sql: &str) -> Result<String, WarehouseError> {
        self.executed.borrow_mut().push(sql.to_string());
        match &self.script {
            Script::Unreachable => Err(WarehouseError::Transport(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused (scripted outage)",
            )))),
            Script::Rejected { status, body } if sql != "SELECT 1" => {
                Err(WarehouseError::Rejected {
                    status: *status,
                    body: body.clone(),
                })
            }
            Script::Rejected { .. } => Ok("1\n".to_string()),
            Script::Denied { status, body } => Err(WarehouseError::Rejected {
                status: *status,
                body: body.clone(),
            }),
            Script::Body(_) if sql == "SELECT 1" => Ok("1\n".to_string()),
            Script::Body(body) => Ok(body.clone()),
        }
    }
}
