//! Structured logging setup.
//!
//! Logs go to stderr so stdout carries only command results. `RUST_LOG`
//! selects the filter (default `info`); `DRIFTWATCH_LOG_JSON=1` switches to
//! JSON lines for log shippers.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const ENV_LOG_JSON: &str = "DRIFTWATCH_LOG_JSON";

/// Whether JSON log output was requested through the environment.
pub fn json_requested() -> bool {
    std::env::var(ENV_LOG_JSON)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Install the global subscriber. Safe to call once per process.
pub fn init(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    if let Err(err) = result {
        eprintln!("warning: logging already initialised: {err}");
    }
}
