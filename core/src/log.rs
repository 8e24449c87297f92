//! Structured event log written by the worker context.
//!
//! Every entry is a tag (`EMIT`, `ON`, `NOT AUTHORIZED`, ...) plus a JSON
//! payload. [`TracingLog`] writes them through `tracing`; hosts that want the
//! entries elsewhere implement [`EventLog`] themselves.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::config::ContextOptions;

/// Log tags
pub mod tags {
    pub const EMIT: &str = "EMIT";
    pub const ON: &str = "ON";
    pub const PUBLISH: &str = "PUBLISH";
    pub const SUBSCRIPTION: &str = "SUBSCRIPTION";
    pub const CALLBACK: &str = "CALLBACK";
    pub const NOT_AUTHORIZED: &str = "NOT AUTHORIZED";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Log,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => f.write_str("info"),
            Severity::Log => f.write_str("log"),
            Severity::Error => f.write_str("error"),
        }
    }
}

pub trait EventLog: Send + Sync {
    fn write(&self, severity: Severity, tag: &str, payload: &Value);

    fn info(&self, tag: &str, payload: &Value) {
        self.write(Severity::Info, tag, payload)
    }

    fn log(&self, tag: &str, payload: &Value) {
        self.write(Severity::Log, tag, payload)
    }

    fn error(&self, tag: &str, payload: &Value) {
        self.write(Severity::Error, tag, payload)
    }
}

/// Writes entries as `tracing` events under the `crosstalk` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

impl EventLog for TracingLog {
    fn write(&self, severity: Severity, tag: &str, payload: &Value) {
        match severity {
            Severity::Info | Severity::Log => {
                tracing::info!(target: "crosstalk", %severity, tag, payload = %payload)
            }
            Severity::Error => {
                tracing::error!(target: "crosstalk", %severity, tag, payload = %payload)
            }
        }
    }
}

/// Display name of the worker a context belongs to.
pub fn worker_name(options: &ContextOptions) -> String {
    let mut name = format!(
        "worker {} (environment {})",
        options.worker_id, options.environment_id
    );
    if !options.worker_path.is_empty() {
        name.push(' ');
        name.push_str(&options.worker_path);
    }
    name
}

/// Headline logged when a worker's handler fails.
pub fn vm_error_message(error: &str, worker_path: &str) -> String {
    if worker_path.is_empty() {
        format!("Worker handler failed: {error}")
    } else {
        format!("Worker handler failed in {worker_path}: {error}")
    }
}
