// Telemetry: callback instrumentation and tracing setup
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::bus::HostBus;
use crate::callback::Callback;
use crate::config::ContextOptions;
use crate::envelope::Payload;
use crate::history::{HistoryRecord, HistorySink};
use crate::log::{tags, worker_name, EventLog};
use crate::scope::Scope;

/// Initialize the tracing subscriber
///
/// Installs a fmt layer filtered by `RUST_LOG` (default: `info`). Fails if a
/// global subscriber is already set.
///
/// # Example
///
/// ```no_run
/// use crosstalk_core::telemetry::init_tracing;
///
/// fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
///     init_tracing()?;
///     Ok(())
/// }
/// ```
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    info!(target: "telemetry", "Tracing initialized");
    Ok(())
}

/// Name of the synthetic event re-broadcast when a callback fires.
pub fn callback_event(message: &str, is_error: bool) -> String {
    if is_error {
        format!("@callback.{message}.error")
    } else {
        format!("@callback.{message}.response")
    }
}

/// Whether a callback's error argument counts as an error.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Error argument as a mapping: `"boom"` becomes `{message: "boom"}`.
pub fn coerce_error(error: Option<Value>) -> Payload {
    match error {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(other) => wrap("message", other),
    }
}

/// Response argument as a mapping: `42` becomes `{response: 42}`.
pub fn coerce_response(response: Option<Value>) -> Payload {
    match response {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(other) => wrap("response", other),
    }
}

fn wrap(key: &str, value: Value) -> Payload {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    map
}

/// Wraps `original` so each invocation is recorded, logged and re-broadcast
/// before the caller's callback runs.
///
/// Everything happens inside the invocation itself; no extra task or hop.
pub fn instrument_callback(
    bus: Arc<dyn HostBus>,
    log: Arc<dyn EventLog>,
    options: Arc<ContextOptions>,
    message: String,
    scope: Option<Scope>,
    original: Callback,
) -> Callback {
    Callback::new(move |error, response| {
        let is_error = error.as_ref().map(is_truthy).unwrap_or(false);
        if is_error {
            let error = coerce_error(error);
            report(&*bus, &*log, &options, &message, scope.as_ref(), true, &error);
            original.invoke(Some(Value::Object(error)), response);
        } else {
            let response = coerce_response(response);
            report(&*bus, &*log, &options, &message, scope.as_ref(), false, &response);
            original.invoke(error, Some(Value::Object(response)));
        }
    })
}

fn report(
    bus: &dyn HostBus,
    log: &dyn EventLog,
    options: &ContextOptions,
    message: &str,
    scope: Option<&Scope>,
    is_error: bool,
    payload: &Payload,
) {
    let event = callback_event(message, is_error);

    bus.history().record(HistoryRecord::outbound(
        event.as_str(),
        Some(Value::Object(payload.clone())),
        None,
        false,
        None,
        None,
    ));

    if !options.silent {
        let entry = json!({
            "workerName": worker_name(options),
            "kind": if is_error { "ERROR" } else { "RESPONSE" },
            "message": message,
            "data": payload,
            "scope": scope,
            "hasCallback": false,
        });
        if is_error {
            log.error(tags::CALLBACK, &entry);
        } else {
            log.info(tags::CALLBACK, &entry);
        }
    }

    if let Err(e) = bus.emit(&event, Some(payload.clone()), None, None, None) {
        warn!(target: "crosstalk", event = %event, error = %e, "Callback re-broadcast failed");
    }
}
