use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::callback::{Callback, Handler};
use crate::scope::Scope;
use crate::{CrosstalkError, Result};

/// Structured message data. Anything else is rejected before delivery.
pub type Payload = serde_json::Map<String, Value>;

/// Capability reference addressing one specific worker.
///
/// Holding a `WorkerRef` is what grants the right to send to that worker
/// directly. A message addressed through one is never forwarded to the
/// remote fabric, which has no way to carry the reference along.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerRef {
    id: String,
}

impl WorkerRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for WorkerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker:{}", self.id)
    }
}

/// Canonical outbound message: `(worker?, message, data?, scope?, callback?)`.
///
/// Built either through the typed constructors
///
/// ```
/// use crosstalk_core::{Envelope, WorkerRef};
/// use serde_json::json;
///
/// let env = Envelope::send("greet").with_data(json!({"name": "a"}));
/// assert!(env.worker.is_none());
///
/// let direct = Envelope::send_direct(WorkerRef::new("w-7"), "ping").with_scope("team-a");
/// assert_eq!(direct.worker.as_ref().map(|w| w.id()), Some("w-7"));
/// ```
///
/// or from positional arguments with [`Envelope::from_args`].
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    pub worker: Option<WorkerRef>,
    pub message: String,
    pub data: Option<Value>,
    pub scope: Option<Scope>,
    pub callback: Option<Callback>,
    // kind of a non-value argument that landed in the data position
    stray_data: Option<&'static str>,
}

impl Envelope {
    /// Message for whoever listens on `message`.
    pub fn send(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Message addressed to one worker through its capability reference.
    pub fn send_direct(worker: WorkerRef, message: impl Into<String>) -> Self {
        Self {
            worker: Some(worker),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self.stray_data = None;
        self
    }

    pub fn with_scope(mut self, scope: impl Into<Scope>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_callback(mut self, callback: Callback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Shorthand for `with_callback(Callback::new(f))`.
    pub fn on_complete<F>(self, f: F) -> Self
    where
        F: FnOnce(Option<Value>, Option<Value>) + Send + 'static,
    {
        self.with_callback(Callback::new(f))
    }

    /// Normalizes a positional call `[worker?], message, data?, scope?, callback?`.
    ///
    /// 1. If the first argument is not a worker reference, there is none and
    ///    every argument shifts one place to the right.
    /// 2. If the scope position holds a callable, it is the callback and the
    ///    scope is cleared.
    ///
    /// Never fails; bad data is reported later by [`Envelope::payload`].
    pub fn from_args(args: Vec<Arg>) -> Self {
        let (worker, mut rest) = split_worker(args);
        let message = rest.next().map(Arg::into_message).unwrap_or_default();

        let mut data = None;
        let mut stray_data = None;
        match rest.next() {
            Some(Arg::Value(v)) => data = Some(v),
            Some(Arg::Worker(w)) => data = serde_json::to_value(w).ok(),
            Some(Arg::Scope(s)) => data = Some(scope_as_value(s)),
            Some(other) => stray_data = Some(other.kind()),
            None => {}
        }

        let (scope, callable) = match rest.next() {
            Some(arg) if arg.is_callable() => (None, Some(arg)),
            scope => (scope.and_then(Arg::into_scope), rest.next()),
        };

        Self {
            worker,
            message,
            data,
            scope,
            callback: callable.and_then(Arg::into_callback),
            stray_data,
        }
    }

    /// Validated data: absent (or `null`) passes as `None`, a mapping as
    /// `Some`, anything else is [`CrosstalkError::InvalidDataError`].
    pub fn payload(&self) -> Result<Option<Payload>> {
        if let Some(kind) = self.stray_data {
            return Err(CrosstalkError::InvalidDataError(kind.to_string()));
        }
        match &self.data {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map.clone())),
            Some(other) => Err(CrosstalkError::InvalidDataError(value_kind(other).to_string())),
        }
    }
}

/// Canonical listener registration: `(worker?, message, scope?, handler)`.
#[derive(Debug, Clone, Default)]
pub struct Listen {
    pub worker: Option<WorkerRef>,
    pub message: String,
    pub scope: Option<Scope>,
    pub handler: Option<Handler>,
}

impl Listen {
    pub fn new(message: impl Into<String>, handler: Handler) -> Self {
        Self {
            message: message.into(),
            handler: Some(handler),
            ..Default::default()
        }
    }

    /// Listener reached through a capability reference.
    pub fn direct(worker: WorkerRef, message: impl Into<String>, handler: Handler) -> Self {
        Self {
            worker: Some(worker),
            ..Self::new(message, handler)
        }
    }

    pub fn with_scope(mut self, scope: impl Into<Scope>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Normalizes a positional call `[worker?], message, scope?, handler`
    /// with the same two rules as [`Envelope::from_args`].
    pub fn from_args(args: Vec<Arg>) -> Self {
        let (worker, mut rest) = split_worker(args);
        let message = rest.next().map(Arg::into_message).unwrap_or_default();

        let (scope, callable) = match rest.next() {
            Some(arg) if arg.is_callable() => (None, Some(arg)),
            scope => (scope.and_then(Arg::into_scope), rest.next()),
        };

        Self {
            worker,
            message,
            scope,
            handler: callable.and_then(Arg::into_handler),
        }
    }
}

/// One positional argument of a dynamically-shaped call.
#[derive(Debug, Clone)]
pub enum Arg {
    Worker(WorkerRef),
    Value(Value),
    Scope(Scope),
    Callback(Callback),
    Handler(Handler),
}

impl Arg {
    fn is_callable(&self) -> bool {
        matches!(self, Arg::Callback(_) | Arg::Handler(_))
    }

    fn kind(&self) -> &'static str {
        match self {
            Arg::Worker(_) => "worker reference",
            Arg::Value(v) => value_kind(v),
            Arg::Scope(_) => "scope",
            Arg::Callback(_) | Arg::Handler(_) => "function",
        }
    }

    fn into_message(self) -> String {
        match self {
            Arg::Value(Value::String(s)) => s,
            Arg::Value(Value::Null) => String::new(),
            Arg::Value(v) => v.to_string(),
            Arg::Scope(Scope::Named(s)) => s,
            _ => String::new(),
        }
    }

    fn into_scope(self) -> Option<Scope> {
        match self {
            Arg::Scope(s) => Some(s),
            Arg::Value(Value::Null) => None,
            Arg::Value(Value::String(s)) => Some(Scope::Named(s)),
            // Structured values are opaque: each one gets its own identity
            Arg::Value(v @ (Value::Object(_) | Value::Array(_))) => {
                Some(Scope::token(v.to_string()))
            }
            Arg::Value(v) => Some(Scope::Named(v.to_string())),
            _ => None,
        }
    }

    fn into_callback(self) -> Option<Callback> {
        match self {
            Arg::Callback(cb) => Some(cb),
            _ => None,
        }
    }

    fn into_handler(self) -> Option<Handler> {
        match self {
            Arg::Handler(h) => Some(h),
            _ => None,
        }
    }
}

impl From<WorkerRef> for Arg {
    fn from(worker: WorkerRef) -> Self {
        Arg::Worker(worker)
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Arg::Value(value)
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Value(Value::String(s.to_string()))
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Value(Value::String(s))
    }
}

impl From<Scope> for Arg {
    fn from(scope: Scope) -> Self {
        Arg::Scope(scope)
    }
}

impl From<Callback> for Arg {
    fn from(callback: Callback) -> Self {
        Arg::Callback(callback)
    }
}

impl From<Handler> for Arg {
    fn from(handler: Handler) -> Self {
        Arg::Handler(handler)
    }
}

fn split_worker(args: Vec<Arg>) -> (Option<WorkerRef>, std::vec::IntoIter<Arg>) {
    let mut iter = args.into_iter();
    if !matches!(iter.as_slice().first(), Some(Arg::Worker(_))) {
        return (None, iter);
    }
    let worker = match iter.next() {
        Some(Arg::Worker(w)) => Some(w),
        _ => None,
    };
    (worker, iter)
}

fn scope_as_value(scope: Scope) -> Value {
    match scope {
        Scope::Named(name) => Value::String(name),
        Scope::Token(token) => serde_json::json!({ "token": token.label() }),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
