//! Completion callbacks and listener handlers.

use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::envelope::Payload;

type CompletionFn = Box<dyn FnOnce(Option<Value>, Option<Value>) + Send>;

/// Two-argument completion callback `(error, response)`.
///
/// Clones share the same underlying function, which runs at most once no
/// matter how many listeners a bus hands the callback to.
#[derive(Clone)]
pub struct Callback {
    slot: Arc<Mutex<Option<CompletionFn>>>,
}

impl Callback {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(Option<Value>, Option<Value>) + Send + 'static,
    {
        let f: CompletionFn = Box::new(f);
        Self {
            slot: Arc::new(Mutex::new(Some(f))),
        }
    }

    /// Runs the callback. Returns `false` if it had already been invoked.
    pub fn invoke(&self, error: Option<Value>, response: Option<Value>) -> bool {
        // take before calling so a re-entrant invoke sees the slot empty
        let f = self.slot.lock().take();
        match f {
            Some(f) => {
                f(error, response);
                true
            }
            None => false,
        }
    }

    /// Reply with a response and no error.
    pub fn respond(&self, response: Value) -> bool {
        self.invoke(None, Some(response))
    }

    /// Reply with an error.
    pub fn fail(&self, error: Value) -> bool {
        self.invoke(Some(error), None)
    }

    pub fn is_spent(&self) -> bool {
        self.slot.lock().is_none()
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("spent", &self.is_spent())
            .finish()
    }
}

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
pub type HandlerResult = std::result::Result<(), HandlerError>;

type HandlerFn = dyn Fn(Option<Payload>, Option<Callback>) -> HandlerResult + Send + Sync;

/// Worker-supplied listener body, called with `(data, callback)`.
#[derive(Clone)]
pub struct Handler {
    f: Arc<HandlerFn>,
}

impl Handler {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Option<Payload>, Option<Callback>) -> HandlerResult + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }

    pub fn call(&self, data: Option<Payload>, callback: Option<Callback>) -> HandlerResult {
        (self.f)(data, callback)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn callback_fires_once_across_clones() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let cb = Callback::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let other = cb.clone();

        assert!(cb.respond(json!({"ok": true})));
        assert!(!other.fail(json!("late")));
        assert!(other.is_spent());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_passes_arguments_through() {
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let cb = Callback::new(move |err, resp| {
            *sink.lock() = Some((err, resp));
        });
        cb.invoke(Some(json!({"message": "nope"})), None);
        assert_eq!(
            seen.lock().clone(),
            Some((Some(json!({"message": "nope"})), None))
        );
    }

    #[test]
    fn handler_reports_errors() {
        let handler = Handler::new(|data, _| match data {
            Some(_) => Ok(()),
            None => Err("missing data".into()),
        });
        assert!(handler.call(Some(Payload::new()), None).is_ok());
        assert_eq!(
            handler.call(None, None).unwrap_err().to_string(),
            "missing data"
        );
    }
}
