// Shared fixtures for context tests
#![allow(dead_code)]

use crosstalk_core::{
    Callback, ContextOptions, EventLog, HistorySink, HostBus, Listener, LocalBus, MemoryHistory,
    Payload, Result, Scope, Severity, WorkerRef,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

/// EventLog that keeps every entry for inspection
#[derive(Default)]
pub struct RecordingLog {
    entries: Mutex<Vec<(Severity, String, Value)>>,
}

impl RecordingLog {
    pub fn entries(&self) -> Vec<(Severity, String, Value)> {
        self.entries.lock().clone()
    }

    pub fn tagged(&self, tag: &str) -> Vec<Value> {
        self.entries
            .lock()
            .iter()
            .filter(|(_, t, _)| t == tag)
            .map(|(_, _, p)| p.clone())
            .collect()
    }

    pub fn errors(&self) -> Vec<(String, Value)> {
        self.entries
            .lock()
            .iter()
            .filter(|(s, _, _)| *s == Severity::Error)
            .map(|(_, t, p)| (t.clone(), p.clone()))
            .collect()
    }
}

impl EventLog for RecordingLog {
    fn write(&self, severity: Severity, tag: &str, payload: &Value) {
        self.entries
            .lock()
            .push((severity, tag.to_string(), payload.clone()));
    }
}

pub fn options(silent: bool) -> ContextOptions {
    ContextOptions {
        worker_id: 1,
        environment_id: 1,
        worker_path: "workers/test_worker.rs".to_string(),
        silent,
        ..Default::default()
    }
}

pub struct Harness {
    pub bus: Arc<LocalBus>,
    pub history: Arc<MemoryHistory>,
    pub log: Arc<RecordingLog>,
}

impl Harness {
    pub fn new() -> Self {
        let bus = Arc::new(LocalBus::new());
        let history = bus.records();
        Self {
            bus,
            history,
            log: Arc::new(RecordingLog::default()),
        }
    }
}

/// One call made through the `HostBus` contract
#[derive(Debug, Clone, PartialEq)]
pub enum BusCall {
    Emit {
        message: String,
        data: Option<Payload>,
        scope: Option<Scope>,
        has_callback: bool,
        worker: Option<WorkerRef>,
    },
    Publish {
        message: String,
        data: Option<Payload>,
        scope: Option<Scope>,
        is_published: bool,
    },
}

/// HostBus that remembers every emit/publish before handing it to a LocalBus
#[derive(Default)]
pub struct RecordingBus {
    pub inner: LocalBus,
    calls: Mutex<Vec<BusCall>>,
}

impl RecordingBus {
    pub fn calls(&self) -> Vec<BusCall> {
        self.calls.lock().clone()
    }
}

impl HostBus for RecordingBus {
    fn emit(
        &self,
        message: &str,
        data: Option<Payload>,
        scope: Option<Scope>,
        callback: Option<Callback>,
        worker: Option<WorkerRef>,
    ) -> Result<u64> {
        self.calls.lock().push(BusCall::Emit {
            message: message.to_string(),
            data: data.clone(),
            scope: scope.clone(),
            has_callback: callback.is_some(),
            worker: worker.clone(),
        });
        self.inner.emit(message, data, scope, callback, worker)
    }

    fn on(&self, message: &str, listener: Listener) -> Result<()> {
        self.inner.on(message, listener)
    }

    fn publish(
        &self,
        message: &str,
        data: Option<Payload>,
        scope: Option<Scope>,
        is_published: bool,
    ) -> Result<u64> {
        self.calls.lock().push(BusCall::Publish {
            message: message.to_string(),
            data: data.clone(),
            scope: scope.clone(),
            is_published,
        });
        self.inner.publish(message, data, scope, is_published)
    }

    fn history(&self) -> &dyn HistorySink {
        self.inner.history()
    }
}
