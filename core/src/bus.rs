// Host bus contract and in-memory implementation
use crate::callback::Callback;
use crate::envelope::{Payload, WorkerRef};
use crate::history::{HistorySink, MemoryHistory};
use crate::scope::Scope;
use crate::Result;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// What the bus hands a registered listener for one delivery.
#[derive(Debug, Clone, Default)]
pub struct Inbound {
    pub data: Option<Payload>,
    /// Scope the sender declared.
    pub scope: Option<Scope>,
    pub callback: Option<Callback>,
    pub worker: Option<WorkerRef>,
}

/// Listener trampoline registered with the bus.
pub type Listener = Arc<dyn Fn(Inbound) + Send + Sync>;

/// Shared event bus a worker context sits on.
///
/// The bus owns all mutable messaging state: listener tables and history.
/// Implementations decide how listeners are matched to message names.
pub trait HostBus: Send + Sync {
    /// Directed send. Returns how many listeners were reached.
    fn emit(
        &self,
        message: &str,
        data: Option<Payload>,
        scope: Option<Scope>,
        callback: Option<Callback>,
        worker: Option<WorkerRef>,
    ) -> Result<u64>;

    fn on(&self, message: &str, listener: Listener) -> Result<()>;

    /// Broadcast send. `is_published` marks messages coming from `publish`
    /// rather than from a directed send.
    fn publish(
        &self,
        message: &str,
        data: Option<Payload>,
        scope: Option<Scope>,
        is_published: bool,
    ) -> Result<u64>;

    fn history(&self) -> &dyn HistorySink;
}

/// Single-process bus: every listener registered under a message name
/// receives every emit or publish of that name.
pub struct LocalBus {
    // Message name -> listeners, in registration order
    listeners: DashMap<String, Vec<Listener>>,
    history: Arc<MemoryHistory>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::with_history(Arc::new(MemoryHistory::new()))
    }

    pub fn with_history(history: Arc<MemoryHistory>) -> Self {
        info!("Local bus created");
        Self {
            listeners: DashMap::new(),
            history,
        }
    }

    /// Handle on the recorded history.
    pub fn records(&self) -> Arc<MemoryHistory> {
        Arc::clone(&self.history)
    }

    pub fn listener_count(&self, message: &str) -> usize {
        self.listeners.get(message).map(|l| l.len()).unwrap_or(0)
    }

    fn deliver(&self, message: &str, inbound: Inbound) -> u64 {
        // Clone the list out so listeners can call back into the bus
        let targets: Vec<Listener> = match self.listeners.get(message) {
            Some(entry) => entry.value().clone(),
            None => {
                debug!("No listeners for message: {}", message);
                return 0;
            }
        };

        for listener in &targets {
            listener(inbound.clone());
        }
        targets.len() as u64
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl HostBus for LocalBus {
    fn emit(
        &self,
        message: &str,
        data: Option<Payload>,
        scope: Option<Scope>,
        callback: Option<Callback>,
        worker: Option<WorkerRef>,
    ) -> Result<u64> {
        let delivered = self.deliver(
            message,
            Inbound {
                data,
                scope,
                callback,
                worker,
            },
        );
        debug!("Emitted {} to {} listeners", message, delivered);
        Ok(delivered)
    }

    fn on(&self, message: &str, listener: Listener) -> Result<()> {
        self.listeners
            .entry(message.to_string())
            .or_insert_with(Vec::new)
            .push(listener);
        debug!("Registered listener for {}", message);
        Ok(())
    }

    fn publish(
        &self,
        message: &str,
        data: Option<Payload>,
        scope: Option<Scope>,
        is_published: bool,
    ) -> Result<u64> {
        let delivered = self.deliver(
            message,
            Inbound {
                data,
                scope,
                ..Default::default()
            },
        );
        debug!(
            "Published {} to {} listeners (published: {})",
            message, delivered, is_published
        );
        Ok(delivered)
    }

    fn history(&self) -> &dyn HistorySink {
        self.history.as_ref()
    }
}
