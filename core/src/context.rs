//! The worker context: the only surface a worker talks to.
//!
//! A [`Context`] is built once per worker activation over a [`HostBus`] and an
//! immutable [`ContextOptions`]. It offers four operations:
//!
//! - [`Context::emit`]: directed send, optionally proxied to a remote fabric
//! - [`Context::on`]: listen for directed sends
//! - [`Context::publish`]: broadcast, no callbacks and no proxying
//! - [`Context::subscribe`]: listen for broadcasts
//!
//! For every message the order is fixed: history first, then the log entry,
//! then delivery (or forwarding, or the handler call).

use serde::Serialize;
use serde_json::{json, Value};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

use crate::bus::{HostBus, Inbound};
use crate::callback::Handler;
use crate::config::ContextOptions;
use crate::envelope::{Envelope, Listen, Payload};
use crate::history::{ChannelKind, HistoryRecord, HistorySink};
use crate::log::{tags, vm_error_message, worker_name, EventLog, TracingLog};
use crate::proxy::{ProxyRouter, ProxyRules, RemoteFabric, Route};
use crate::scope::{Scope, ScopeAuthorizer, ScopeMatch};
use crate::telemetry::instrument_callback;
use crate::{CrosstalkError, Result};

const SELF_SCOPE: &str = "not provided (self)";

/// Outcome of [`Context::emit`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Dispatch {
    /// Delivered on the host bus to this many listeners.
    Local { delivered: u64 },
    /// Forwarded to the remote fabric, carrying its result.
    Proxied(Value),
}

struct Inner {
    bus: Arc<dyn HostBus>,
    options: Arc<ContextOptions>,
    authorizer: Arc<dyn ScopeAuthorizer>,
    log: Arc<dyn EventLog>,
    proxy: Option<ProxyRouter>,
}

/// Per-worker messaging facade.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Context {
    pub fn new(bus: Arc<dyn HostBus>, options: ContextOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                bus,
                options: Arc::new(options),
                authorizer: Arc::new(ScopeMatch),
                log: Arc::new(TracingLog),
                proxy: None,
            }),
        }
    }

    pub fn builder(bus: Arc<dyn HostBus>, options: ContextOptions) -> ContextBuilder {
        ContextBuilder {
            bus,
            options,
            authorizer: Arc::new(ScopeMatch),
            log: Arc::new(TracingLog),
            proxy: None,
        }
    }

    pub fn options(&self) -> &ContextOptions {
        &self.inner.options
    }

    /// Directed send.
    ///
    /// Fails without side effects when `data` is not a mapping. A message that
    /// matches a proxy rule goes to the remote fabric instead of the bus, and
    /// fails with [`CrosstalkError::CapabilityProxyConflictError`] if it is also
    /// addressed through a worker reference.
    pub fn emit(&self, envelope: Envelope) -> Result<Dispatch> {
        let inner = &self.inner;
        let data = envelope.payload()?;
        let Envelope {
            worker,
            message,
            scope,
            callback,
            ..
        } = envelope;

        let callback = callback.map(|original| {
            instrument_callback(
                Arc::clone(&inner.bus),
                Arc::clone(&inner.log),
                Arc::clone(&inner.options),
                message.clone(),
                scope.clone(),
                original,
            )
        });

        inner.bus.history().record(HistoryRecord::outbound(
            message.as_str(),
            data.clone().map(Value::Object),
            scope.clone(),
            callback.is_some(),
            Some(ChannelKind::Direct),
            worker.clone(),
        ));
        if !inner.options.silent {
            inner.log.log(
                tags::EMIT,
                &json!({
                    "workerName": worker_name(&inner.options),
                    "message": message,
                    "data": data,
                    "scope": scope,
                }),
            );
        }

        if let Some(router) = &inner.proxy {
            if router.route(&message, worker.as_ref())? == Route::Remote {
                let receipt = router.forward(
                    inner.options.proxy_token_or_empty(),
                    &message,
                    data,
                    scope,
                    callback,
                )?;
                return Ok(Dispatch::Proxied(receipt));
            }
        }

        let delivered = inner.bus.emit(&message, data, scope, callback, worker)?;
        Ok(Dispatch::Local { delivered })
    }

    /// Listen for directed sends of `listen.message`.
    pub fn on(&self, listen: Listen) -> Result<()> {
        self.register(listen, ChannelKind::Direct)
    }

    /// Broadcast to every subscriber. Publishing carries no callback, so it is
    /// never proxied.
    pub fn publish(
        &self,
        message: &str,
        data: Option<Value>,
        scope: Option<Scope>,
    ) -> Result<u64> {
        let inner = &self.inner;
        let mut envelope = Envelope::send(message);
        envelope.data = data;
        let data = envelope.payload()?;

        inner.bus.history().record(HistoryRecord::outbound(
            message,
            data.clone().map(Value::Object),
            scope.clone(),
            false,
            Some(ChannelKind::PubSub),
            None,
        ));
        if !inner.options.silent {
            inner.log.log(
                tags::PUBLISH,
                &json!({
                    "workerName": worker_name(&inner.options),
                    "message": message,
                    "data": data,
                    "scope": scope,
                }),
            );
        }

        inner.bus.publish(message, data, scope, true)
    }

    /// Listen for broadcasts of `listen.message`.
    pub fn subscribe(&self, listen: Listen) -> Result<()> {
        self.register(listen, ChannelKind::PubSub)
    }

    fn register(&self, listen: Listen, channel: ChannelKind) -> Result<()> {
        let Listen {
            worker,
            message,
            scope,
            handler,
        } = listen;
        let handler = handler.ok_or_else(|| CrosstalkError::MissingHandlerError(message.clone()))?;
        debug!(
            target: "crosstalk",
            message = %message,
            via = ?worker,
            ?channel,
            "Registering listener"
        );

        // The bus owns the listener, so the listener must not own the bus.
        let trampoline = Trampoline {
            bus: Arc::downgrade(&self.inner.bus),
            options: Arc::clone(&self.inner.options),
            authorizer: Arc::clone(&self.inner.authorizer),
            log: Arc::clone(&self.inner.log),
        };
        let name = message.clone();
        self.inner.bus.on(
            &message,
            Arc::new(move |inbound: Inbound| {
                trampoline.receive(&name, scope.as_ref(), &handler, channel, inbound)
            }),
        )
    }
}

/// Receive-side state captured by each registered listener.
struct Trampoline {
    bus: Weak<dyn HostBus>,
    options: Arc<ContextOptions>,
    authorizer: Arc<dyn ScopeAuthorizer>,
    log: Arc<dyn EventLog>,
}

impl Trampoline {
    /// Run by the bus for every inbound delivery.
    fn receive(
        &self,
        message: &str,
        accepted: Option<&Scope>,
        handler: &Handler,
        channel: ChannelKind,
        inbound: Inbound,
    ) {
        let Inbound {
            data,
            scope: emitted,
            callback,
            worker,
        } = inbound;

        let Some(bus) = self.bus.upgrade() else {
            warn!(target: "crosstalk", message = %message, "Delivery after the bus was dropped");
            return;
        };
        bus.history().record(HistoryRecord::inbound(
            message,
            data.clone().map(Value::Object),
            accepted.cloned(),
            emitted.clone(),
            Some(channel),
            worker,
        ));

        if !self.authorizer.is_authorized(accepted, emitted.as_ref()) {
            self.log_delivery_failure(message, data.as_ref(), accepted, emitted.as_ref());
            return;
        }

        if !self.options.silent {
            let tag = match channel {
                ChannelKind::Direct => tags::ON,
                ChannelKind::PubSub => tags::SUBSCRIPTION,
            };
            self.log.log(
                tag,
                &json!({
                    "workerName": worker_name(&self.options),
                    "message": message,
                    "data": data,
                }),
            );
        }

        // Handler failures stay here; the bus keeps delivering.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.call(data, callback)));
        let failure = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(panic) => panic_message(panic.as_ref()),
        };
        self.log.error(
            &vm_error_message(&failure, &self.options.worker_path),
            &json!({
                "workerName": worker_name(&self.options),
                "message": message,
                "error": failure,
            }),
        );
    }

    fn log_delivery_failure(
        &self,
        message: &str,
        data: Option<&Payload>,
        accepted: Option<&Scope>,
        emitted: Option<&Scope>,
    ) {
        let describe = |scope: Option<&Scope>| {
            scope
                .map(|s| s.to_string())
                .unwrap_or_else(|| SELF_SCOPE.to_string())
        };
        // Logged regardless of `silent`
        self.log.log(
            tags::NOT_AUTHORIZED,
            &json!({
                "workerName": worker_name(&self.options),
                "acceptsScope": describe(accepted),
                "emittedScope": describe(emitted),
                "message": message,
                "data": data,
            }),
        );
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

/// Assembles a [`Context`] with non-default collaborators.
pub struct ContextBuilder {
    bus: Arc<dyn HostBus>,
    options: ContextOptions,
    authorizer: Arc<dyn ScopeAuthorizer>,
    log: Arc<dyn EventLog>,
    proxy: Option<ProxyRouter>,
}

impl ContextBuilder {
    pub fn authorizer(mut self, authorizer: Arc<dyn ScopeAuthorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub fn log(mut self, log: Arc<dyn EventLog>) -> Self {
        self.log = log;
        self
    }

    /// Forward messages matching `rules` to `fabric`. Empty rules leave
    /// every send local.
    pub fn proxy(mut self, rules: ProxyRules, fabric: Arc<dyn RemoteFabric>) -> Self {
        self.proxy = if rules.is_empty() {
            None
        } else {
            Some(ProxyRouter::new(rules, fabric))
        };
        self
    }

    pub fn build(self) -> Context {
        Context {
            inner: Arc::new(Inner {
                bus: self.bus,
                options: Arc::new(self.options),
                authorizer: self.authorizer,
                log: self.log,
                proxy: self.proxy,
            }),
        }
    }
}
