// Proxy routing: forwarding matching messages to a remote fabric
use crate::callback::Callback;
use crate::envelope::{Payload, WorkerRef};
use crate::scope::Scope;
use crate::{CrosstalkError, Result};
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Where a directed send goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Route {
    Local,
    Remote,
}

/// Message-name patterns eligible for remote forwarding.
#[derive(Debug, Clone, Default)]
pub struct ProxyRules {
    patterns: Vec<Regex>,
}

impl ProxyRules {
    /// No forwarding at all.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn single(pattern: &str) -> Result<Self> {
        Ok(Self {
            patterns: vec![compile(pattern)?],
        })
    }

    /// Any of `patterns` makes a message eligible.
    pub fn any<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| compile(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches(&self, message: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(message))
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| CrosstalkError::ProxyRuleError {
        pattern: pattern.to_string(),
        source,
    })
}

/// External messaging fabric that proxied messages are handed to.
#[cfg_attr(test, mockall::automock)]
pub trait RemoteFabric: Send + Sync {
    /// Forward one message; the returned value stands in for local delivery.
    fn send(
        &self,
        token: &str,
        message: &str,
        data: Option<Payload>,
        scope: Option<Scope>,
        callback: Option<Callback>,
    ) -> Result<Value>;
}

/// A message waiting to leave through [`ChannelFabric`].
#[derive(Debug)]
pub struct ProxiedMessage {
    pub token: String,
    pub message: String,
    pub data: Option<Payload>,
    pub scope: Option<Scope>,
    pub callback: Option<Callback>,
}

/// Fabric that queues proxied messages for a forwarder task to ship.
#[derive(Debug, Clone)]
pub struct ChannelFabric {
    tx: mpsc::UnboundedSender<ProxiedMessage>,
}

impl ChannelFabric {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProxiedMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RemoteFabric for ChannelFabric {
    fn send(
        &self,
        token: &str,
        message: &str,
        data: Option<Payload>,
        scope: Option<Scope>,
        callback: Option<Callback>,
    ) -> Result<Value> {
        self.tx
            .send(ProxiedMessage {
                token: token.to_string(),
                message: message.to_string(),
                data,
                scope,
                callback,
            })
            .map_err(|_| CrosstalkError::FabricError("forwarder is gone".to_string()))?;
        debug!("Queued {} for the remote fabric", message);
        Ok(json!({ "queued": true, "message": message, "token": token }))
    }
}

/// Decides local vs. remote delivery for directed sends.
#[derive(Clone)]
pub struct ProxyRouter {
    rules: ProxyRules,
    fabric: Arc<dyn RemoteFabric>,
}

impl ProxyRouter {
    pub fn new(rules: ProxyRules, fabric: Arc<dyn RemoteFabric>) -> Self {
        info!("Proxy router configured with {} rules", rules.patterns.len());
        Self { rules, fabric }
    }

    /// Route for `message`, or a conflict error when a capability-addressed
    /// message matches a rule.
    pub fn route(&self, message: &str, worker: Option<&WorkerRef>) -> Result<Route> {
        if message.is_empty() || !self.rules.matches(message) {
            return Ok(Route::Local);
        }
        if worker.is_some() {
            return Err(CrosstalkError::CapabilityProxyConflictError(message.to_string()));
        }
        Ok(Route::Remote)
    }

    pub fn forward(
        &self,
        token: &str,
        message: &str,
        data: Option<Payload>,
        scope: Option<Scope>,
        callback: Option<Callback>,
    ) -> Result<Value> {
        debug!("Forwarding {} to the remote fabric", message);
        self.fabric.send(token, message, data, scope, callback)
    }
}
