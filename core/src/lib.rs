// Crosstalk Core Library
// Per-worker messaging context over a shared event bus

pub mod bus;
pub mod callback;
pub mod config;
pub mod context;
pub mod envelope;
pub mod history;
pub mod log;
pub mod proxy;
pub mod scope;
pub mod telemetry;

// Export core types
pub use bus::{HostBus, Inbound, Listener, LocalBus};
pub use callback::{Callback, Handler, HandlerError, HandlerResult};
pub use config::ContextOptions;
pub use context::{Context, ContextBuilder, Dispatch};
pub use envelope::{Arg, Envelope, Listen, Payload, WorkerRef};
pub use history::{ChannelKind, Direction, HistoryRecord, HistorySink, MemoryHistory};
pub use log::{EventLog, Severity, TracingLog};
pub use proxy::{ChannelFabric, ProxiedMessage, ProxyRouter, ProxyRules, RemoteFabric, Route};
pub use scope::{Scope, ScopeAuthorizer, ScopeMatch, ScopeToken};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrosstalkError {
    #[error("'data', if provided, must be an object (got {0})")]
    InvalidDataError(String),

    #[error(
        "Cannot proxy object capability security (can't send '{0}' to the remote fabric \
         while it is addressed to a local worker reference)"
    )]
    CapabilityProxyConflictError(String),

    #[error("No handler provided for listener on '{0}'")]
    MissingHandlerError(String),

    #[error("Invalid proxy rule '{pattern}': {source}")]
    ProxyRuleError {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Fabric error: {0}")]
    FabricError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
pub type Result<T> = std::result::Result<T, CrosstalkError>;
