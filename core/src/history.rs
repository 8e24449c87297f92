//! History records: the audit trail of every send, receive and callback.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

use crate::envelope::WorkerRef;
use crate::scope::Scope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

/// Delivery path a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Direct,
    #[serde(rename = "pubsub")]
    PubSub,
}

/// One audit entry.
///
/// Outbound records carry the sender's scope in `scope`; inbound records carry
/// the listener's accepted scope in `scope` and the sender's in `emitted_scope`.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryRecord {
    pub direction: Direction,
    pub message: String,
    pub data: Option<Value>,
    pub scope: Option<Scope>,
    pub emitted_scope: Option<Scope>,
    pub has_callback: bool,
    pub channel: Option<ChannelKind>,
    pub worker: Option<WorkerRef>,
    pub recorded_at: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn outbound(
        message: impl Into<String>,
        data: Option<Value>,
        scope: Option<Scope>,
        has_callback: bool,
        channel: Option<ChannelKind>,
        worker: Option<WorkerRef>,
    ) -> Self {
        Self {
            direction: Direction::Out,
            message: message.into(),
            data,
            scope,
            emitted_scope: None,
            has_callback,
            channel,
            worker,
            recorded_at: Utc::now(),
        }
    }

    pub fn inbound(
        message: impl Into<String>,
        data: Option<Value>,
        accepted_scope: Option<Scope>,
        emitted_scope: Option<Scope>,
        channel: Option<ChannelKind>,
        worker: Option<WorkerRef>,
    ) -> Self {
        Self {
            direction: Direction::In,
            message: message.into(),
            data,
            scope: accepted_scope,
            emitted_scope,
            has_callback: false,
            channel,
            worker,
            recorded_at: Utc::now(),
        }
    }
}

/// Append-only destination for history records. Owned by the host bus.
pub trait HistorySink: Send + Sync {
    fn record(&self, record: HistoryRecord);
}

/// History kept in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    records: RwLock<Vec<HistoryRecord>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<HistoryRecord> {
        self.records.read().clone()
    }

    /// Records whose message name equals `message`.
    pub fn for_message(&self, message: &str) -> Vec<HistoryRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| r.message == message)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn clear(&self) {
        self.records.write().clear();
    }
}

impl HistorySink for MemoryHistory {
    fn record(&self, record: HistoryRecord) {
        self.records.write().push(record);
    }
}
