// ── Raw-event broker ──
//
// Ordered topic between the HTTP ingest endpoint and the ingest
// consumer. Offsets are committed explicitly once a message has been
// handled or skipped.

#[cfg(feature = "kafka")]
mod kafka;
mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::CoreError;

#[cfg(feature = "kafka")]
pub use kafka::{KafkaBroker, KafkaSettings};
pub use memory::MemoryBroker;

pub const RAW_EVENT_TOPIC: &str = "itops_alert_raw_event";

/// One delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub key: String,
    pub payload: Bytes,
    pub partition: i32,
    pub offset: i64,
}

#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, key: &str, payload: Bytes) -> Result<(), CoreError>;

    /// Join the consumer group. Messages arrive in offset order.
    async fn subscribe(&self) -> Result<Box<dyn Subscription>, CoreError>;
}

#[async_trait]
pub trait Subscription: Send {
    /// Next message, or `None` once the topic is closed.
    async fn next(&mut self) -> Option<Result<BrokerMessage, CoreError>>;

    /// Mark `message` and everything before it on its partition as consumed.
    async fn commit(&mut self, message: &BrokerMessage) -> Result<(), CoreError>;
}

/// Message key for an accepted webhook: the receive time in nanoseconds.
pub fn timestamp_key(now: DateTime<Utc>) -> String {
    now.timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1000))
        .to_string()
}
