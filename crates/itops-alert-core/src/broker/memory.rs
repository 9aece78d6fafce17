// ── In-process topic ──

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use super::{Broker, BrokerMessage, Subscription};
use crate::error::CoreError;

const DEFAULT_CAPACITY: usize = 1024;

/// Single-partition topic backed by a bounded channel. Publishing waits
/// when the consumer falls `capacity` messages behind.
pub struct MemoryBroker {
    tx: mpsc::Sender<BrokerMessage>,
    rx: Mutex<Option<mpsc::Receiver<BrokerMessage>>>,
    next_offset: AtomicI64,
    committed: Arc<AtomicI64>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            next_offset: AtomicI64::new(0),
            committed: Arc::new(AtomicI64::new(-1)),
        }
    }

    /// Highest committed offset, `-1` before the first commit.
    pub fn committed_offset(&self) -> i64 {
        self.committed.load(Ordering::Acquire)
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBroker")
            .field("next_offset", &self.next_offset.load(Ordering::Relaxed))
            .field("committed", &self.committed_offset())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, key: &str, payload: Bytes) -> Result<(), CoreError> {
        // Reserve the slot first so offsets follow channel order.
        let permit = self.tx.reserve().await.map_err(|_| CoreError::PermanentIo {
            message: "raw event topic is closed".into(),
        })?;
        let offset = self.next_offset.fetch_add(1, Ordering::AcqRel);
        permit.send(BrokerMessage {
            key: key.to_owned(),
            payload,
            partition: 0,
            offset,
        });
        Ok(())
    }

    async fn subscribe(&self) -> Result<Box<dyn Subscription>, CoreError> {
        let rx = self
            .rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| CoreError::precondition("raw event topic already has a consumer"))?;
        Ok(Box::new(MemorySubscription {
            rx,
            committed: Arc::clone(&self.committed),
        }))
    }
}

struct MemorySubscription {
    rx: mpsc::Receiver<BrokerMessage>,
    committed: Arc<AtomicI64>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next(&mut self) -> Option<Result<BrokerMessage, CoreError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn commit(&mut self, message: &BrokerMessage) -> Result<(), CoreError> {
        self.committed.fetch_max(message.offset, Ordering::AcqRel);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_in_order_with_offsets() {
        let broker = MemoryBroker::new();
        broker.publish("a", Bytes::from_static(b"1")).await.unwrap();
        broker.publish("b", Bytes::from_static(b"2")).await.unwrap();

        let mut sub = broker.subscribe().await.unwrap();
        let first = sub.next().await.unwrap().unwrap();
        let second = sub.next().await.unwrap().unwrap();
        assert_eq!((first.key.as_str(), first.offset), ("a", 0));
        assert_eq!((second.key.as_str(), second.offset), ("b", 1));

        assert_eq!(broker.committed_offset(), -1);
        sub.commit(&second).await.unwrap();
        sub.commit(&first).await.unwrap();
        assert_eq!(broker.committed_offset(), 1);
    }

    #[tokio::test]
    async fn single_consumer_only() {
        let broker = MemoryBroker::new();
        let _sub = broker.subscribe().await.unwrap();
        assert!(matches!(
            broker.subscribe().await,
            Err(CoreError::PreconditionViolated { .. })
        ));
    }
}
