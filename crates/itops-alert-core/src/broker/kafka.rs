// ── Kafka topic ──
//
// SASL/PLAIN producer and consumer. Auto-commit is disabled; offsets are
// committed after the ingest loop has finished with a message.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{ClientConfig, Message, Offset, TopicPartitionList};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use super::{Broker, BrokerMessage, Subscription};
use crate::error::CoreError;

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings for the raw-event topic.
#[derive(Debug, Clone)]
pub struct KafkaSettings {
    pub bootstrap_servers: String,
    pub topic: String,
    pub consumer_group: String,
    pub username: String,
    pub password: SecretString,
    /// SASL mechanism, `PLAIN` unless configured otherwise.
    pub mechanism: String,
}

impl KafkaSettings {
    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.bootstrap_servers);
        if !self.username.is_empty() {
            config
                .set("security.protocol", "SASL_PLAINTEXT")
                .set("sasl.mechanism", &self.mechanism)
                .set("sasl.username", &self.username)
                .set("sasl.password", self.password.expose_secret());
        }
        config
    }
}

pub struct KafkaBroker {
    settings: KafkaSettings,
    producer: FutureProducer,
}

impl KafkaBroker {
    pub fn new(settings: KafkaSettings) -> Result<Self, CoreError> {
        let producer: FutureProducer = settings
            .client_config()
            .set("message.timeout.ms", "30000")
            .create()
            .map_err(|e| CoreError::Config {
                message: format!("kafka producer: {e}"),
            })?;
        Ok(Self { settings, producer })
    }
}

impl std::fmt::Debug for KafkaBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaBroker")
            .field("topic", &self.settings.topic)
            .field("consumer_group", &self.settings.consumer_group)
            .finish_non_exhaustive()
    }
}

fn io_error(err: &KafkaError) -> CoreError {
    CoreError::TransientIo {
        message: format!("kafka: {err}"),
    }
}

#[async_trait]
impl Broker for KafkaBroker {
    async fn publish(&self, key: &str, payload: Bytes) -> Result<(), CoreError> {
        let record = FutureRecord::to(&self.settings.topic)
            .key(key)
            .payload(payload.as_ref());
        let (partition, offset) = self
            .producer
            .send(record, SEND_TIMEOUT)
            .await
            .map_err(|(e, _)| io_error(&e))?;
        debug!(partition, offset, "raw event published");
        Ok(())
    }

    async fn subscribe(&self) -> Result<Box<dyn Subscription>, CoreError> {
        let consumer: StreamConsumer = self
            .settings
            .client_config()
            .set("group.id", &self.settings.consumer_group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|e| CoreError::Config {
                message: format!("kafka consumer: {e}"),
            })?;
        consumer
            .subscribe(&[self.settings.topic.as_str()])
            .map_err(|e| io_error(&e))?;
        Ok(Box::new(KafkaSubscription {
            consumer,
            topic: self.settings.topic.clone(),
        }))
    }
}

struct KafkaSubscription {
    consumer: StreamConsumer,
    topic: String,
}

#[async_trait]
impl Subscription for KafkaSubscription {
    async fn next(&mut self) -> Option<Result<BrokerMessage, CoreError>> {
        let result = match self.consumer.recv().await {
            Ok(msg) => Ok(BrokerMessage {
                key: msg
                    .key()
                    .map(|k| String::from_utf8_lossy(k).into_owned())
                    .unwrap_or_default(),
                payload: msg.payload().map(Bytes::copy_from_slice).unwrap_or_default(),
                partition: msg.partition(),
                offset: msg.offset(),
            }),
            Err(e) => Err(io_error(&e)),
        };
        Some(result)
    }

    async fn commit(&mut self, message: &BrokerMessage) -> Result<(), CoreError> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(
                &self.topic,
                message.partition,
                Offset::Offset(message.offset + 1),
            )
            .map_err(|e| io_error(&e))?;
        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(|e| io_error(&e))
    }
}
