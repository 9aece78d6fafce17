// ── Ingest consumer ──
//
// Reads the raw-event topic in offset order. Each message is normalized
// once, then persisted and handed to the fault engine under a bounded
// retry. The offset is committed after success or after the message has
// been given up on, so one poison message cannot stall the partition.
// The fault expiration sweep shares this loop, so fault points are only
// ever written from one task.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::broker::{BrokerMessage, Subscription};
use crate::error::CoreError;
use crate::fault::FaultEngine;
use crate::model::RawEvent;
use crate::normalize::Normalizer;
use crate::store::RawEventRepository;

/// Downstream of ingest; implemented by the fault engine.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: &RawEvent) -> Result<(), CoreError>;
}

// ── Retry policy ─────────────────────────────────────────────────────

/// Exponential backoff with proportional jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
    /// Fraction of the delay added or removed at random (`0.1` = ±10 %).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Un-jittered delay after the `attempt`-th failure (1-based).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter <= 0.0 {
            return base;
        }
        let scale = rand::thread_rng().gen_range((1.0 - self.jitter)..=(1.0 + self.jitter));
        base.mul_f64(scale)
    }
}

/// What became of one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Handled { event_id: u64 },
    Skipped,
}

// ── Consumer ─────────────────────────────────────────────────────────

pub struct IngestConsumer {
    normalizer: Arc<Normalizer>,
    raw_events: Arc<dyn RawEventRepository>,
    handler: Arc<dyn EventHandler>,
    retry: RetryPolicy,
    sweep: Option<(Arc<FaultEngine>, Duration)>,
}

impl IngestConsumer {
    pub fn new(
        normalizer: Arc<Normalizer>,
        raw_events: Arc<dyn RawEventRepository>,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        Self {
            normalizer,
            raw_events,
            handler,
            retry: RetryPolicy::default(),
            sweep: None,
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run the fault expiration sweep every `interval` between messages.
    #[must_use]
    pub fn with_fault_sweep(mut self, engine: Arc<FaultEngine>, interval: Duration) -> Self {
        self.sweep = Some((engine, interval));
        self
    }

    /// Normalize, persist and correlate one payload.
    ///
    /// Returns `Err` only for cancellation; every other failure ends in
    /// [`Outcome::Skipped`] after logging.
    pub async fn process(
        &self,
        payload: &[u8],
        cancel: &CancellationToken,
    ) -> Result<Outcome, CoreError> {
        let event = match self.normalizer.normalize(payload, Utc::now()).await {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "dropping unparseable raw event");
                return Ok(Outcome::Skipped);
            }
        };
        let event_id = event.event_id;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.persist_and_handle(&event).await {
                Ok(()) => return Ok(Outcome::Handled { event_id }),
                Err(CoreError::Cancelled) => return Err(CoreError::Cancelled),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay(attempt);
                    warn!(event_id, attempt, ?delay, error = %e, "raw event failed, retrying");
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Err(CoreError::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    error!(event_id, attempt, error = %e, "giving up on raw event");
                    return Ok(Outcome::Skipped);
                }
            }
        }
    }

    async fn persist_and_handle(&self, event: &RawEvent) -> Result<(), CoreError> {
        self.raw_events.upsert(event).await?;
        self.handler.handle_event(event).await
    }

    /// Handle one delivered message and commit its offset.
    pub async fn consume(
        &self,
        subscription: &mut dyn Subscription,
        message: &BrokerMessage,
        cancel: &CancellationToken,
    ) -> Result<Outcome, CoreError> {
        let outcome = self.process(&message.payload, cancel).await?;
        debug!(offset = message.offset, key = %message.key, ?outcome, "raw event consumed");
        subscription.commit(message).await?;
        Ok(outcome)
    }

    /// Consume until cancelled or the topic closes.
    pub async fn run(
        &self,
        mut subscription: Box<dyn Subscription>,
        cancel: CancellationToken,
    ) -> Result<(), CoreError> {
        let period = self.sweep.as_ref().map_or(Duration::from_secs(60), |(_, every)| *every);
        let mut sweep_tick = tokio::time::interval(period);
        sweep_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        sweep_tick.tick().await; // consume the immediate first tick

        info!("ingest consumer started");
        let mut receive_failures = 0u32;
        loop {
            let message = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = sweep_tick.tick(), if self.sweep.is_some() => {
                    if let Some((engine, _)) = &self.sweep {
                        if let Err(e) = engine.sweep().await {
                            warn!(error = %e, "fault expiration sweep failed");
                        }
                    }
                    continue;
                }
                next = subscription.next() => match next {
                    Some(Ok(message)) => {
                        receive_failures = 0;
                        message
                    }
                    Some(Err(e)) => {
                        receive_failures = receive_failures.saturating_add(1);
                        let delay = self.retry.delay(receive_failures);
                        warn!(
                            attempt = receive_failures,
                            ?delay,
                            error = %e,
                            "broker receive failed"
                        );
                        tokio::select! {
                            biased;
                            () = cancel.cancelled() => break,
                            () = tokio::time::sleep(delay) => {}
                        }
                        continue;
                    }
                    None => break,
                },
            };
            match self.consume(subscription.as_mut(), &message, &cancel).await {
                Ok(_) => {}
                Err(CoreError::Cancelled) => break,
                Err(e) => warn!(offset = message.offset, error = %e, "offset commit failed"),
            }
        }
        info!("ingest consumer stopped");
        Ok(())
    }
}

impl std::fmt::Debug for IngestConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestConsumer")
            .field("retry", &self.retry)
            .field("sweep_interval", &self.sweep.as_ref().map(|(_, every)| *every))
            .finish_non_exhaustive()
    }
}
