// ── Correlation runtime ──
//
// Wires the directory cache, ingest consumer, fault engine and problem
// engine together and runs them under one cancellation token.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::broker::Broker;
use crate::command::ProblemHandle;
use crate::directory::DirectoryCache;
use crate::error::CoreError;
use crate::fault::{FaultEngine, FaultEngineConfig, ProblemHandler};
use crate::idgen::IdGenerator;
use crate::ingest::{IngestConsumer, RetryPolicy};
use crate::normalize::{EntityResolver, Normalizer, SourceKind};
use crate::problem::{ProblemEngine, ProblemEngineConfig};
use crate::store::Repositories;

/// Tuning for the correlation pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationConfig {
    pub default_source: SourceKind,
    pub fault: FaultEngineConfig,
    pub problem: ProblemEngineConfig,
    pub retry: RetryPolicy,
    /// Period of the fault expiration sweep.
    pub fault_sweep_interval: Duration,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            default_source: SourceKind::ZabbixWebhook,
            fault: FaultEngineConfig::default(),
            problem: ProblemEngineConfig::default(),
            retry: RetryPolicy::default(),
            fault_sweep_interval: Duration::from_secs(60),
        }
    }
}

pub struct Correlation {
    cache: Arc<DirectoryCache>,
    broker: Arc<dyn Broker>,
    ingest: IngestConsumer,
    problems: Arc<ProblemEngine>,
}

impl Correlation {
    pub fn new(
        repos: Repositories,
        cache: Arc<DirectoryCache>,
        broker: Arc<dyn Broker>,
        ids: Arc<IdGenerator>,
        config: &CorrelationConfig,
    ) -> Self {
        let problems = Arc::new(ProblemEngine::new(
            repos.clone(),
            Arc::clone(&ids),
            Arc::clone(cache.directory()),
            config.problem,
        ));
        let handler: Arc<dyn ProblemHandler> = Arc::new(problems.handle());
        let faults = Arc::new(FaultEngine::new(
            repos.clone(),
            Arc::clone(&ids),
            handler,
            config.fault,
        ));
        let resolver: Arc<dyn EntityResolver> = cache.clone();
        let normalizer = Arc::new(Normalizer::new(
            resolver,
            ids,
            config.default_source,
        ));
        let ingest = IngestConsumer::new(normalizer, Arc::clone(&repos.raw_events), faults.clone())
            .with_retry(config.retry)
            .with_fault_sweep(faults, config.fault_sweep_interval);

        Self {
            cache,
            broker,
            ingest,
            problems,
        }
    }

    /// Command handle for the HTTP API and RCA dispatcher.
    pub fn problems(&self) -> ProblemHandle {
        self.problems.handle()
    }

    /// Warm the directory, then consume until cancelled. The first
    /// failing subsystem cancels the others.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), CoreError> {
        match self.cache.warmup().await {
            Ok(stats) => info!(entries = stats.entries, "directory cache warmed up"),
            Err(e) => warn!(
                error = %e,
                "initial directory warmup failed, retrying on next refresh"
            ),
        }
        let subscription = self.broker.subscribe().await?;

        let refresh = Arc::clone(&self.cache).refresh(cancel.clone());
        let problems = {
            let cancel = cancel.clone();
            let engine = Arc::clone(&self.problems);
            async move {
                let result = engine.run(cancel.clone()).await;
                cancel.cancel();
                result
            }
        };
        let ingest = async {
            let result = self.ingest.run(subscription, cancel.clone()).await;
            cancel.cancel();
            result
        };

        info!("correlation started");
        let ((), problems, ingest) = tokio::join!(refresh, problems, ingest);
        info!("correlation stopped");
        problems.and(ingest)
    }
}

impl std::fmt::Debug for Correlation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlation")
            .field("ingest", &self.ingest)
            .field("problems", &self.problems)
            .finish_non_exhaustive()
    }
}
