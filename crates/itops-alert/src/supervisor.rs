// ── Supervisor ──
//
// Builds every subsystem from the loaded config and runs the HTTP API,
// correlation, RCA dispatch and config reload under one cancellation
// token. The first subsystem to stop cancels the rest; SIGINT and
// SIGTERM cancel everything.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use itops_alert_api::{AuthProvider, BasicAuth, DirectoryClient, RcaClient, SearchClient};
use itops_alert_config::{
    BrokerBackend, Config, ConfigManager, StorageBackend, correlation_config, platform_transport,
    rca_dispatcher_config,
};
use itops_alert_core::{
    Broker, Correlation, Directory, DirectoryCache, HttpDirectory, IdGenerator, MemoryBroker,
    RcaDispatcher, Repositories, StaticDirectory,
};

use crate::api::{self, AppState};
use crate::error::AppError;

/// Time the application gets to close after its subsystems stopped.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Authorization header source that always reads the latest config.
pub fn auth_provider(manager: &ConfigManager) -> AuthProvider {
    let rx = manager.subscribe();
    AuthProvider::new(move || rx.borrow().app_config.credentials.authorization.clone())
}

// ── Construction ────────────────────────────────────────────────────

/// Everything the process runs, wired but not started.
pub struct Services {
    pub repos: Repositories,
    pub broker: Arc<dyn Broker>,
    pub correlation: Correlation,
    pub rca: Option<Arc<RcaDispatcher>>,
}

impl Services {
    pub fn build(config: &Config, auth: &AuthProvider) -> Result<Self, AppError> {
        let repos = repositories(config)?;
        let broker = broker(config)?;
        let directory = directory(config, auth)?;
        let cache = Arc::new(DirectoryCache::with_timing(
            directory,
            Duration::from_secs(config.correlation.directory_ttl_secs),
            Duration::from_secs(config.correlation.directory_refresh_secs),
        ));
        let correlation_config = correlation_config(config).map_err(|source| AppError::Config {
            path: "(loaded config)".into(),
            source,
        })?;
        let correlation = Correlation::new(
            repos.clone(),
            Arc::clone(&cache),
            Arc::clone(&broker),
            Arc::new(IdGenerator::new()),
            &correlation_config,
        );

        let rca = if config.rca.enabled {
            let client = RcaClient::new(
                config.platform.base_url.trim(),
                &config.rca.submit_path,
                auth.clone(),
                &platform_transport(config),
            )
            .map_err(|e| AppError::startup("RCA client", e))?;
            info!(endpoint = %client.endpoint(), "RCA dispatch enabled");
            Some(Arc::new(RcaDispatcher::new(
                repos.clone(),
                Arc::clone(cache.directory()),
                Arc::new(client),
                correlation.problems(),
                rca_dispatcher_config(config),
            )))
        } else {
            info!("RCA dispatch disabled");
            None
        };

        Ok(Self {
            repos,
            broker,
            correlation,
            rca,
        })
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            broker: Arc::clone(&self.broker),
            repos: self.repos.clone(),
            problems: self.correlation.problems(),
        }
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("correlation", &self.correlation)
            .field("rca", &self.rca.is_some())
            .finish_non_exhaustive()
    }
}

fn repositories(config: &Config) -> Result<Repositories, AppError> {
    match config.storage.backend {
        StorageBackend::Memory => {
            warn!("memory storage selected, state is lost on restart");
            Ok(Repositories::memory())
        }
        StorageBackend::OpenSearch => {
            let search = &config.dep_services.open_search;
            let auth = match (&search.password, search.user.is_empty()) {
                (Some(password), false) => Some(BasicAuth {
                    username: search.user.clone(),
                    password: password.clone(),
                }),
                _ => None,
            };
            let client = SearchClient::new(&search.base_url(), auth, &platform_transport(config))
                .map_err(|e| AppError::startup("search index client", e))?;
            info!(url = %search.base_url(), "search index storage selected");
            Ok(Repositories::opensearch(client))
        }
    }
}

fn broker(config: &Config) -> Result<Arc<dyn Broker>, AppError> {
    match config.broker.backend {
        BrokerBackend::Memory => Ok(Arc::new(MemoryBroker::new())),
        #[cfg(feature = "kafka")]
        BrokerBackend::Kafka => {
            let mq = &config.dep_services.mq;
            let settings = itops_alert_core::KafkaSettings {
                bootstrap_servers: mq.bootstrap_servers(),
                topic: config.kafka.raw_events.topic.clone(),
                consumer_group: config.kafka.raw_events.consumer_group.clone(),
                username: mq.auth.username.clone(),
                password: mq
                    .auth
                    .password
                    .clone()
                    .unwrap_or_else(|| secrecy::SecretString::from(String::new())),
                mechanism: mq.auth.mechanism.clone(),
            };
            let broker = itops_alert_core::KafkaBroker::new(settings)
                .map_err(|e| AppError::startup("kafka broker", e))?;
            Ok(Arc::new(broker))
        }
        #[cfg(not(feature = "kafka"))]
        BrokerBackend::Kafka => Err(AppError::FeatureDisabled { backend: "kafka" }),
    }
}

fn directory(config: &Config, auth: &AuthProvider) -> Result<Arc<dyn Directory>, AppError> {
    let base_url = config.platform.base_url.trim();
    if base_url.is_empty() {
        warn!("platform.base_url is empty, entity lookups resolve nothing");
        return Ok(Arc::new(StaticDirectory::new()));
    }
    let client = DirectoryClient::new(
        base_url,
        config.app_config.knowledge_network.knowledge_id.clone(),
        auth.clone(),
        &platform_transport(config),
    )
    .map_err(|e| AppError::startup("object directory client", e))?;
    Ok(Arc::new(HttpDirectory::new(client)))
}

// ── Lifecycle ───────────────────────────────────────────────────────

/// Run until a signal arrives or a subsystem stops.
pub async fn run(manager: Arc<ConfigManager>) -> Result<(), AppError> {
    let config = manager.current();
    let services = Services::build(&config, &auth_provider(&manager))?;

    let addr = config.api.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| AppError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!(%addr, "HTTP API listening");

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));
    run_services(services, listener, &config, manager, cancel).await
}

/// Drive already-built services until `cancel` fires or one of them stops.
pub async fn run_services(
    services: Services,
    listener: TcpListener,
    config: &Config,
    manager: Arc<ConfigManager>,
    cancel: CancellationToken,
) -> Result<(), AppError> {
    let http_grace = Duration::from_secs(config.api.shutdown_grace_secs);
    let router = api::router(services.app_state(), config.api.max_body_bytes);

    let http = async {
        let result = api::serve(listener, router, cancel.clone(), http_grace).await;
        cancel.cancel();
        result.map_err(AppError::Serve)
    };
    let correlation = async {
        let result = services.correlation.run(cancel.clone()).await;
        cancel.cancel();
        result.map_err(|source| AppError::Subsystem {
            subsystem: "correlation",
            source,
        })
    };
    let rca = async {
        let Some(dispatcher) = services.rca.clone() else {
            return Ok(());
        };
        let result = dispatcher.run(cancel.clone()).await;
        cancel.cancel();
        result.map_err(|source| AppError::Subsystem {
            subsystem: "RCA dispatcher",
            source,
        })
    };
    let reload = manager.run(cancel.clone());

    let subsystems = async { tokio::join!(http, correlation, rca, reload) };
    let mut subsystems = std::pin::pin!(subsystems);

    let results = tokio::select! {
        results = &mut subsystems => Some(results),
        () = cancel.cancelled() => {
            tokio::time::timeout(http_grace + CLOSE_GRACE, &mut subsystems).await.ok()
        }
    };

    let Some((http, correlation, rca, ())) = results else {
        warn!("subsystems did not stop within the shutdown grace period");
        return Ok(());
    };
    info!("itops-alert stopped");
    http.and(correlation).and(rca)
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("SIGINT received, shutting down"),
        () = terminate => info!("SIGTERM received, shutting down"),
        () = cancel.cancelled() => return,
    }
    cancel.cancel();
}
