//! Configuration for the itops-alert service.
//!
//! YAML file + business side file + `ITOPS_` environment, merged with
//! figment, validated, and translated into the engine configs of
//! `itops_alert_core`. [`ConfigManager`] keeps the live copy and reloads
//! it when the files change.

mod manager;
mod model;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use thiserror::Error;
use tracing::{info, warn};

use itops_alert_api::TransportConfig;
use itops_alert_core::{
    CorrelationConfig, FaultEngineConfig, ProblemEngineConfig, RcaDispatcherConfig, RetryPolicy,
    SourceKind,
};

pub use manager::ConfigManager;
pub use model::*;

/// Environment prefix; nested keys are separated by `__`.
pub const ENV_PREFIX: &str = "ITOPS_";

/// Default location of the main file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] serde_yaml::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── Paths ───────────────────────────────────────────────────────────

/// `<config dir>/data/app_config.yaml` next to the main file.
pub fn app_config_path(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("data")
        .join("app_config.yaml")
}

// ── Loading ─────────────────────────────────────────────────────────

/// Load, merge and validate. Layers, lowest first: built-in defaults,
/// the main file, the business side file, `ITOPS_` environment.
///
/// A missing side file is created from the effective business settings;
/// failing to write it is logged.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let base = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Yaml::file(path));

    let side_path = app_config_path(path);
    let figment = match read_side_file(&side_path)? {
        Some(side) => base.merge(Serialized::default("app_config", side)),
        None => {
            let effective: Config = base.extract()?;
            if let Err(e) = write_side_file(&side_path, &effective.app_config) {
                warn!(path = %side_path.display(), error = %e, "cannot write business config");
            }
            base
        }
    };

    let config: Config = figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()?;
    validate(&config)?;
    Ok(config)
}

fn read_side_file(path: &Path) -> Result<Option<serde_yaml::Value>, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let value: serde_yaml::Value = serde_yaml::from_str(&raw)?;
    // An empty file parses as null and contributes nothing.
    Ok((!value.is_null()).then_some(value))
}

/// Persist business settings to the side file.
pub fn write_side_file(path: &Path, app_config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let yaml = serde_yaml::to_string(app_config)?;
    std::fs::write(path, yaml)?;
    info!(path = %path.display(), "business config written");
    Ok(())
}

// ── Validation ──────────────────────────────────────────────────────

pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.api.port == 0 {
        return Err(invalid("api.port", "must not be 0"));
    }
    if config.api.max_body_bytes == 0 {
        return Err(invalid("api.max_body_bytes", "must not be 0"));
    }

    let base_url = config.platform.base_url.trim();
    if base_url.is_empty() {
        if config.rca.enabled {
            return Err(invalid("platform.base_url", "required when rca.enabled is true"));
        }
    } else if let Err(e) = url::Url::parse(base_url) {
        return Err(invalid("platform.base_url", format!("invalid URL {base_url:?}: {e}")));
    }

    if config.storage.backend == StorageBackend::OpenSearch
        && config.dep_services.open_search.host.trim().is_empty()
    {
        return Err(invalid(
            "dep_services.open_search.host",
            "required when storage.backend is opensearch",
        ));
    }
    if config.broker.backend == BrokerBackend::Kafka
        && config.dep_services.mq.mq_host.trim().is_empty()
    {
        return Err(invalid("dep_services.mq.mq_host", "required when broker.backend is kafka"));
    }

    source_kind(config)?;

    for (field, secs) in [
        ("reload_interval_secs", config.reload_interval_secs),
        ("rca.poll_interval_secs", config.rca.poll_interval_secs),
        ("correlation.sweep_interval_secs", config.correlation.sweep_interval_secs),
        ("correlation.directory_refresh_secs", config.correlation.directory_refresh_secs),
    ] {
        if secs == 0 {
            return Err(invalid(field, "must be at least 1 second"));
        }
    }
    Ok(())
}

fn source_kind(config: &Config) -> Result<SourceKind, ConfigError> {
    let raw = &config.app_config.ingest.source.kind;
    SourceKind::from_str(raw).map_err(|_| {
        invalid(
            "app_config.ingest.source.type",
            format!("unsupported source {raw:?}"),
        )
    })
}

// ── Translation to engine configs ───────────────────────────────────

fn expiration(expiration: &Expiration) -> Option<Duration> {
    expiration
        .enabled
        .then(|| Duration::from_secs(expiration.expiration_time_secs))
}

/// Correlation pipeline tuning from the validated config.
pub fn correlation_config(config: &Config) -> Result<CorrelationConfig, ConfigError> {
    let app = &config.app_config;
    Ok(CorrelationConfig {
        default_source: source_kind(config)?,
        fault: FaultEngineConfig {
            expiration: expiration(&app.fault_point.expiration),
        },
        problem: ProblemEngineConfig {
            correlation_window: Duration::from_secs(config.correlation.correlation_window_secs),
            expiration: expiration(&app.problem.expiration),
            sweep_interval: Duration::from_secs(config.correlation.sweep_interval_secs),
        },
        retry: RetryPolicy::default(),
        fault_sweep_interval: Duration::from_secs(config.correlation.sweep_interval_secs),
    })
}

pub fn rca_dispatcher_config(config: &Config) -> RcaDispatcherConfig {
    RcaDispatcherConfig {
        poll_interval: Duration::from_secs(config.rca.poll_interval_secs),
        min_age: Duration::from_secs(config.rca.min_age_secs),
        max_failures: config.rca.max_failures.max(1),
        knowledge_id: config.app_config.knowledge_network.knowledge_id.clone(),
    }
}

/// Transport settings shared by the platform clients.
pub fn platform_transport(config: &Config) -> TransportConfig {
    TransportConfig::new(
        Duration::from_secs(config.platform.timeout_secs),
        config.platform.insecure_skip_verify,
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn valid() -> Config {
        Config {
            platform: PlatformConfig {
                base_url: "http://platform:8080".into(),
                ..PlatformConfig::default()
            },
            ..Config::default()
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.api.port, 13047);
        assert_eq!(config.api.max_body_bytes, 10_485_760);
        assert_eq!(config.kafka.raw_events.topic, "itops_alert_raw_event");
        assert_eq!(config.app_config.fault_point.expiration.expiration_time_secs, 600);
        assert_eq!(config.app_config.problem.expiration.expiration_time_secs, 1800);
        assert_eq!(config.rca.submit_path, "/api/itops-rca/v1/analyses");
        assert_eq!(config.reload_interval_secs, 5);
    }

    #[test]
    fn port_zero_is_rejected() {
        let mut config = valid();
        config.api.port = 0;
        let err = validate(&config).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "api.port"));
    }

    #[test]
    fn rca_requires_platform_url() {
        let mut config = valid();
        config.platform.base_url.clear();
        assert!(validate(&config).is_err());

        config.rca.enabled = false;
        validate(&config).unwrap();
    }

    #[test]
    fn malformed_platform_url_is_rejected() {
        let mut config = valid();
        config.platform.base_url = "not a url".into();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("platform.base_url"), "{err}");
    }

    #[test]
    fn opensearch_backend_requires_host() {
        let mut config = valid();
        config.storage.backend = StorageBackend::OpenSearch;
        assert!(validate(&config).is_err());

        config.dep_services.open_search.host = "search".into();
        validate(&config).unwrap();
    }

    #[test]
    fn unknown_ingest_source_is_rejected() {
        let mut config = valid();
        config.app_config.ingest.source.kind = "nagios".into();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("nagios"), "{err}");
    }

    #[test]
    fn disabled_expiration_maps_to_none() {
        let mut config = valid();
        config.app_config.problem.expiration.enabled = false;
        let correlation = correlation_config(&config).unwrap();
        assert_eq!(correlation.problem.expiration, None);
        assert_eq!(correlation.fault.expiration, Some(Duration::from_secs(600)));
        assert_eq!(correlation.problem.correlation_window, Duration::from_secs(300));
        assert_eq!(correlation.default_source, SourceKind::ZabbixWebhook);
    }

    #[test]
    fn side_file_path_sits_under_data() {
        assert_eq!(
            app_config_path(Path::new("config/config.yaml")),
            PathBuf::from("config/data/app_config.yaml")
        );
    }
}
