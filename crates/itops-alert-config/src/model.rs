// ── Configuration model ──
//
// Mirrors `config.yaml`. Every section defaults field by field so a
// partial file, or none at all, yields a runnable memory deployment.

use std::path::PathBuf;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Top-level service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub log: LogConfig,
    pub kafka: KafkaTopics,
    pub platform: PlatformConfig,
    pub dep_services: DepServices,
    pub storage: StorageConfig,
    pub broker: BrokerConfig,
    pub rca: RcaConfig,
    pub correlation: CorrelationSettings,
    /// Poll period for config file changes.
    pub reload_interval_secs: u64,
    /// Business settings, also persisted to the `data/app_config.yaml`
    /// side file.
    pub app_config: AppConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            log: LogConfig::default(),
            kafka: KafkaTopics::default(),
            platform: PlatformConfig::default(),
            dep_services: DepServices::default(),
            storage: StorageConfig::default(),
            broker: BrokerConfig::default(),
            rca: RcaConfig::default(),
            correlation: CorrelationSettings::default(),
            reload_interval_secs: 5,
            app_config: AppConfig::default(),
        }
    }
}

// ── Service surface ─────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,
    pub shutdown_grace_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 13047,
            max_body_bytes: 10 * 1024 * 1024,
            shutdown_grace_secs: 5,
        }
    }
}

impl ApiConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    /// Daily rolling log file; stdout when unset.
    pub filepath: Option<PathBuf>,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            filepath: None,
            format: LogFormat::Text,
        }
    }
}

// ── Broker topics ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct KafkaTopics {
    pub raw_events: TopicConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TopicConfig {
    pub topic: String,
    pub consumer_group: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            topic: "itops_alert_raw_event".into(),
            consumer_group: "itops-alert-analysis".into(),
        }
    }
}

// ── Platform and dependent services ─────────────────────────────────

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Base URL of the directory and analyzer services. Empty disables
    /// both.
    pub base_url: String,
    pub timeout_secs: u64,
    pub insecure_skip_verify: bool,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_secs: 30,
            insecure_skip_verify: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DepServices {
    pub mq: MqConfig,
    pub open_search: OpenSearchConfig,
    /// Accepted for compatibility; nothing connects to it.
    pub redis: RedisConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MqConfig {
    pub mq_host: String,
    pub mq_port: u16,
    pub auth: MqAuth,
}

impl Default for MqConfig {
    fn default() -> Self {
        Self {
            mq_host: String::new(),
            mq_port: 9092,
            auth: MqAuth::default(),
        }
    }
}

impl MqConfig {
    pub fn bootstrap_servers(&self) -> String {
        format!("{}:{}", self.mq_host, self.mq_port)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MqAuth {
    pub username: String,
    #[serde(with = "secret")]
    pub password: Option<SecretString>,
    pub mechanism: String,
}

impl Default for MqAuth {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: None,
            mechanism: "PLAIN".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OpenSearchConfig {
    pub host: String,
    pub port: u16,
    pub protocol: String,
    pub user: String,
    #[serde(with = "secret")]
    pub password: Option<SecretString>,
}

impl Default for OpenSearchConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 9200,
            protocol: "http".into(),
            user: String::new(),
            password: None,
        }
    }
}

impl OpenSearchConfig {
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    #[serde(with = "secret")]
    pub password: Option<SecretString>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 6379,
            password: None,
        }
    }
}

// ── Backends ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    #[serde(rename = "opensearch")]
    #[strum(serialize = "opensearch")]
    OpenSearch,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BrokerBackend {
    #[default]
    Memory,
    Kafka,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub backend: BrokerBackend,
}

// ── Engines ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RcaConfig {
    pub enabled: bool,
    pub poll_interval_secs: u64,
    pub min_age_secs: u64,
    pub max_failures: u32,
    pub submit_path: String,
}

impl Default for RcaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: 30,
            min_age_secs: 60,
            max_failures: 5,
            submit_path: itops_alert_api::rca::DEFAULT_SUBMIT_PATH.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorrelationSettings {
    pub sweep_interval_secs: u64,
    pub correlation_window_secs: u64,
    pub directory_refresh_secs: u64,
    pub directory_ttl_secs: u64,
}

impl Default for CorrelationSettings {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
            correlation_window_secs: 300,
            directory_refresh_secs: 30,
            directory_ttl_secs: 3600,
        }
    }
}

// ── Business settings ───────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub credentials: Credentials,
    pub knowledge_network: KnowledgeNetwork,
    pub ingest: IngestSettings,
    pub fault_point: Lifetime,
    pub problem: Lifetime,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            knowledge_network: KnowledgeNetwork::default(),
            ingest: IngestSettings::default(),
            fault_point: Lifetime::expiring_after(600),
            problem: Lifetime::expiring_after(1800),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Credentials {
    /// `Authorization` header value for platform calls.
    #[serde(with = "secret")]
    pub authorization: Option<SecretString>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct KnowledgeNetwork {
    pub knowledge_id: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct IngestSettings {
    pub source: SourceSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceSettings {
    #[serde(rename = "type")]
    pub kind: String,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            kind: "zabbix_webhook".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Lifetime {
    pub expiration: Expiration,
}

impl Lifetime {
    fn expiring_after(secs: u64) -> Self {
        Self {
            expiration: Expiration {
                enabled: true,
                expiration_time_secs: secs,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Expiration {
    pub enabled: bool,
    pub expiration_time_secs: u64,
}

impl Default for Expiration {
    fn default() -> Self {
        Self {
            enabled: true,
            expiration_time_secs: 600,
        }
    }
}

// ── Secret fields ───────────────────────────────────────────────────

/// Optional secrets read from and written back to plain strings. Empty
/// strings read as absent.
mod secret {
    use secrecy::{ExposeSecret, SecretString};
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        value: &Option<SecretString>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(secret) => serializer.serialize_str(secret.expose_secret()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<SecretString>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.filter(|s| !s.is_empty()).map(SecretString::from))
    }
}
