#![allow(clippy::unwrap_used)]
// Layered loading: defaults, main file, business side file, environment.
// Every test runs inside a figment `Jail` so environment overrides set by
// one test never leak into another.

use std::path::Path;

use figment::Jail;
use pretty_assertions::assert_eq;
use secrecy::ExposeSecret;

use itops_alert_config::{
    AppConfig, BrokerBackend, ConfigError, LogFormat, StorageBackend, app_config_path,
    load_config, write_side_file,
};

const MAIN: &str = "\
api:
  port: 15000
log:
  level: debug
  format: json
platform:
  base_url: http://platform:8080
dep_services:
  open_search:
    host: search.internal
    user: admin
    password: s3cret
storage:
  backend: opensearch
app_config:
  knowledge_network:
    knowledge_id: kn-main
";

const CONFIG: &str = "config.yaml";

#[test]
fn main_file_overrides_defaults() {
    Jail::expect_with(|jail| {
        jail.create_file(CONFIG, MAIN)?;

        let config = load_config(Path::new(CONFIG)).unwrap();
        assert_eq!(config.api.port, 15000);
        assert_eq!(config.api.shutdown_grace_secs, 5);
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.storage.backend, StorageBackend::OpenSearch);
        assert_eq!(config.broker.backend, BrokerBackend::Memory);
        assert_eq!(config.dep_services.open_search.base_url(), "http://search.internal:9200");
        let password = config.dep_services.open_search.password.unwrap();
        assert_eq!(password.expose_secret(), "s3cret");
        assert_eq!(config.app_config.knowledge_network.knowledge_id, "kn-main");
        Ok(())
    });
}

#[test]
fn missing_side_file_is_created_from_effective_settings() {
    Jail::expect_with(|jail| {
        jail.create_file(CONFIG, MAIN)?;

        load_config(Path::new(CONFIG)).unwrap();

        let side = app_config_path(Path::new(CONFIG));
        let written: AppConfig =
            serde_yaml::from_str(&std::fs::read_to_string(side).unwrap()).unwrap();
        assert_eq!(written.knowledge_network.knowledge_id, "kn-main");
        assert_eq!(written.problem.expiration.expiration_time_secs, 1800);
        Ok(())
    });
}

#[test]
fn side_file_overrides_main_file() {
    Jail::expect_with(|jail| {
        jail.create_file(CONFIG, MAIN)?;

        let mut app = AppConfig::default();
        app.knowledge_network.knowledge_id = "kn-side".into();
        app.fault_point.expiration.expiration_time_secs = 120;
        write_side_file(&app_config_path(Path::new(CONFIG)), &app).unwrap();

        let config = load_config(Path::new(CONFIG)).unwrap();
        assert_eq!(config.app_config.knowledge_network.knowledge_id, "kn-side");
        assert_eq!(config.app_config.fault_point.expiration.expiration_time_secs, 120);
        assert_eq!(config.api.port, 15000);
        Ok(())
    });
}

#[test]
fn environment_overrides_files() {
    Jail::expect_with(|jail| {
        jail.create_file(CONFIG, MAIN)?;
        jail.set_env("ITOPS_API__PORT", "16000");
        jail.set_env("ITOPS_APP_CONFIG__CREDENTIALS__AUTHORIZATION", "Bearer env");

        let config = load_config(Path::new(CONFIG)).unwrap();
        assert_eq!(config.api.port, 16000);
        let token = config.app_config.credentials.authorization.unwrap();
        assert_eq!(token.expose_secret(), "Bearer env");
        Ok(())
    });
}

#[test]
fn invalid_values_fail() {
    Jail::expect_with(|jail| {
        // `kafka` is not a storage backend.
        jail.create_file(CONFIG, &MAIN.replace("backend: opensearch", "backend: kafka"))?;
        let err = load_config(Path::new(CONFIG)).unwrap_err();
        assert!(matches!(err, ConfigError::Figment(_)), "got {err:?}");

        jail.create_file(CONFIG, &MAIN.replace("host: search.internal", "host: \"\""))?;
        let err = load_config(Path::new(CONFIG)).unwrap_err();
        assert!(
            matches!(err, ConfigError::Validation { ref field, .. } if field == "dep_services.open_search.host"),
            "got {err:?}"
        );
        Ok(())
    });
}
