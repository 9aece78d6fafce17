// ── Live configuration ──
//
// Holds the current config behind an `ArcSwap` and republishes it on a
// `watch` channel whenever the main file or the side file changes on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use arc_swap::ArcSwap;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{Config, ConfigError, app_config_path, load_config};

/// Modification times of the files a config was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamps {
    main: Option<SystemTime>,
    side: Option<SystemTime>,
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

pub struct ConfigManager {
    path: PathBuf,
    current: ArcSwap<Config>,
    tx: watch::Sender<Arc<Config>>,
}

impl ConfigManager {
    /// Load `path` once. Fails if the initial config is invalid.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let config = Arc::new(load_config(&path)?);
        let (tx, _rx) = watch::channel(Arc::clone(&config));
        Ok(Self {
            path,
            current: ArcSwap::new(config),
            tx,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lock-free snapshot of the live config.
    pub fn current(&self) -> Arc<Config> {
        self.current.load_full()
    }

    /// Receiver that always holds the latest config.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Config>> {
        self.tx.subscribe()
    }

    /// Re-read both files. On failure the live config is kept.
    pub fn reload(&self) -> Result<Arc<Config>, ConfigError> {
        let config = Arc::new(load_config(&self.path)?);
        self.current.store(Arc::clone(&config));
        self.tx.send_replace(Arc::clone(&config));
        info!(path = %self.path.display(), "configuration reloaded");
        Ok(config)
    }

    fn stamps(&self) -> Stamps {
        Stamps {
            main: modified(&self.path),
            side: modified(&app_config_path(&self.path)),
        }
    }

    /// Poll the files every `reload_interval_secs` and reload on change.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let period = Duration::from_secs(self.current().reload_interval_secs.max(1));
        let mut interval = tokio::time::interval(period);
        interval.tick().await; // consume the immediate first tick
        let mut seen = self.stamps();

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let now = self.stamps();
                    if now == seen {
                        continue;
                    }
                    seen = now;
                    debug!(path = %self.path.display(), "config files changed");
                    if let Err(e) = self.reload() {
                        warn!(error = %e, "config reload failed, keeping previous config");
                    }
                }
            }
        }
        debug!("config reload loop stopped");
    }
}

impl std::fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigManager")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    const BASE: &str = "\
api:
  port: 14000
platform:
  base_url: http://platform:8080
";

    fn write(path: &Path, body: &str) {
        std::fs::write(path, body).unwrap();
    }

    #[test]
    fn reload_swaps_and_notifies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        write(&path, BASE);

        let manager = ConfigManager::load(&path).unwrap();
        let mut rx = manager.subscribe();
        assert_eq!(manager.current().api.port, 14000);

        write(&path, &BASE.replace("14000", "14001"));
        manager.reload().unwrap();

        assert_eq!(manager.current().api.port, 14001);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().api.port, 14001);
    }

    #[test]
    fn invalid_reload_keeps_previous_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        write(&path, BASE);
        let manager = ConfigManager::load(&path).unwrap();

        write(&path, &BASE.replace("14000", "0"));
        assert!(manager.reload().is_err());
        assert_eq!(manager.current().api.port, 14000);

        write(&path, "api: [not, a, map");
        assert!(manager.reload().is_err());
        assert_eq!(manager.current().api.port, 14000);
    }

    #[test]
    fn token_updates_reach_subscribers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        write(&path, BASE);
        let manager = ConfigManager::load(&path).unwrap();
        let rx = manager.subscribe();
        assert!(rx.borrow().app_config.credentials.authorization.is_none());

        let side = app_config_path(&path);
        write(&side, "credentials:\n  authorization: Bearer fresh\n");
        manager.reload().unwrap();

        let token = rx.borrow().app_config.credentials.authorization.clone().unwrap();
        assert_eq!(token.expose_secret(), "Bearer fresh");
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        write(&path, BASE);
        let manager = Arc::new(ConfigManager::load(&path).unwrap());

        let cancel = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(&manager).run(cancel.clone()));
        tokio::time::sleep(Duration::from_secs(12)).await;
        cancel.cancel();
        task.await.unwrap();
        assert_eq!(manager.current().api.port, 14000);
    }
}
