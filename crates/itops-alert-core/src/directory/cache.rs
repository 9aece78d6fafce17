// ── Directory cache ──
//
// Maps composite entity keys to resolved entity info. Entries live for a
// TTL and are refreshed by a periodic warmup that walks every object class.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Directory;
use crate::error::CoreError;
use crate::model::{DirectoryObject, EntityObjectInfo};

const KEY_PREFIX: &str = "objectclass:hostname:";

pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
struct CachedEntry {
    info: EntityObjectInfo,
    expires_at: Instant,
}

/// Outcome of one warmup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmupStats {
    pub object_types: usize,
    pub failed_types: usize,
    pub entries: usize,
}

pub struct DirectoryCache {
    directory: Arc<dyn Directory>,
    entries: DashMap<String, CachedEntry>,
    /// Exclusive while a warmup applies its results; shared for lookups.
    lock: RwLock<()>,
    ttl: Duration,
    refresh_interval: Duration,
}

impl DirectoryCache {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self::with_timing(directory, DEFAULT_TTL, DEFAULT_REFRESH_INTERVAL)
    }

    pub fn with_timing(
        directory: Arc<dyn Directory>,
        ttl: Duration,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            directory,
            entries: DashMap::new(),
            lock: RwLock::new(()),
            ttl,
            refresh_interval,
        }
    }

    /// The directory this cache reads from (also used for topology queries).
    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.directory
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a composite key (see [`crate::model::entity_key`]).
    pub async fn lookup(&self, key: &str) -> Result<EntityObjectInfo, CoreError> {
        let _shared = self.lock.read().await;
        let cache_key = format!("{KEY_PREFIX}{key}");
        match self.entries.get(&cache_key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(entry.info.clone()),
            _ => Err(CoreError::EntityUnknown { key: key.to_owned() }),
        }
    }

    /// Pull every object class and refresh the entries. Classes that fail
    /// are logged and skipped; only a failing class listing is an error.
    pub async fn warmup(&self) -> Result<WarmupStats, CoreError> {
        let object_types = self.directory.object_types().await?;
        let mut stats = WarmupStats {
            object_types: object_types.len(),
            ..WarmupStats::default()
        };

        let mut fetched: Vec<(String, DirectoryObject)> = Vec::new();
        for object_type in &object_types {
            match self.directory.objects(object_type).await {
                Ok(objects) => {
                    debug!(object_type, count = objects.len(), "object class fetched");
                    fetched.extend(objects.into_iter().map(|o| (object_type.clone(), o)));
                }
                Err(e) => {
                    stats.failed_types += 1;
                    warn!(object_type, error = %e, "object class warmup failed");
                }
            }
        }

        let _exclusive = self.lock.write().await;
        let now = Instant::now();
        let expires_at = now + self.ttl;
        for (object_type, object) in fetched {
            if object.s_id.is_empty() || object.name.is_empty() {
                continue;
            }
            let cache_key = format!("{KEY_PREFIX}{}", object.key());
            self.entries.insert(
                cache_key,
                CachedEntry {
                    info: EntityObjectInfo {
                        object_type_id: object_type,
                        object_id: object.s_id,
                        name: object.name,
                    },
                    expires_at,
                },
            );
            stats.entries += 1;
        }
        self.entries.retain(|_, entry| entry.expires_at > now);

        if stats.failed_types > 0 {
            warn!(
                object_types = stats.object_types,
                failed = stats.failed_types,
                "directory warmup finished with failures"
            );
        }
        Ok(stats)
    }

    /// Warm up immediately, then refresh every interval until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        match self.warmup().await {
            Ok(stats) => info!(entries = stats.entries, "directory cache warmed up"),
            Err(e) => warn!(
                error = %e,
                "initial directory warmup failed, retrying on next refresh"
            ),
        }
        self.refresh(cancel).await;
    }

    /// Refresh every interval until cancelled, without an initial warmup.
    pub async fn refresh(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.refresh_interval);
        interval.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    match self.warmup().await {
                        Ok(stats) => debug!(entries = stats.entries, "directory cache refreshed"),
                        Err(e) => warn!(error = %e, "directory refresh failed"),
                    }
                }
            }
        }
        debug!("directory cache refresher stopped");
    }
}

impl std::fmt::Debug for DirectoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryCache")
            .field("entries", &self.entries.len())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
