// ── Event normalization ──
//
// Turns an opaque webhook body into a canonical `RawEvent`. The source is
// taken from the payload's `source` field, falling back to the configured
// default. Entity identity is resolved through the directory cache; a
// miss leaves the entity descriptor empty and the event uncorrelated.

mod generic;
mod zabbix;

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::directory::DirectoryCache;
use crate::error::CoreError;
use crate::idgen::IdGenerator;
use crate::model::{EntityObjectInfo, RawEvent};

/// Declared origin of a payload.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SourceKind {
    ZabbixWebhook,
    Generic,
}

/// Resolves a composite entity key to directory identity.
#[async_trait]
pub trait EntityResolver: Send + Sync {
    async fn resolve(&self, key: &str) -> Result<EntityObjectInfo, CoreError>;
}

#[async_trait]
impl EntityResolver for DirectoryCache {
    async fn resolve(&self, key: &str) -> Result<EntityObjectInfo, CoreError> {
        self.lookup(key).await
    }
}

pub struct Normalizer {
    resolver: Arc<dyn EntityResolver>,
    ids: Arc<IdGenerator>,
    default_source: SourceKind,
}

impl Normalizer {
    pub fn new(
        resolver: Arc<dyn EntityResolver>,
        ids: Arc<IdGenerator>,
        default_source: SourceKind,
    ) -> Self {
        Self {
            resolver,
            ids,
            default_source,
        }
    }

    pub fn default_source(&self) -> SourceKind {
        self.default_source
    }

    /// Normalize one payload and allocate its `event_id`.
    pub async fn normalize(
        &self,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> Result<RawEvent, CoreError> {
        let document: Value = serde_json::from_slice(payload).map_err(|e| CoreError::Normalize {
            message: format!("payload is not JSON: {e}"),
        })?;
        if !document.is_object() {
            return Err(CoreError::Normalize {
                message: "payload must be a JSON object".into(),
            });
        }

        let source = match document.get("source").and_then(Value::as_str) {
            Some(tag) if !tag.trim().is_empty() => {
                SourceKind::from_str(tag.trim()).map_err(|_| CoreError::Normalize {
                    message: format!("unsupported source: {tag}"),
                })?
            }
            _ => self.default_source,
        };

        let parsed = match source {
            SourceKind::ZabbixWebhook => zabbix::parse(&document, payload, now)?,
            SourceKind::Generic => generic::parse(&document, payload, now)?,
        };
        let mut event = parsed.event;

        if let Some(key) = parsed.entity_key {
            match self.resolver.resolve(&key).await {
                Ok(info) => {
                    event.entity_object_name = info.name;
                    event.entity_object_class = info.object_type_id;
                    event.entity_object_id = info.object_id;
                }
                Err(CoreError::EntityUnknown { key }) => {
                    debug!(%key, "entity not in directory, event stays uncorrelated");
                    clear_entity(&mut event);
                }
                Err(e) => return Err(e),
            }
        }

        event.event_id = self.ids.next_id()?;
        Ok(event)
    }
}

fn clear_entity(event: &mut RawEvent) {
    event.entity_object_name.clear();
    event.entity_object_class.clear();
    event.entity_object_id.clear();
    event.entity_object_ip.clear();
    event.entity_object_port.clear();
    event.entity_object_mac.clear();
}

impl std::fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normalizer")
            .field("default_source", &self.default_source)
            .finish_non_exhaustive()
    }
}
