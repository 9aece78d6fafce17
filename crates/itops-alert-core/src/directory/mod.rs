// ── Object directory ──
//
// Read-only view of the monitored object inventory: object classes,
// their instances, and 1-hop topology. The HTTP backend talks to the
// ontology service; the static backend serves tests and memory deployments.

mod cache;
mod fixed;
mod http;

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::CoreError;
use crate::model::{DirectoryObject, EntityRef, Topology};

pub use cache::{DirectoryCache, WarmupStats};
pub use fixed::StaticDirectory;
pub use http::HttpDirectory;

/// Page size used when walking object instances.
pub const PAGE_SIZE: u32 = 1000;

#[async_trait]
pub trait Directory: Send + Sync {
    /// Ids of every object class in the knowledge network.
    async fn object_types(&self) -> Result<Vec<String>, CoreError>;

    /// Every instance of one object class.
    async fn objects(&self, object_type_id: &str) -> Result<Vec<DirectoryObject>, CoreError>;

    /// 1-hop bidirectional neighbourhood around each anchor, merged.
    async fn subgraph(&self, anchors: &[EntityRef]) -> Result<Topology, CoreError>;

    /// Entity ids directly connected to `entity`, excluding itself.
    async fn neighbors(&self, entity: &EntityRef) -> Result<HashSet<String>, CoreError> {
        let topology = self.subgraph(std::slice::from_ref(entity)).await?;
        Ok(topology
            .nodes
            .into_iter()
            .map(|n| n.s_id)
            .filter(|id| !id.is_empty() && *id != entity.object_id)
            .collect())
    }
}
