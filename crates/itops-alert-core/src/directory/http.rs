// ── Directory backed by the ontology REST service ──

use std::collections::HashMap;

use async_trait::async_trait;
use futures::TryStreamExt;
use itops_alert_api::{DirectoryClient, SubgraphRequest, SubgraphResponse};
use serde_json::{Map, Value};
use tracing::debug;

use super::{Directory, PAGE_SIZE};
use crate::error::CoreError;
use crate::model::{DirectoryObject, EntityRef, Relation, Topology, TopologyNode};

#[derive(Debug, Clone)]
pub struct HttpDirectory {
    client: DirectoryClient,
}

impl HttpDirectory {
    pub fn new(client: DirectoryClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Directory for HttpDirectory {
    async fn object_types(&self) -> Result<Vec<String>, CoreError> {
        let types = self.client.object_types().await?;
        Ok(types.into_iter().map(|t| t.id).collect())
    }

    async fn objects(&self, object_type_id: &str) -> Result<Vec<DirectoryObject>, CoreError> {
        let raw: Vec<Map<String, Value>> = self
            .client
            .objects(object_type_id, PAGE_SIZE)
            .try_collect()
            .await?;
        debug!(object_type_id, count = raw.len(), "fetched directory objects");
        Ok(raw.iter().map(object_from_properties).collect())
    }

    async fn subgraph(&self, anchors: &[EntityRef]) -> Result<Topology, CoreError> {
        let mut topology = Topology::default();
        for anchor in anchors {
            if anchor.object_id.is_empty() || anchor.object_class.is_empty() {
                continue;
            }
            let request = SubgraphRequest::one_hop(&anchor.object_class, &anchor.object_id);
            let response = self.client.subgraph(&request).await?;
            topology.merge(topology_from_response(response));
        }
        Ok(topology)
    }
}

// ── Conversion ───────────────────────────────────────────────────────

/// Directory properties are loosely typed; numbers and bools are
/// accepted where strings are expected.
fn property(map: &Map<String, Value>, field: &str) -> String {
    match map.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn object_from_properties(map: &Map<String, Value>) -> DirectoryObject {
    DirectoryObject {
        s_id: property(map, "s_id"),
        name: property(map, "name"),
        k8s_cluster: property(map, "k8s_cluster"),
        namespace: property(map, "namespace"),
    }
}

/// Subgraph objects are keyed by directory id (`host-h1`); relations
/// reference those ids. Both are translated to instance `s_id`s.
fn topology_from_response(response: SubgraphResponse) -> Topology {
    let s_ids: HashMap<String, String> = response
        .objects
        .iter()
        .map(|(key, obj)| (key.clone(), obj.properties.s_id.clone()))
        .collect();

    let mut nodes: Vec<TopologyNode> = response
        .objects
        .into_values()
        .filter(|obj| !obj.properties.s_id.is_empty())
        .map(|obj| TopologyNode {
            s_id: obj.properties.s_id,
            name: if obj.properties.name.is_empty() {
                obj.display
            } else {
                obj.properties.name
            },
            object_class: obj.object_type_id,
        })
        .collect();
    nodes.sort_by(|a, b| a.s_id.cmp(&b.s_id));

    let edges = response
        .relation_paths
        .into_iter()
        .flat_map(|path| path.relations)
        .filter_map(|rel| {
            let source = s_ids.get(&rel.source_object_id)?.clone();
            let target = s_ids.get(&rel.target_object_id)?.clone();
            Some(Relation {
                relation_id: format!("{source}:{}:{target}", rel.relation_type_id),
                relation_class: rel.relation_type_id,
                source_object_id: source,
                target_object_id: target,
            })
        })
        .collect();

    Topology { nodes, edges }
}
