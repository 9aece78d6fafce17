// ── In-memory directory ──
//
// A fixed inventory with an undirected adjacency list. Used by the memory
// deployment and by engine tests.

use std::sync::RwLock;

use async_trait::async_trait;

use super::Directory;
use crate::error::CoreError;
use crate::model::{DirectoryObject, EntityRef, Relation, Topology, TopologyNode};

#[derive(Debug, Default)]
struct Inventory {
    objects: Vec<(String, DirectoryObject)>,
    edges: Vec<Relation>,
}

#[derive(Debug, Default)]
pub struct StaticDirectory {
    inventory: RwLock<Inventory>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object whose lookup key uses an empty cluster and namespace.
    pub fn with_object(self, object_class: &str, s_id: &str, name: &str) -> Self {
        self.add_object(
            object_class,
            DirectoryObject {
                s_id: s_id.into(),
                name: name.into(),
                ..DirectoryObject::default()
            },
        );
        self
    }

    pub fn with_edge(self, source: &str, relation_class: &str, target: &str) -> Self {
        self.add_edge(source, relation_class, target);
        self
    }

    pub fn add_object(&self, object_class: &str, object: DirectoryObject) {
        let mut inventory = self.write();
        inventory
            .objects
            .retain(|(_, existing)| existing.s_id != object.s_id);
        inventory.objects.push((object_class.to_owned(), object));
    }

    pub fn add_edge(&self, source: &str, relation_class: &str, target: &str) {
        self.write().edges.push(Relation {
            relation_id: format!("{source}:{relation_class}:{target}"),
            relation_class: relation_class.to_owned(),
            source_object_id: source.to_owned(),
            target_object_id: target.to_owned(),
        });
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inventory> {
        self.inventory
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inventory> {
        self.inventory
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn node(inventory: &Inventory, s_id: &str) -> Option<TopologyNode> {
        inventory
            .objects
            .iter()
            .find(|(_, obj)| obj.s_id == s_id)
            .map(|(class, obj)| TopologyNode {
                s_id: obj.s_id.clone(),
                name: obj.name.clone(),
                object_class: class.clone(),
            })
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn object_types(&self) -> Result<Vec<String>, CoreError> {
        let mut types: Vec<String> = self.read().objects.iter().map(|(c, _)| c.clone()).collect();
        types.sort();
        types.dedup();
        Ok(types)
    }

    async fn objects(&self, object_type_id: &str) -> Result<Vec<DirectoryObject>, CoreError> {
        Ok(self
            .read()
            .objects
            .iter()
            .filter(|(class, _)| class == object_type_id)
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn subgraph(&self, anchors: &[EntityRef]) -> Result<Topology, CoreError> {
        let inventory = self.read();
        let mut topology = Topology::default();
        for anchor in anchors {
            let Some(root) = Self::node(&inventory, &anchor.object_id) else {
                continue;
            };
            let mut local = Topology {
                nodes: vec![root],
                edges: Vec::new(),
            };
            for edge in &inventory.edges {
                let other = if edge.source_object_id == anchor.object_id {
                    &edge.target_object_id
                } else if edge.target_object_id == anchor.object_id {
                    &edge.source_object_id
                } else {
                    continue;
                };
                if let Some(node) = Self::node(&inventory, other) {
                    local.nodes.push(node);
                }
                local.edges.push(edge.clone());
            }
            topology.merge(local);
        }
        Ok(topology)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn chain() -> StaticDirectory {
        StaticDirectory::new()
            .with_object("host", "h1", "h1")
            .with_object("host", "h2", "h2")
            .with_object("host", "h3", "h3")
            .with_object("pod", "p1", "web-0")
            .with_edge("h1", "connects_to", "h2")
            .with_edge("h2", "connects_to", "h3")
    }

    #[tokio::test]
    async fn neighbors_are_one_hop_and_undirected() {
        let dir = chain();
        let around_h2 = dir.neighbors(&EntityRef::new("h2", "host")).await.unwrap();
        assert_eq!(around_h2.len(), 2);
        assert!(around_h2.contains("h1") && around_h2.contains("h3"));

        let around_h1 = dir.neighbors(&EntityRef::new("h1", "host")).await.unwrap();
        assert_eq!(around_h1.into_iter().collect::<Vec<_>>(), vec!["h2".to_owned()]);
    }

    #[tokio::test]
    async fn unknown_anchor_has_empty_topology() {
        let dir = chain();
        let topology = dir.subgraph(&[EntityRef::new("nope", "host")]).await.unwrap();
        assert!(topology.nodes.is_empty());
    }

    #[tokio::test]
    async fn lists_types_and_objects() {
        let dir = chain();
        assert_eq!(dir.object_types().await.unwrap(), vec!["host", "pod"]);
        let pods = dir.objects("pod").await.unwrap();
        assert_eq!(pods[0].name, "web-0");
    }
}
