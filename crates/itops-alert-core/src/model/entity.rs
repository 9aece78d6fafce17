// ── Directory entity types ──

use serde::{Deserialize, Serialize};

use super::rca::Relation;

/// Resolved identity of a monitored object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityObjectInfo {
    /// Object class id (e.g. `pod`, `host`).
    pub object_type_id: String,
    /// Instance id (`s_id`).
    pub object_id: String,
    pub name: String,
}

/// An entity addressed by instance id and object class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub object_id: String,
    pub object_class: String,
}

impl EntityRef {
    pub fn new(object_id: impl Into<String>, object_class: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            object_class: object_class.into(),
        }
    }
}

/// One object instance as listed by the directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryObject {
    pub s_id: String,
    pub name: String,
    pub k8s_cluster: String,
    pub namespace: String,
}

impl DirectoryObject {
    pub fn key(&self) -> String {
        entity_key(&self.k8s_cluster, &self.namespace, &self.name)
    }
}

/// Composite directory lookup key: `k8s_cluster:<a>,namespace:<b>,name:<c>`.
/// Empty components are kept.
pub fn entity_key(k8s_cluster: &str, namespace: &str, name: &str) -> String {
    format!("k8s_cluster:{k8s_cluster},namespace:{namespace},name:{name}")
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyNode {
    pub s_id: String,
    pub name: String,
    pub object_class: String,
}

/// Object neighbourhood returned by the directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub nodes: Vec<TopologyNode>,
    pub edges: Vec<Relation>,
}

impl Topology {
    /// Fold another neighbourhood in, skipping duplicate nodes and edges.
    pub fn merge(&mut self, other: Topology) {
        for node in other.nodes {
            if !self.nodes.iter().any(|n| n.s_id == node.s_id) {
                self.nodes.push(node);
            }
        }
        for edge in other.edges {
            if !self.edges.contains(&edge) {
                self.edges.push(edge);
            }
        }
    }
}
