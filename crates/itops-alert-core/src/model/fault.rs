// ── Fault point domain types ──

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use super::severity::Severity;

/// Relation class written when a fault point is attached to its entity.
pub const HAS_RELATION_WITH: &str = "has_relation_with";
/// Object class of fault points in the topology index.
pub const FAULT_POINT_CLASS: &str = "fault_point";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum FaultStatus {
    #[default]
    #[serde(rename = "1")]
    Occurred,
    #[serde(rename = "2")]
    Recovered,
    #[serde(rename = "3")]
    Expired,
}

impl FaultStatus {
    pub fn code(self) -> &'static str {
        match self {
            Self::Occurred => "1",
            Self::Recovered => "2",
            Self::Expired => "3",
        }
    }

    /// Recovered and expired faults no longer keep a problem alive.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Recovered | Self::Expired)
    }
}

/// A deduplicated condition on one entity, alive from its first event
/// until recovery or expiration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultPointObject {
    pub fault_id: u64,
    pub fault_name: String,
    pub fault_create_time: DateTime<Utc>,
    pub fault_update_time: DateTime<Utc>,
    pub fault_status: FaultStatus,
    pub fault_occur_time: DateTime<Utc>,
    pub fault_latest_time: DateTime<Utc>,
    /// Seconds.
    pub fault_duration_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault_recover_time: Option<DateTime<Utc>>,
    pub entity_object_class: String,
    pub entity_object_name: String,
    pub entity_object_id: String,
    pub relation_event_ids: IndexSet<u64>,
    pub fault_mode: String,
    pub fault_level: Severity,
    pub fault_description: String,
    pub problem_id: u64,
}

impl FaultPointObject {
    pub fn is_open(&self) -> bool {
        self.fault_status == FaultStatus::Occurred
    }

    /// Recompute `fault_duration_time` against `end`.
    pub fn refresh_duration(&mut self, end: DateTime<Utc>) {
        self.fault_duration_time = (end - self.fault_occur_time).num_seconds().max(0);
    }
}

/// Edge between an entity and one of its fault points.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultPointRelation {
    pub relation_id: u64,
    pub relation_class: String,
    pub relation_create_time: DateTime<Utc>,
    pub relation_update_time: DateTime<Utc>,
    pub source_object_id: String,
    pub source_object_class: String,
    pub target_object_id: String,
    pub target_object_class: String,
}
