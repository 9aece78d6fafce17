// ── Root-cause analysis payloads ──
//
// Request context sent to the analyzer and the callback it posts back.
// `rca_results` on a problem is the JSON encoding of `RcaResults`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::causal::{FaultCausalObject, FaultCausalRelation};
use super::fault::{FaultPointObject, FaultStatus};
use super::severity::Severity;

/// Body submitted to the external analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RcaRequest {
    pub problem_id: u64,
    pub adp_kn_id: String,
    pub rca_id: String,
    pub rca_context: RcaContext,
}

impl RcaRequest {
    pub fn rca_id_for(problem_id: u64) -> String {
        format!("rca_{problem_id}")
    }
}

/// Asynchronous analysis result posted back by the analyzer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RcaCallback {
    pub problem_id: u64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub root_cause_object_id: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub root_cause_fault_id: u64,
    pub rca_results: String,
    pub rca_start_time: Option<DateTime<Utc>>,
    pub rca_end_time: Option<DateTime<Utc>>,
    pub rca_status: super::problem::RcaStatus,
    /// Progress notification only; nothing is written.
    pub in_progress: bool,
    pub problem_name: String,
    pub problem_description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fault_causals: Vec<FaultCausalObject>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fault_causal_relations: Vec<FaultCausalRelation>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(value: &u64) -> bool {
    *value == 0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RcaResults {
    pub adp_kn_id: String,
    pub rca_id: String,
    pub rca_context: RcaContext,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RcaContext {
    pub occurrence: Occurrence,
    pub backtrace: Vec<Fault>,
    pub network: RcaNetwork,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Occurrence {
    pub name: String,
    pub description: String,
    pub impact: String,
}

/// Fault point snapshot used in the backtrace (no back-reference).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fault {
    pub fault_id: u64,
    pub fault_name: String,
    pub fault_create_time: DateTime<Utc>,
    pub fault_update_time: DateTime<Utc>,
    pub fault_status: FaultStatus,
    pub fault_occur_time: DateTime<Utc>,
    pub fault_latest_time: DateTime<Utc>,
    pub fault_duration_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault_recover_time: Option<DateTime<Utc>>,
    pub entity_object_class: String,
    pub entity_object_name: String,
    pub entity_object_id: String,
    pub relation_event_ids: Vec<u64>,
    pub fault_mode: String,
    pub fault_level: Severity,
    pub fault_description: String,
}

impl From<&FaultPointObject> for Fault {
    fn from(fp: &FaultPointObject) -> Self {
        Self {
            fault_id: fp.fault_id,
            fault_name: fp.fault_name.clone(),
            fault_create_time: fp.fault_create_time,
            fault_update_time: fp.fault_update_time,
            fault_status: fp.fault_status,
            fault_occur_time: fp.fault_occur_time,
            fault_latest_time: fp.fault_latest_time,
            fault_duration_time: fp.fault_duration_time,
            fault_recover_time: fp.fault_recover_time,
            entity_object_class: fp.entity_object_class.clone(),
            entity_object_name: fp.entity_object_name.clone(),
            entity_object_id: fp.entity_object_id.clone(),
            relation_event_ids: fp.relation_event_ids.iter().copied().collect(),
            fault_mode: fp.fault_mode.clone(),
            fault_level: fp.fault_level,
            fault_description: fp.fault_description.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RcaNetwork {
    pub nodes: Vec<RcaNode>,
    pub edges: Vec<Relation>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RcaNode {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub s_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ip_address: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub object_class: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_impact_level: Option<Severity>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub relation_event_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub relation_fault_point_ids: Vec<u64>,
}

/// A topology or causal edge between two objects, by `s_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Relation {
    pub relation_id: String,
    pub relation_class: String,
    pub source_object_id: String,
    pub target_object_id: String,
}
