// ── Domain model ──
//
// Documents as stored in the search index. Field names are the wire
// names; status enums serialize to their stored codes.

pub mod causal;
pub mod entity;
pub mod event;
pub mod fault;
pub mod problem;
pub mod rca;
pub mod severity;

// ── Re-exports ──────────────────────────────────────────────────────

pub use causal::{FaultCausalObject, FaultCausalRelation, HAS_CAUSE, HAS_EFFECT};
pub use entity::{
    DirectoryObject, EntityObjectInfo, EntityRef, Topology, TopologyNode, entity_key,
};
pub use event::{EventStatus, RawEvent};
pub use fault::{
    FAULT_POINT_CLASS, FaultPointObject, FaultPointRelation, FaultStatus, HAS_RELATION_WITH,
};
pub use problem::{CloseRequest, CloseType, Problem, ProblemStatus, RcaStatus};
pub use rca::{
    Fault, Occurrence, RcaCallback, RcaContext, RcaNetwork, RcaNode, RcaRequest, RcaResults,
    Relation,
};
pub use severity::Severity;
