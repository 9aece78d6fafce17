// ── Causal graph produced by root-cause analysis ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const HAS_CAUSE: &str = "has_cause";
pub const HAS_EFFECT: &str = "has_effect";

/// A causal node: one analyzed cause/effect hypothesis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultCausalObject {
    pub causal_id: String,
    pub s_create_time: DateTime<Utc>,
    pub s_update_time: DateTime<Utc>,
    /// 0.0..=1.0
    pub causal_confidence: f64,
    pub causal_reason: String,
}

impl FaultCausalObject {
    /// Whether `incoming` carries information this node lacks: a higher
    /// confidence or a reason not seen before.
    pub fn is_superseded_by(&self, incoming: &Self) -> bool {
        incoming.causal_confidence > self.causal_confidence
            || (!incoming.causal_reason.is_empty() && incoming.causal_reason != self.causal_reason)
    }
}

/// Directed `has_cause` / `has_effect` edge between fault objects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultCausalRelation {
    pub relation_id: String,
    pub relation_class: String,
    pub relation_create_time: DateTime<Utc>,
    pub relation_update_time: DateTime<Utc>,
    pub source_object_id: String,
    pub source_object_class: String,
    pub target_object_id: String,
    pub target_object_class: String,
}

impl FaultCausalRelation {
    /// Identity of an edge regardless of its stored id.
    pub fn same_edge(&self, other: &Self) -> bool {
        self.source_object_id == other.source_object_id
            && self.target_object_id == other.target_object_id
            && self.relation_class == other.relation_class
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_confidence_supersedes() {
        let stored = FaultCausalObject {
            causal_confidence: 0.4,
            causal_reason: "disk latency".into(),
            ..FaultCausalObject::default()
        };
        let mut incoming = stored.clone();
        assert!(!stored.is_superseded_by(&incoming));

        incoming.causal_confidence = 0.9;
        assert!(stored.is_superseded_by(&incoming));

        incoming.causal_confidence = 0.1;
        incoming.causal_reason = "cpu throttling".into();
        assert!(stored.is_superseded_by(&incoming));

        incoming.causal_reason = String::new();
        assert!(!stored.is_superseded_by(&incoming));
    }
}
