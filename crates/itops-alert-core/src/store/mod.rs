// ── Repository layer ──
//
// Typed adapters over the document store. Every write is an idempotent
// upsert or partial update keyed by the entity's primary id. Range
// filters compare millisecond-truncated timestamps.

mod collection;
mod memory;
mod opensearch;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::error::CoreError;
use crate::model::{
    CloseRequest, FaultCausalObject, FaultCausalRelation, FaultPointObject, FaultPointRelation,
    Problem, RawEvent, RcaStatus,
};

pub use memory::MemoryStore;
pub use opensearch::SearchStore;

// ── Index names ──────────────────────────────────────────────────────

pub const RAW_EVENT_INDEX: &str = "itops_raw_event";
pub const FAULT_POINT_INDEX: &str = "itops_fault_point";
pub const FAULT_POINT_RELATION_INDEX: &str = "itops_fault_point_relation";
pub const PROBLEM_INDEX: &str = "itops_problem";
pub const FAULT_CAUSAL_INDEX: &str = "itops_fault_causal";
pub const FAULT_CAUSAL_RELATION_INDEX: &str = "itops_fault_causal_relation";

/// Upper bound on documents returned by one query.
pub const MAX_QUERY_SIZE: usize = 1000;

// ── Repositories ─────────────────────────────────────────────────────

#[async_trait]
pub trait RawEventRepository: Send + Sync {
    async fn upsert(&self, event: &RawEvent) -> Result<(), CoreError>;
    async fn update_fault_id(&self, event_ids: &[u64], fault_id: u64) -> Result<(), CoreError>;
    async fn update_problem_id(&self, event_ids: &[u64], problem_id: u64) -> Result<(), CoreError>;
    /// Missing ids are omitted; order follows `ids`.
    async fn find_by_ids(&self, ids: &[u64]) -> Result<Vec<RawEvent>, CoreError>;
    /// Events carrying the upstream `event_provider_id`, newest first.
    async fn find_by_provider_id(&self, provider_id: u64) -> Result<Vec<RawEvent>, CoreError>;
}

#[async_trait]
pub trait FaultPointRepository: Send + Sync {
    async fn upsert(&self, fault: &FaultPointObject) -> Result<(), CoreError>;
    async fn find_by_ids(&self, ids: &[u64]) -> Result<Vec<FaultPointObject>, CoreError>;
    /// Open faults for `(entity, mode)`, most recently updated first.
    async fn find_open_by_entity_and_mode(
        &self,
        entity_object_id: &str,
        fault_mode: &str,
    ) -> Result<Vec<FaultPointObject>, CoreError>;
    /// Open faults whose `fault_latest_time` is strictly before `cutoff`.
    async fn find_open_expired(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<FaultPointObject>, CoreError>;
    async fn update_problem_id(&self, fault_ids: &[u64], problem_id: u64) -> Result<(), CoreError>;
    async fn make_expired(&self, fault_ids: &[u64], now: DateTime<Utc>) -> Result<(), CoreError>;
    /// Write the recovery fields of `fault` (status, recover time,
    /// duration, event ids, update time) without touching the rest.
    async fn make_recovered(&self, fault: &FaultPointObject) -> Result<(), CoreError>;
}

#[async_trait]
pub trait FaultPointRelationRepository: Send + Sync {
    async fn upsert(&self, relation: &FaultPointRelation) -> Result<(), CoreError>;
}

#[async_trait]
pub trait ProblemRepository: Send + Sync {
    async fn upsert(&self, problem: &Problem) -> Result<(), CoreError>;
    async fn find_by_ids(&self, ids: &[u64]) -> Result<Vec<Problem>, CoreError>;
    /// Open problems touching any of `entity_ids` whose latest time lies
    /// within `[from, to]`.
    async fn find_correlated(
        &self,
        entity_ids: &[String],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Problem>, CoreError>;
    /// Open problems still awaiting analysis that occurred at or before
    /// `occurred_before`, oldest first.
    async fn find_pending_rca(
        &self,
        occurred_before: DateTime<Utc>,
    ) -> Result<Vec<Problem>, CoreError>;
    /// Open problems whose latest time is strictly before `cutoff`.
    async fn find_open_expired(&self, cutoff: DateTime<Utc>) -> Result<Vec<Problem>, CoreError>;
    async fn update_rca(&self, problem_id: u64, update: &RcaUpdate) -> Result<(), CoreError>;
    async fn update_root_cause(
        &self,
        problem_id: u64,
        object_id: &str,
        fault_id: u64,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError>;
    async fn mark_closed(
        &self,
        problem_id: u64,
        close: &CloseRequest,
        close_time: DateTime<Utc>,
        duration: u64,
    ) -> Result<(), CoreError>;
    /// Empty the relation sets of a problem absorbed by a merge.
    async fn clear_merged_problem_data(
        &self,
        problem_id: u64,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError>;
}

#[async_trait]
pub trait FaultCausalRepository: Send + Sync {
    async fn upsert(&self, causal: &FaultCausalObject) -> Result<(), CoreError>;
    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<FaultCausalObject>, CoreError>;
}

#[async_trait]
pub trait FaultCausalRelationRepository: Send + Sync {
    async fn upsert(&self, relation: &FaultCausalRelation) -> Result<(), CoreError>;
    /// Edges from `source` to `target`, any class.
    async fn find_by_entity_pair(
        &self,
        source_object_id: &str,
        target_object_id: &str,
    ) -> Result<Vec<FaultCausalRelation>, CoreError>;
}

// ── Partial updates ──────────────────────────────────────────────────

/// Analysis fields written to a problem. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RcaUpdate {
    pub rca_status: RcaStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rca_start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rca_end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rca_results: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_cause_object_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_cause_fault_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem_description: Option<String>,
}

impl RcaUpdate {
    pub fn status(rca_status: RcaStatus) -> Self {
        Self {
            rca_status,
            ..Self::default()
        }
    }

    pub(crate) fn apply(&self, problem: &mut Problem) {
        problem.rca_status = self.rca_status;
        if let Some(t) = self.rca_start_time {
            problem.rca_start_time = Some(t);
        }
        if let Some(t) = self.rca_end_time {
            problem.rca_end_time = Some(t);
        }
        if let Some(results) = &self.rca_results {
            problem.rca_results.clone_from(results);
        }
        if let Some(object_id) = &self.root_cause_object_id {
            problem.root_cause_object_id.clone_from(object_id);
        }
        if let Some(fault_id) = self.root_cause_fault_id {
            problem.root_cause_fault_id = fault_id;
        }
        if let Some(name) = &self.problem_name {
            problem.problem_name.clone_from(name);
        }
        if let Some(description) = &self.problem_description {
            problem.problem_description.clone_from(description);
        }
    }
}

// ── Factory ──────────────────────────────────────────────────────────

/// One handle per index, shared by every engine.
#[derive(Clone)]
pub struct Repositories {
    pub raw_events: Arc<dyn RawEventRepository>,
    pub fault_points: Arc<dyn FaultPointRepository>,
    pub fault_point_relations: Arc<dyn FaultPointRelationRepository>,
    pub problems: Arc<dyn ProblemRepository>,
    pub fault_causals: Arc<dyn FaultCausalRepository>,
    pub fault_causal_relations: Arc<dyn FaultCausalRelationRepository>,
}

impl Repositories {
    /// Process-local store; state is lost on restart.
    pub fn memory() -> Self {
        Self::from_store(Arc::new(MemoryStore::new()))
    }

    pub fn opensearch(client: itops_alert_api::SearchClient) -> Self {
        Self::from_store(Arc::new(SearchStore::new(client)))
    }

    /// Use one backend for every index.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: RawEventRepository
            + FaultPointRepository
            + FaultPointRelationRepository
            + ProblemRepository
            + FaultCausalRepository
            + FaultCausalRelationRepository
            + 'static,
    {
        Self {
            raw_events: Arc::clone(&store) as Arc<dyn RawEventRepository>,
            fault_points: Arc::clone(&store) as Arc<dyn FaultPointRepository>,
            fault_point_relations: Arc::clone(&store) as Arc<dyn FaultPointRelationRepository>,
            problems: Arc::clone(&store) as Arc<dyn ProblemRepository>,
            fault_causals: Arc::clone(&store) as Arc<dyn FaultCausalRepository>,
            fault_causal_relations: store as Arc<dyn FaultCausalRelationRepository>,
        }
    }
}

impl std::fmt::Debug for Repositories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repositories").finish_non_exhaustive()
    }
}

// ── Time helpers ─────────────────────────────────────────────────────

/// Range-filter representation: RFC 3339 with millisecond precision.
pub(crate) fn range_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Millisecond-truncated instant used by the in-memory range filters.
pub(crate) fn millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn range_time_truncates_to_millis() {
        let t = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap()
            + chrono::Duration::nanoseconds(1_234_567);
        assert_eq!(range_time(t), "2025-06-01T10:00:00.001Z");
        assert_eq!(millis(t) % 1000, 1);
    }

    #[test]
    fn rca_update_only_touches_present_fields() {
        let mut problem = Problem {
            problem_name: "disk".into(),
            root_cause_object_id: "h1".into(),
            ..Problem::default()
        };
        let update = RcaUpdate {
            root_cause_fault_id: Some(7),
            ..RcaUpdate::status(RcaStatus::Success)
        };
        update.apply(&mut problem);
        assert_eq!(problem.rca_status, RcaStatus::Success);
        assert_eq!(problem.root_cause_fault_id, 7);
        assert_eq!(problem.root_cause_object_id, "h1");
        assert_eq!(problem.problem_name, "disk");

        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, serde_json::json!({ "rca_status": 3, "root_cause_fault_id": 7 }));
    }
}
