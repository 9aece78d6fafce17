// ── In-memory repositories ──

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::collection::DocumentCollection;
use super::{
    FaultCausalRelationRepository, FaultCausalRepository, FaultPointRelationRepository,
    FaultPointRepository, ProblemRepository, RawEventRepository, RcaUpdate, millis,
};
use crate::error::CoreError;
use crate::model::{
    CloseRequest, FaultCausalObject, FaultCausalRelation, FaultPointObject, FaultPointRelation,
    FaultStatus, Problem, ProblemStatus, RawEvent, RcaStatus,
};

/// Every index held in process memory.
pub struct MemoryStore {
    raw_events: DocumentCollection<u64, RawEvent>,
    fault_points: DocumentCollection<u64, FaultPointObject>,
    fault_point_relations: DocumentCollection<u64, FaultPointRelation>,
    problems: DocumentCollection<u64, Problem>,
    fault_causals: DocumentCollection<String, FaultCausalObject>,
    fault_causal_relations: DocumentCollection<String, FaultCausalRelation>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            raw_events: DocumentCollection::new(),
            fault_points: DocumentCollection::new(),
            fault_point_relations: DocumentCollection::new(),
            problems: DocumentCollection::new(),
            fault_causals: DocumentCollection::new(),
            fault_causal_relations: DocumentCollection::new(),
        }
    }

    /// Document counts per index, in index order.
    pub fn counts(&self) -> [usize; 6] {
        [
            self.raw_events.len(),
            self.fault_points.len(),
            self.fault_point_relations.len(),
            self.problems.len(),
            self.fault_causals.len(),
            self.fault_causal_relations.len(),
        ]
    }

    fn update_problem<F>(&self, problem_id: u64, f: F) -> Result<(), CoreError>
    where
        F: FnOnce(&mut Problem),
    {
        if self.problems.update(&problem_id, f) {
            Ok(())
        } else {
            Err(CoreError::not_found("problem", problem_id))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("raw_events", &self.raw_events.len())
            .field("fault_points", &self.fault_points.len())
            .field("problems", &self.problems.len())
            .finish_non_exhaustive()
    }
}

// ── Raw events ───────────────────────────────────────────────────────

#[async_trait]
impl RawEventRepository for MemoryStore {
    async fn upsert(&self, event: &RawEvent) -> Result<(), CoreError> {
        self.raw_events.upsert(event.event_id, event.clone());
        Ok(())
    }

    async fn update_fault_id(&self, event_ids: &[u64], fault_id: u64) -> Result<(), CoreError> {
        for id in event_ids {
            self.raw_events.update(id, |e| e.fault_id = fault_id);
        }
        Ok(())
    }

    async fn update_problem_id(&self, event_ids: &[u64], problem_id: u64) -> Result<(), CoreError> {
        for id in event_ids {
            self.raw_events.update(id, |e| e.problem_id = problem_id);
        }
        Ok(())
    }

    async fn find_by_ids(&self, ids: &[u64]) -> Result<Vec<RawEvent>, CoreError> {
        Ok(self.raw_events.get_many(ids))
    }

    async fn find_by_provider_id(&self, provider_id: u64) -> Result<Vec<RawEvent>, CoreError> {
        let mut events = self
            .raw_events
            .filter(|e| e.event_provider_id == provider_id);
        events.sort_by(|a, b| b.event_timestamp.cmp(&a.event_timestamp));
        Ok(events)
    }
}

// ── Fault points ─────────────────────────────────────────────────────

#[async_trait]
impl FaultPointRepository for MemoryStore {
    async fn upsert(&self, fault: &FaultPointObject) -> Result<(), CoreError> {
        self.fault_points.upsert(fault.fault_id, fault.clone());
        Ok(())
    }

    async fn find_by_ids(&self, ids: &[u64]) -> Result<Vec<FaultPointObject>, CoreError> {
        Ok(self.fault_points.get_many(ids))
    }

    async fn find_open_by_entity_and_mode(
        &self,
        entity_object_id: &str,
        fault_mode: &str,
    ) -> Result<Vec<FaultPointObject>, CoreError> {
        let mut open = self.fault_points.filter(|f| {
            f.is_open() && f.entity_object_id == entity_object_id && f.fault_mode == fault_mode
        });
        open.sort_by(|a, b| b.fault_update_time.cmp(&a.fault_update_time));
        Ok(open)
    }

    async fn find_open_expired(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<FaultPointObject>, CoreError> {
        let cutoff = millis(cutoff);
        let mut stale = self
            .fault_points
            .filter(|f| f.is_open() && millis(f.fault_latest_time) < cutoff);
        stale.sort_by_key(|f| f.fault_latest_time);
        Ok(stale)
    }

    async fn update_problem_id(&self, fault_ids: &[u64], problem_id: u64) -> Result<(), CoreError> {
        for id in fault_ids {
            self.fault_points.update(id, |f| f.problem_id = problem_id);
        }
        Ok(())
    }

    async fn make_expired(&self, fault_ids: &[u64], now: DateTime<Utc>) -> Result<(), CoreError> {
        for id in fault_ids {
            self.fault_points.update(id, |f| {
                f.fault_status = FaultStatus::Expired;
                f.fault_update_time = now;
                f.refresh_duration(f.fault_latest_time);
            });
        }
        Ok(())
    }

    async fn make_recovered(&self, fault: &FaultPointObject) -> Result<(), CoreError> {
        let updated = self.fault_points.update(&fault.fault_id, |stored| {
            stored.fault_status = fault.fault_status;
            stored.fault_recover_time = fault.fault_recover_time;
            stored.fault_duration_time = fault.fault_duration_time;
            stored.fault_update_time = fault.fault_update_time;
            stored.relation_event_ids.clone_from(&fault.relation_event_ids);
        });
        if updated {
            Ok(())
        } else {
            Err(CoreError::not_found("fault point", fault.fault_id))
        }
    }
}

#[async_trait]
impl FaultPointRelationRepository for MemoryStore {
    async fn upsert(&self, relation: &FaultPointRelation) -> Result<(), CoreError> {
        self.fault_point_relations
            .upsert(relation.relation_id, relation.clone());
        Ok(())
    }
}

// ── Problems ─────────────────────────────────────────────────────────

#[async_trait]
impl ProblemRepository for MemoryStore {
    async fn upsert(&self, problem: &Problem) -> Result<(), CoreError> {
        self.problems.upsert(problem.problem_id, problem.clone());
        Ok(())
    }

    async fn find_by_ids(&self, ids: &[u64]) -> Result<Vec<Problem>, CoreError> {
        Ok(self.problems.get_many(ids))
    }

    async fn find_correlated(
        &self,
        entity_ids: &[String],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Problem>, CoreError> {
        let (from, to) = (millis(from), millis(to));
        let mut found = self.problems.filter(|p| {
            let latest = millis(p.problem_latest_time);
            p.is_open()
                && latest >= from
                && latest <= to
                && entity_ids.iter().any(|e| p.affected_entity_ids.contains(e))
        });
        found.sort_by_key(|p| p.problem_id);
        Ok(found)
    }

    async fn find_pending_rca(
        &self,
        occurred_before: DateTime<Utc>,
    ) -> Result<Vec<Problem>, CoreError> {
        let cutoff = millis(occurred_before);
        let mut pending = self.problems.filter(|p| {
            p.is_open()
                && p.rca_status == RcaStatus::Pending
                && p.root_cause_fault_id == 0
                && millis(p.problem_occur_time) <= cutoff
        });
        pending.sort_by_key(|p| p.problem_occur_time);
        Ok(pending)
    }

    async fn find_open_expired(&self, cutoff: DateTime<Utc>) -> Result<Vec<Problem>, CoreError> {
        let cutoff = millis(cutoff);
        let mut stale = self
            .problems
            .filter(|p| p.is_open() && millis(p.problem_latest_time) < cutoff);
        stale.sort_by_key(|p| p.problem_latest_time);
        Ok(stale)
    }

    async fn update_rca(&self, problem_id: u64, update: &RcaUpdate) -> Result<(), CoreError> {
        self.update_problem(problem_id, |p| update.apply(p))
    }

    async fn update_root_cause(
        &self,
        problem_id: u64,
        object_id: &str,
        fault_id: u64,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        self.update_problem(problem_id, |p| {
            p.root_cause_object_id = object_id.to_owned();
            p.root_cause_fault_id = fault_id;
            p.problem_update_time = now;
        })
    }

    async fn mark_closed(
        &self,
        problem_id: u64,
        close: &CloseRequest,
        close_time: DateTime<Utc>,
        duration: u64,
    ) -> Result<(), CoreError> {
        self.update_problem(problem_id, |p| {
            p.problem_status = close.state;
            p.problem_close_type = Some(close.close_type);
            p.problem_close_notes.clone_from(&close.notes);
            p.problem_closed_by.clone_from(&close.closed_by);
            p.problem_close_time = Some(close_time);
            p.problem_update_time = close_time;
            p.problem_duration = duration;
        })
    }

    async fn clear_merged_problem_data(
        &self,
        problem_id: u64,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        self.update_problem(problem_id, |p| {
            p.relation_fp_ids.clear();
            p.relation_event_ids.clear();
            p.affected_entity_ids.clear();
            p.problem_status = ProblemStatus::Merged;
            p.problem_update_time = now;
        })
    }
}

// ── Causal graph ─────────────────────────────────────────────────────

#[async_trait]
impl FaultCausalRepository for MemoryStore {
    async fn upsert(&self, causal: &FaultCausalObject) -> Result<(), CoreError> {
        self.fault_causals
            .upsert(causal.causal_id.clone(), causal.clone());
        Ok(())
    }

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<FaultCausalObject>, CoreError> {
        Ok(self.fault_causals.get_many(ids))
    }
}

#[async_trait]
impl FaultCausalRelationRepository for MemoryStore {
    async fn upsert(&self, relation: &FaultCausalRelation) -> Result<(), CoreError> {
        self.fault_causal_relations
            .upsert(relation.relation_id.clone(), relation.clone());
        Ok(())
    }

    async fn find_by_entity_pair(
        &self,
        source_object_id: &str,
        target_object_id: &str,
    ) -> Result<Vec<FaultCausalRelation>, CoreError> {
        Ok(self.fault_causal_relations.filter(|r| {
            r.source_object_id == source_object_id && r.target_object_id == target_object_id
        }))
    }
}
