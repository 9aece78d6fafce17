// ── Search-index repositories ──
//
// Each repository maps onto one index. Full writes use `_doc`, targeted
// updates use `_update`/`_bulk` partial documents, and queries are bool
// filters with term and range clauses.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use itops_alert_api::SearchClient;
use serde_json::{Value, json};
use tracing::debug;

use super::{
    FAULT_CAUSAL_INDEX, FAULT_CAUSAL_RELATION_INDEX, FAULT_POINT_INDEX, FAULT_POINT_RELATION_INDEX,
    FaultCausalRelationRepository, FaultCausalRepository, FaultPointRelationRepository,
    FaultPointRepository, MAX_QUERY_SIZE, PROBLEM_INDEX, ProblemRepository, RAW_EVENT_INDEX,
    RawEventRepository, RcaUpdate, range_time,
};
use crate::error::CoreError;
use crate::model::{
    CloseRequest, FaultCausalObject, FaultCausalRelation, FaultPointObject, FaultPointRelation,
    FaultStatus, Problem, ProblemStatus, RawEvent, RcaStatus,
};

pub struct SearchStore {
    client: SearchClient,
}

impl SearchStore {
    pub fn new(client: SearchClient) -> Self {
        Self { client }
    }

    async fn partial(&self, index: &str, id: u64, doc: Value) -> Result<(), CoreError> {
        self.client
            .update_document(index, &id.to_string(), &doc)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    CoreError::not_found(index_entity(index), id)
                } else {
                    e.into()
                }
            })
    }

    async fn partial_many(&self, index: &str, ids: &[u64], doc: &Value) -> Result<(), CoreError> {
        let updates: Vec<(String, Value)> = ids
            .iter()
            .map(|id| (id.to_string(), doc.clone()))
            .collect();
        self.client.bulk_update(index, &updates).await?;
        Ok(())
    }
}

impl std::fmt::Debug for SearchStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchStore").finish_non_exhaustive()
    }
}

fn index_entity(index: &str) -> &'static str {
    match index {
        PROBLEM_INDEX => "problem",
        FAULT_POINT_INDEX => "fault point",
        RAW_EVENT_INDEX => "raw event",
        _ => "document",
    }
}

fn id_strings(ids: &[u64]) -> Vec<String> {
    ids.iter().map(u64::to_string).collect()
}

/// `{"size": .., "query": {"bool": {"filter": filters}}, "sort": sort}`
fn filtered(filters: Vec<Value>, sort: Value) -> Value {
    json!({
        "size": MAX_QUERY_SIZE,
        "query": { "bool": { "filter": filters } },
        "sort": sort,
    })
}

// ── Raw events ───────────────────────────────────────────────────────

#[async_trait]
impl RawEventRepository for SearchStore {
    async fn upsert(&self, event: &RawEvent) -> Result<(), CoreError> {
        self.client
            .index_document(RAW_EVENT_INDEX, &event.event_id.to_string(), event)
            .await?;
        Ok(())
    }

    async fn update_fault_id(&self, event_ids: &[u64], fault_id: u64) -> Result<(), CoreError> {
        self.partial_many(RAW_EVENT_INDEX, event_ids, &json!({ "fault_id": fault_id }))
            .await
    }

    async fn update_problem_id(&self, event_ids: &[u64], problem_id: u64) -> Result<(), CoreError> {
        self.partial_many(RAW_EVENT_INDEX, event_ids, &json!({ "problem_id": problem_id }))
            .await
    }

    async fn find_by_ids(&self, ids: &[u64]) -> Result<Vec<RawEvent>, CoreError> {
        Ok(self.client.mget(RAW_EVENT_INDEX, &id_strings(ids)).await?)
    }

    async fn find_by_provider_id(&self, provider_id: u64) -> Result<Vec<RawEvent>, CoreError> {
        let body = filtered(
            vec![json!({ "term": { "event_provider_id": provider_id } })],
            json!([{ "event_timestamp": { "order": "desc" } }]),
        );
        Ok(self.client.search(RAW_EVENT_INDEX, &body).await?)
    }
}

// ── Fault points ─────────────────────────────────────────────────────

#[async_trait]
impl FaultPointRepository for SearchStore {
    async fn upsert(&self, fault: &FaultPointObject) -> Result<(), CoreError> {
        self.client
            .index_document(FAULT_POINT_INDEX, &fault.fault_id.to_string(), fault)
            .await?;
        Ok(())
    }

    async fn find_by_ids(&self, ids: &[u64]) -> Result<Vec<FaultPointObject>, CoreError> {
        Ok(self.client.mget(FAULT_POINT_INDEX, &id_strings(ids)).await?)
    }

    async fn find_open_by_entity_and_mode(
        &self,
        entity_object_id: &str,
        fault_mode: &str,
    ) -> Result<Vec<FaultPointObject>, CoreError> {
        let body = filtered(
            vec![
                json!({ "term": { "entity_object_id": entity_object_id } }),
                json!({ "term": { "fault_mode": fault_mode } }),
                json!({ "term": { "fault_status": FaultStatus::Occurred.code() } }),
            ],
            json!([{ "fault_update_time": { "order": "desc" } }]),
        );
        Ok(self.client.search(FAULT_POINT_INDEX, &body).await?)
    }

    async fn find_open_expired(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<FaultPointObject>, CoreError> {
        let body = filtered(
            vec![
                json!({ "term": { "fault_status": FaultStatus::Occurred.code() } }),
                json!({ "range": { "fault_latest_time": { "lt": range_time(cutoff) } } }),
            ],
            json!([{ "fault_latest_time": { "order": "asc" } }]),
        );
        Ok(self.client.search(FAULT_POINT_INDEX, &body).await?)
    }

    async fn update_problem_id(&self, fault_ids: &[u64], problem_id: u64) -> Result<(), CoreError> {
        self.partial_many(FAULT_POINT_INDEX, fault_ids, &json!({ "problem_id": problem_id }))
            .await
    }

    async fn make_expired(&self, fault_ids: &[u64], now: DateTime<Utc>) -> Result<(), CoreError> {
        // Duration depends on each document's own times.
        let faults = FaultPointRepository::find_by_ids(self, fault_ids).await?;
        let updates: Vec<(String, Value)> = faults
            .iter()
            .map(|f| {
                (
                    f.fault_id.to_string(),
                    json!({
                        "fault_status": FaultStatus::Expired,
                        "fault_update_time": now,
                        "fault_duration_time": (f.fault_latest_time - f.fault_occur_time).num_seconds(),
                    }),
                )
            })
            .collect();
        debug!(count = updates.len(), "expiring fault points");
        self.client.bulk_update(FAULT_POINT_INDEX, &updates).await?;
        Ok(())
    }

    async fn make_recovered(&self, fault: &FaultPointObject) -> Result<(), CoreError> {
        let doc = json!({
            "fault_status": fault.fault_status,
            "fault_recover_time": fault.fault_recover_time,
            "fault_duration_time": fault.fault_duration_time,
            "fault_update_time": fault.fault_update_time,
            "relation_event_ids": fault.relation_event_ids,
        });
        self.partial(FAULT_POINT_INDEX, fault.fault_id, doc).await
    }
}

#[async_trait]
impl FaultPointRelationRepository for SearchStore {
    async fn upsert(&self, relation: &FaultPointRelation) -> Result<(), CoreError> {
        self.client
            .index_document(
                FAULT_POINT_RELATION_INDEX,
                &relation.relation_id.to_string(),
                relation,
            )
            .await?;
        Ok(())
    }
}

// ── Problems ─────────────────────────────────────────────────────────

#[async_trait]
impl ProblemRepository for SearchStore {
    async fn upsert(&self, problem: &Problem) -> Result<(), CoreError> {
        self.client
            .index_document(PROBLEM_INDEX, &problem.problem_id.to_string(), problem)
            .await?;
        Ok(())
    }

    async fn find_by_ids(&self, ids: &[u64]) -> Result<Vec<Problem>, CoreError> {
        Ok(self.client.mget(PROBLEM_INDEX, &id_strings(ids)).await?)
    }

    async fn find_correlated(
        &self,
        entity_ids: &[String],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Problem>, CoreError> {
        if entity_ids.is_empty() {
            return Ok(Vec::new());
        }
        let body = filtered(
            vec![
                json!({ "term": { "problem_status": ProblemStatus::Open.code() } }),
                json!({ "terms": { "affected_entity_ids": entity_ids } }),
                json!({ "range": { "problem_latest_time": {
                    "gte": range_time(from),
                    "lte": range_time(to),
                } } }),
            ],
            json!([{ "problem_id": { "order": "asc" } }]),
        );
        Ok(self.client.search(PROBLEM_INDEX, &body).await?)
    }

    async fn find_pending_rca(
        &self,
        occurred_before: DateTime<Utc>,
    ) -> Result<Vec<Problem>, CoreError> {
        let body = json!({
            "size": MAX_QUERY_SIZE,
            "query": { "bool": {
                "filter": [
                    { "term": { "problem_status": ProblemStatus::Open.code() } },
                    { "term": { "rca_status": u8::from(RcaStatus::Pending) } },
                    { "range": { "problem_occur_time": { "lte": range_time(occurred_before) } } },
                ],
                "must_not": [
                    { "range": { "root_cause_fault_id": { "gt": 0 } } },
                ],
            } },
            "sort": [{ "problem_occur_time": { "order": "asc" } }],
        });
        Ok(self.client.search(PROBLEM_INDEX, &body).await?)
    }

    async fn find_open_expired(&self, cutoff: DateTime<Utc>) -> Result<Vec<Problem>, CoreError> {
        let body = filtered(
            vec![
                json!({ "term": { "problem_status": ProblemStatus::Open.code() } }),
                json!({ "range": { "problem_latest_time": { "lt": range_time(cutoff) } } }),
            ],
            json!([{ "problem_latest_time": { "order": "asc" } }]),
        );
        Ok(self.client.search(PROBLEM_INDEX, &body).await?)
    }

    async fn update_rca(&self, problem_id: u64, update: &RcaUpdate) -> Result<(), CoreError> {
        self.partial(PROBLEM_INDEX, problem_id, serde_json::to_value(update)?)
            .await
    }

    async fn update_root_cause(
        &self,
        problem_id: u64,
        object_id: &str,
        fault_id: u64,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let doc = json!({
            "root_cause_object_id": object_id,
            "root_cause_fault_id": fault_id,
            "problem_update_time": now,
        });
        self.partial(PROBLEM_INDEX, problem_id, doc).await
    }

    async fn mark_closed(
        &self,
        problem_id: u64,
        close: &CloseRequest,
        close_time: DateTime<Utc>,
        duration: u64,
    ) -> Result<(), CoreError> {
        let doc = json!({
            "problem_status": close.state,
            "problem_close_type": close.close_type,
            "problem_close_notes": close.notes,
            "problem_closed_by": close.closed_by,
            "problem_close_time": close_time,
            "problem_update_time": close_time,
            "problem_duration": duration,
        });
        self.partial(PROBLEM_INDEX, problem_id, doc).await
    }

    async fn clear_merged_problem_data(
        &self,
        problem_id: u64,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let doc = json!({
            "relation_fp_ids": [],
            "relation_event_ids": [],
            "affected_entity_ids": [],
            "problem_status": ProblemStatus::Merged,
            "problem_update_time": now,
        });
        self.partial(PROBLEM_INDEX, problem_id, doc).await
    }
}

// ── Causal graph ─────────────────────────────────────────────────────

#[async_trait]
impl FaultCausalRepository for SearchStore {
    async fn upsert(&self, causal: &FaultCausalObject) -> Result<(), CoreError> {
        self.client
            .index_document(FAULT_CAUSAL_INDEX, &causal.causal_id, causal)
            .await?;
        Ok(())
    }

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<FaultCausalObject>, CoreError> {
        Ok(self.client.mget(FAULT_CAUSAL_INDEX, ids).await?)
    }
}

#[async_trait]
impl FaultCausalRelationRepository for SearchStore {
    async fn upsert(&self, relation: &FaultCausalRelation) -> Result<(), CoreError> {
        self.client
            .index_document(FAULT_CAUSAL_RELATION_INDEX, &relation.relation_id, relation)
            .await?;
        Ok(())
    }

    async fn find_by_entity_pair(
        &self,
        source_object_id: &str,
        target_object_id: &str,
    ) -> Result<Vec<FaultCausalRelation>, CoreError> {
        let body = filtered(
            vec![
                json!({ "term": { "source_object_id": source_object_id } }),
                json!({ "term": { "target_object_id": target_object_id } }),
            ],
            json!([{ "relation_update_time": { "order": "desc" } }]),
        );
        Ok(self.client.search(FAULT_CAUSAL_RELATION_INDEX, &body).await?)
    }
}
