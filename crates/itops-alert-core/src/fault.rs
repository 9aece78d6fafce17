// ── Fault engine ──
//
// Collapses raw events into fault points keyed by `(entity, fault_mode)`
// and expires stale ones. Every new or changed fault point is forwarded
// to the problem engine.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::idgen::IdGenerator;
use crate::ingest::EventHandler;
use crate::model::{
    EventStatus, FAULT_POINT_CLASS, FaultPointObject, FaultPointRelation, FaultStatus,
    HAS_RELATION_WITH, RawEvent,
};
use crate::store::Repositories;

/// Downstream of the fault engine.
#[async_trait]
pub trait ProblemHandler: Send + Sync {
    async fn handle_fault_point(&self, fault: FaultPointObject) -> Result<(), CoreError>;
    async fn handle_fault_point_recovered(&self, fault_id: u64) -> Result<(), CoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultEngineConfig {
    /// `None` disables the expiration sweep.
    pub expiration: Option<Duration>,
}

impl Default for FaultEngineConfig {
    fn default() -> Self {
        Self {
            expiration: Some(Duration::from_secs(10 * 60)),
        }
    }
}

pub struct FaultEngine {
    repos: Repositories,
    ids: Arc<IdGenerator>,
    problems: Arc<dyn ProblemHandler>,
    config: FaultEngineConfig,
}

impl FaultEngine {
    pub fn new(
        repos: Repositories,
        ids: Arc<IdGenerator>,
        problems: Arc<dyn ProblemHandler>,
        config: FaultEngineConfig,
    ) -> Self {
        Self {
            repos,
            ids,
            problems,
            config,
        }
    }

    /// Apply one persisted event. Returns the fault point it landed on.
    pub async fn handle_event_at(
        &self,
        event: &RawEvent,
        now: DateTime<Utc>,
    ) -> Result<Option<FaultPointObject>, CoreError> {
        if !event.has_entity() {
            debug!(event_id = event.event_id, "event has no entity, not correlated");
            return Ok(None);
        }
        let open = self.find_open(event, now).await?;
        match event.event_status {
            EventStatus::Occurred => self.on_occurred(event, open, now).await.map(Some),
            EventStatus::Recovered => self.on_recovered(event, open, now).await,
        }
    }

    /// The open fault for the event's `(entity, mode)`. Duplicates left by
    /// a race are expired, keeping the most recently updated one.
    async fn find_open(
        &self,
        event: &RawEvent,
        now: DateTime<Utc>,
    ) -> Result<Option<FaultPointObject>, CoreError> {
        let mut open = self
            .repos
            .fault_points
            .find_open_by_entity_and_mode(&event.entity_object_id, event.fault_mode())
            .await?;
        if open.len() > 1 {
            open.sort_by(|a, b| b.fault_update_time.cmp(&a.fault_update_time));
            let stale: Vec<u64> = open[1..].iter().map(|f| f.fault_id).collect();
            warn!(
                entity = %event.entity_object_id,
                fault_mode = event.fault_mode(),
                kept = open[0].fault_id,
                ?stale,
                "duplicate open fault points, expiring extras"
            );
            self.repos.fault_points.make_expired(&stale, now).await?;
        }
        Ok(open.into_iter().next())
    }

    async fn on_occurred(
        &self,
        event: &RawEvent,
        open: Option<FaultPointObject>,
        now: DateTime<Utc>,
    ) -> Result<FaultPointObject, CoreError> {
        let fault = match open {
            Some(mut fault) => {
                fault.relation_event_ids.insert(event.event_id);
                fault.fault_latest_time = fault.fault_latest_time.max(event.event_timestamp);
                fault.refresh_duration(fault.fault_latest_time);
                fault.fault_update_time = now;
                fault.fault_level = fault.fault_level.min(event.event_level);
                self.repos.fault_points.upsert(&fault).await?;
                debug!(
                    fault_id = fault.fault_id,
                    event_id = event.event_id,
                    "event joined open fault"
                );
                fault
            }
            None => {
                let fault = self.create_fault(event, now)?;
                self.repos.fault_points.upsert(&fault).await?;
                self.repos
                    .fault_point_relations
                    .upsert(&self.entity_relation(&fault, now)?)
                    .await?;
                info!(
                    fault_id = fault.fault_id,
                    entity = %fault.entity_object_id,
                    fault_mode = %fault.fault_mode,
                    "fault point opened"
                );
                fault
            }
        };

        self.repos
            .raw_events
            .update_fault_id(&[event.event_id], fault.fault_id)
            .await?;
        self.problems.handle_fault_point(fault.clone()).await?;
        Ok(fault)
    }

    async fn on_recovered(
        &self,
        event: &RawEvent,
        open: Option<FaultPointObject>,
        now: DateTime<Utc>,
    ) -> Result<Option<FaultPointObject>, CoreError> {
        let open = match open {
            Some(fault) => Some(fault),
            None => self.find_by_recovery_id(event).await?,
        };
        let Some(mut fault) = open else {
            debug!(event_id = event.event_id, "recovery without open fault");
            return Ok(None);
        };

        fault.fault_status = FaultStatus::Recovered;
        fault.fault_recover_time = Some(event.event_timestamp);
        fault.refresh_duration(event.event_timestamp);
        fault.relation_event_ids.insert(event.event_id);
        fault.fault_update_time = now;
        self.repos.fault_points.make_recovered(&fault).await?;

        self.repos
            .raw_events
            .update_fault_id(&[event.event_id], fault.fault_id)
            .await?;
        if fault.problem_id != 0 {
            self.repos
                .raw_events
                .update_problem_id(&[event.event_id], fault.problem_id)
                .await?;
        }
        info!(
            fault_id = fault.fault_id,
            duration_secs = fault.fault_duration_time,
            "fault point recovered"
        );

        self.problems
            .handle_fault_point_recovered(fault.fault_id)
            .await?;
        Ok(Some(fault))
    }

    /// Open fault holding the event whose provider id the recovery names.
    async fn find_by_recovery_id(
        &self,
        event: &RawEvent,
    ) -> Result<Option<FaultPointObject>, CoreError> {
        if event.recovery_id == 0 {
            return Ok(None);
        }
        let originals = self
            .repos
            .raw_events
            .find_by_provider_id(event.recovery_id)
            .await?;
        let fault_ids: Vec<u64> = originals
            .iter()
            .map(|e| e.fault_id)
            .filter(|id| *id != 0)
            .collect();
        let faults = self.repos.fault_points.find_by_ids(&fault_ids).await?;
        Ok(faults.into_iter().find(FaultPointObject::is_open))
    }

    fn create_fault(
        &self,
        event: &RawEvent,
        now: DateTime<Utc>,
    ) -> Result<FaultPointObject, CoreError> {
        Ok(FaultPointObject {
            fault_id: self.ids.next_id()?,
            fault_name: event.event_title.clone(),
            fault_create_time: now,
            fault_update_time: now,
            fault_status: FaultStatus::Occurred,
            fault_occur_time: event.event_timestamp,
            fault_latest_time: event.event_timestamp,
            fault_duration_time: 0,
            fault_recover_time: None,
            entity_object_class: event.entity_object_class.clone(),
            entity_object_name: event.entity_object_name.clone(),
            entity_object_id: event.entity_object_id.clone(),
            relation_event_ids: std::iter::once(event.event_id).collect(),
            fault_mode: event.fault_mode().to_owned(),
            fault_level: event.event_level,
            fault_description: event.event_content.clone(),
            problem_id: 0,
        })
    }

    fn entity_relation(
        &self,
        fault: &FaultPointObject,
        now: DateTime<Utc>,
    ) -> Result<FaultPointRelation, CoreError> {
        Ok(FaultPointRelation {
            relation_id: self.ids.next_id()?,
            relation_class: HAS_RELATION_WITH.to_owned(),
            relation_create_time: now,
            relation_update_time: now,
            source_object_id: fault.entity_object_id.clone(),
            source_object_class: fault.entity_object_class.clone(),
            target_object_id: fault.fault_id.to_string(),
            target_object_class: FAULT_POINT_CLASS.to_owned(),
        })
    }

    // ── Expiration ───────────────────────────────────────────────────

    /// Expire open faults idle longer than the configured timeout.
    /// Returns the number expired.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<usize, CoreError> {
        let Some(timeout) = self.config.expiration else {
            return Ok(0);
        };
        let cutoff = now - chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::zero());
        let stale = self.repos.fault_points.find_open_expired(cutoff).await?;
        if stale.is_empty() {
            return Ok(0);
        }

        let ids: Vec<u64> = stale.iter().map(|f| f.fault_id).collect();
        self.repos.fault_points.make_expired(&ids, now).await?;
        info!(count = ids.len(), "fault points expired");

        for fault in stale.iter().filter(|f| f.problem_id != 0) {
            if let Err(e) = self.problems.handle_fault_point_recovered(fault.fault_id).await {
                warn!(fault_id = fault.fault_id, error = %e, "problem re-evaluation failed");
            }
        }
        Ok(ids.len())
    }

    pub async fn sweep(&self) -> Result<usize, CoreError> {
        self.sweep_at(Utc::now()).await
    }
}

#[async_trait]
impl EventHandler for FaultEngine {
    async fn handle_event(&self, event: &RawEvent) -> Result<(), CoreError> {
        self.handle_event_at(event, Utc::now()).await.map(|_| ())
    }
}

impl std::fmt::Debug for FaultEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
