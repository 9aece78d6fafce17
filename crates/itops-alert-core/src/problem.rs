// ── Problem engine ──
//
// Groups fault points into problems by entity adjacency and time window,
// merges problems that new evidence connects, and owns every problem
// state transition. All writes arrive as commands on one channel and are
// applied by a single processor task, together with the expiry sweep.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::{
    COMMAND_CHANNEL_SIZE, CloseSummary, Command, CommandEnvelope, CommandResult, ProblemHandle,
    SetRootCauseRequest,
};
use crate::directory::Directory;
use crate::error::CoreError;
use crate::idgen::IdGenerator;
use crate::model::{
    CloseRequest, EntityRef, FaultCausalObject, FaultCausalRelation, FaultPointObject, FaultStatus,
    Problem, ProblemStatus, RcaCallback, RcaStatus,
};
use crate::store::{RcaUpdate, Repositories};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProblemEngineConfig {
    /// How far apart a fault and a problem's latest evidence may be.
    pub correlation_window: Duration,
    /// Idle time after which an open problem expires; `None` disables.
    pub expiration: Option<Duration>,
    pub sweep_interval: Duration,
}

impl Default for ProblemEngineConfig {
    fn default() -> Self {
        Self {
            correlation_window: Duration::from_secs(5 * 60),
            expiration: Some(Duration::from_secs(30 * 60)),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::days(36_500))
}

pub struct ProblemEngine {
    repos: Repositories,
    ids: Arc<IdGenerator>,
    directory: Arc<dyn Directory>,
    config: ProblemEngineConfig,
    command_tx: mpsc::Sender<CommandEnvelope>,
    command_rx: Mutex<Option<mpsc::Receiver<CommandEnvelope>>>,
}

impl ProblemEngine {
    pub fn new(
        repos: Repositories,
        ids: Arc<IdGenerator>,
        directory: Arc<dyn Directory>,
        config: ProblemEngineConfig,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        Self {
            repos,
            ids,
            directory,
            config,
            command_tx,
            command_rx: Mutex::new(Some(command_rx)),
        }
    }

    /// Sender side used by the fault engine, RCA dispatcher and HTTP API.
    pub fn handle(&self) -> ProblemHandle {
        ProblemHandle::new(self.command_tx.clone())
    }

    pub fn config(&self) -> &ProblemEngineConfig {
        &self.config
    }

    // ── Grouping ─────────────────────────────────────────────────────

    /// Place a new or updated fault point into a problem. Returns the
    /// problem id it now belongs to.
    pub async fn handle_fault_point_at(
        &self,
        fp: &FaultPointObject,
        now: DateTime<Utc>,
    ) -> Result<u64, CoreError> {
        if fp.problem_id != 0 {
            if let Some(problem) = self.load_open(fp.problem_id).await? {
                return self.refresh(problem, fp, now).await;
            }
            debug!(
                fault_id = fp.fault_id,
                problem_id = fp.problem_id,
                "owning problem no longer open, regrouping"
            );
        }

        let candidates = self.candidates(fp).await?;
        let (problem_id, events) = match candidates.len() {
            0 => {
                let problem = self.create(fp, now)?;
                self.repos.problems.upsert(&problem).await?;
                info!(
                    problem_id = problem.problem_id,
                    fault_id = fp.fault_id,
                    "problem opened"
                );
                (problem.problem_id, problem.relation_event_ids)
            }
            1 => {
                let mut problem = candidates.into_iter().next().unwrap_or_default();
                attach(&mut problem, fp, now);
                self.repos.problems.upsert(&problem).await?;
                info!(
                    problem_id = problem.problem_id,
                    fault_id = fp.fault_id,
                    "fault point attached to problem"
                );
                (problem.problem_id, fp.relation_event_ids.clone())
            }
            _ => {
                let survivor = self.merge(candidates, fp, now).await?;
                (survivor.problem_id, survivor.relation_event_ids)
            }
        };

        self.repos
            .fault_points
            .update_problem_id(&[fp.fault_id], problem_id)
            .await?;
        let events: Vec<u64> = events.into_iter().collect();
        self.repos
            .raw_events
            .update_problem_id(&events, problem_id)
            .await?;
        Ok(problem_id)
    }

    async fn load(&self, problem_id: u64) -> Result<Problem, CoreError> {
        self.repos
            .problems
            .find_by_ids(&[problem_id])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::not_found("problem", problem_id))
    }

    async fn load_open(&self, problem_id: u64) -> Result<Option<Problem>, CoreError> {
        let found = self.repos.problems.find_by_ids(&[problem_id]).await?;
        Ok(found.into_iter().find(Problem::is_open))
    }

    /// Open problems touching the fault's entity or a direct neighbour
    /// within the correlation window, smallest id first.
    async fn candidates(&self, fp: &FaultPointObject) -> Result<Vec<Problem>, CoreError> {
        let anchor = EntityRef::new(&fp.entity_object_id, &fp.entity_object_class);
        let mut entities = BTreeSet::from([fp.entity_object_id.clone()]);
        match self.directory.neighbors(&anchor).await {
            Ok(neighbors) => entities.extend(neighbors),
            Err(e) => warn!(
                entity = %fp.entity_object_id,
                error = %e,
                "topology unavailable, correlating on the entity alone"
            ),
        }
        let entities: Vec<String> = entities.into_iter().collect();
        let window = chrono_duration(self.config.correlation_window);
        self.repos
            .problems
            .find_correlated(
                &entities,
                fp.fault_latest_time - window,
                fp.fault_latest_time + window,
            )
            .await
    }

    fn create(&self, fp: &FaultPointObject, now: DateTime<Utc>) -> Result<Problem, CoreError> {
        let mut problem = Problem {
            problem_id: self.ids.next_id()?,
            problem_name: fp.fault_name.clone(),
            problem_create_timestamp: now,
            problem_update_time: now,
            problem_occur_time: fp.fault_occur_time,
            problem_latest_time: fp.fault_latest_time,
            problem_status: ProblemStatus::Open,
            problem_level: fp.fault_level,
            affected_entity_ids: std::iter::once(fp.entity_object_id.clone()).collect(),
            relation_fp_ids: std::iter::once(fp.fault_id).collect(),
            relation_event_ids: fp.relation_event_ids.clone(),
            rca_status: RcaStatus::Pending,
            ..Problem::default()
        };
        problem.problem_duration = problem.duration_until(problem.problem_latest_time);
        Ok(problem)
    }

    /// The fault already belongs to `problem`: fold in its new evidence.
    async fn refresh(
        &self,
        mut problem: Problem,
        fp: &FaultPointObject,
        now: DateTime<Utc>,
    ) -> Result<u64, CoreError> {
        attach(&mut problem, fp, now);
        let fp_ids: Vec<u64> = problem.relation_fp_ids.iter().copied().collect();
        let faults = self.repos.fault_points.find_by_ids(&fp_ids).await?;
        problem.problem_level = faults
            .iter()
            .map(|f| f.fault_level)
            .chain(std::iter::once(fp.fault_level))
            .min()
            .unwrap_or(problem.problem_level);
        self.repos.problems.upsert(&problem).await?;

        let events: Vec<u64> = fp.relation_event_ids.iter().copied().collect();
        self.repos
            .raw_events
            .update_problem_id(&events, problem.problem_id)
            .await?;
        debug!(
            problem_id = problem.problem_id,
            fault_id = fp.fault_id,
            "problem refreshed"
        );
        Ok(problem.problem_id)
    }

    /// Collapse every candidate into the smallest id, then attach `fp`.
    async fn merge(
        &self,
        mut candidates: Vec<Problem>,
        fp: &FaultPointObject,
        now: DateTime<Utc>,
    ) -> Result<Problem, CoreError> {
        candidates.sort_by_key(|p| p.problem_id);
        let absorbed = candidates.split_off(1);
        let Some(mut survivor) = candidates.pop() else {
            return Err(CoreError::Internal("merge without candidates".into()));
        };

        for other in &absorbed {
            survivor
                .relation_fp_ids
                .extend(other.relation_fp_ids.iter().copied());
            survivor
                .relation_event_ids
                .extend(other.relation_event_ids.iter().copied());
            survivor
                .affected_entity_ids
                .extend(other.affected_entity_ids.iter().cloned());
            survivor.problem_occur_time = survivor.problem_occur_time.min(other.problem_occur_time);
            survivor.problem_latest_time =
                survivor.problem_latest_time.max(other.problem_latest_time);
            survivor.problem_level = survivor.problem_level.min(other.problem_level);
        }
        attach(&mut survivor, fp, now);
        self.repos.problems.upsert(&survivor).await?;

        let merged_ids: Vec<u64> = absorbed.iter().map(|p| p.problem_id).collect();
        info!(
            problem_id = survivor.problem_id,
            ?merged_ids,
            fault_id = fp.fault_id,
            "problems merged"
        );

        for other in absorbed {
            self.retire_merged(&other, survivor.problem_id, now).await?;
        }
        Ok(survivor)
    }

    async fn retire_merged(
        &self,
        merged: &Problem,
        survivor_id: u64,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let faults: Vec<u64> = merged.relation_fp_ids.iter().copied().collect();
        let events: Vec<u64> = merged.relation_event_ids.iter().copied().collect();
        self.repos
            .fault_points
            .update_problem_id(&faults, survivor_id)
            .await?;
        self.repos
            .raw_events
            .update_problem_id(&events, survivor_id)
            .await?;
        // Closed before cleared: until the close lands the problem stays
        // open and findable, so a retried merge absorbs it again.
        let close =
            CloseRequest::system(ProblemStatus::Merged, format!("merged into {survivor_id}"));
        self.repos
            .problems
            .mark_closed(merged.problem_id, &close, now, merged.duration_until(now))
            .await?;
        self.repos
            .problems
            .clear_merged_problem_data(merged.problem_id, now)
            .await
    }

    // ── Recovery ─────────────────────────────────────────────────────

    /// Re-evaluate the owning problem after a fault recovered or expired.
    pub async fn handle_fault_point_recovered_at(
        &self,
        fault_id: u64,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let Some(fault) = self
            .repos
            .fault_points
            .find_by_ids(&[fault_id])
            .await?
            .into_iter()
            .next()
        else {
            debug!(fault_id, "recovered fault point not found");
            return Ok(());
        };
        if fault.problem_id == 0 {
            return Ok(());
        }
        let Some(mut problem) = self.load_open(fault.problem_id).await? else {
            return Ok(());
        };

        problem
            .relation_event_ids
            .extend(fault.relation_event_ids.iter().copied());
        problem.problem_update_time = now;
        self.repos.problems.upsert(&problem).await?;

        let fp_ids: Vec<u64> = problem.relation_fp_ids.iter().copied().collect();
        let faults = self.repos.fault_points.find_by_ids(&fp_ids).await?;
        if !faults.iter().all(|f| f.fault_status.is_terminal()) {
            return Ok(());
        }

        let close = if faults.iter().all(|f| f.fault_status == FaultStatus::Expired) {
            CloseRequest::system(ProblemStatus::Expired, "all fault points expired")
        } else {
            CloseRequest::system(ProblemStatus::Closed, "all fault points recovered")
        };
        self.close_problem_at(problem.problem_id, &close, now)
            .await
            .map(|_| ())
    }

    // ── Close ────────────────────────────────────────────────────────

    /// Close an open problem. Fails with `PreconditionViolated` if the
    /// problem is not open.
    pub async fn close_problem_at(
        &self,
        problem_id: u64,
        close: &CloseRequest,
        now: DateTime<Utc>,
    ) -> Result<CloseSummary, CoreError> {
        let problem = self.load(problem_id).await?;
        if !problem.is_open() {
            return Err(CoreError::precondition(format!(
                "problem {problem_id} is {}, not open",
                problem.problem_status
            )));
        }
        if matches!(close.state, ProblemStatus::Open) {
            return Err(CoreError::precondition("close state must not be open"));
        }

        self.repos
            .problems
            .mark_closed(problem_id, close, now, problem.duration_until(now))
            .await?;
        info!(
            problem_id,
            state = %close.state,
            close_type = %close.close_type,
            by = %close.closed_by,
            "problem closed"
        );
        Ok(CloseSummary {
            problem_id,
            status: close.state,
            events_closed: problem.relation_event_ids.len(),
            faults_closed: problem.relation_fp_ids.len(),
        })
    }

    /// Expire open problems idle longer than the configured timeout.
    pub async fn expire_at(&self, now: DateTime<Utc>) -> Result<usize, CoreError> {
        let Some(timeout) = self.config.expiration else {
            return Ok(0);
        };
        let stale = self
            .repos
            .problems
            .find_open_expired(now - chrono_duration(timeout))
            .await?;

        let close = CloseRequest::system(
            ProblemStatus::Expired,
            "no new fault points within the expiration window",
        );
        let mut expired = 0;
        for problem in &stale {
            match self.close_problem_at(problem.problem_id, &close, now).await {
                Ok(_) => expired += 1,
                Err(e) => warn!(
                    problem_id = problem.problem_id,
                    error = %e,
                    "problem expiry failed"
                ),
            }
        }
        if expired > 0 {
            info!(expired, "problems expired");
        }
        Ok(expired)
    }

    // ── Root cause ───────────────────────────────────────────────────

    pub async fn update_root_cause_at(
        &self,
        problem_id: u64,
        request: &SetRootCauseRequest,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        self.load(problem_id).await?;
        self.repos
            .problems
            .update_root_cause(
                problem_id,
                &request.root_cause_object_id,
                request.root_cause_fault_id,
                now,
            )
            .await?;
        info!(
            problem_id,
            object_id = %request.root_cause_object_id,
            fault_id = request.root_cause_fault_id,
            "root cause set manually"
        );
        Ok(())
    }

    /// Apply an analyzer callback. Progress notifications are acknowledged
    /// without writes; `problem_status` is never touched.
    pub async fn handle_rca_callback_at(
        &self,
        callback: &RcaCallback,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        if callback.in_progress {
            debug!(problem_id = callback.problem_id, "rca still in progress");
            return Ok(());
        }
        self.load(callback.problem_id).await?;

        let update = RcaUpdate {
            rca_status: callback.rca_status,
            rca_start_time: callback.rca_start_time,
            rca_end_time: callback.rca_end_time.or(Some(now)),
            rca_results: Some(callback.rca_results.clone()),
            root_cause_object_id: non_empty(&callback.root_cause_object_id),
            root_cause_fault_id: (callback.root_cause_fault_id != 0)
                .then_some(callback.root_cause_fault_id),
            problem_name: non_empty(&callback.problem_name),
            problem_description: non_empty(&callback.problem_description),
        };
        self.repos
            .problems
            .update_rca(callback.problem_id, &update)
            .await?;

        for causal in &callback.fault_causals {
            self.upsert_causal(causal, now).await?;
        }
        for relation in &callback.fault_causal_relations {
            self.upsert_causal_relation(relation, now).await?;
        }
        info!(
            problem_id = callback.problem_id,
            status = %callback.rca_status,
            causals = callback.fault_causals.len(),
            relations = callback.fault_causal_relations.len(),
            "rca result stored"
        );
        Ok(())
    }

    async fn upsert_causal(
        &self,
        incoming: &FaultCausalObject,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let stored = self
            .repos
            .fault_causals
            .find_by_ids(std::slice::from_ref(&incoming.causal_id))
            .await?
            .into_iter()
            .next();
        let causal = match stored {
            Some(stored) if !stored.is_superseded_by(incoming) => return Ok(()),
            Some(stored) => FaultCausalObject {
                s_create_time: stored.s_create_time,
                s_update_time: now,
                causal_confidence: stored.causal_confidence.max(incoming.causal_confidence),
                ..incoming.clone()
            },
            None => FaultCausalObject {
                s_create_time: now,
                s_update_time: now,
                ..incoming.clone()
            },
        };
        self.repos.fault_causals.upsert(&causal).await
    }

    async fn upsert_causal_relation(
        &self,
        incoming: &FaultCausalRelation,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let existing = self
            .repos
            .fault_causal_relations
            .find_by_entity_pair(&incoming.source_object_id, &incoming.target_object_id)
            .await?
            .into_iter()
            .find(|r| r.same_edge(incoming));

        let mut relation = incoming.clone();
        relation.relation_update_time = now;
        match existing {
            Some(existing) => {
                relation.relation_id = existing.relation_id;
                relation.relation_create_time = existing.relation_create_time;
            }
            None => {
                if relation.relation_id.is_empty() {
                    relation.relation_id = self.ids.next_id()?.to_string();
                }
                relation.relation_create_time = now;
            }
        }
        self.repos.fault_causal_relations.upsert(&relation).await
    }

    // ── Command processor ────────────────────────────────────────────

    async fn route(
        &self,
        command: Command,
        now: DateTime<Utc>,
    ) -> Result<CommandResult, CoreError> {
        match command {
            Command::HandleFaultPoint(fp) => self
                .handle_fault_point_at(&fp, now)
                .await
                .map(CommandResult::Problem),
            Command::FaultPointRecovered { fault_id } => {
                self.handle_fault_point_recovered_at(fault_id, now).await?;
                Ok(CommandResult::Ok)
            }
            Command::RcaCallback(callback) => {
                self.handle_rca_callback_at(&callback, now).await?;
                Ok(CommandResult::Ok)
            }
            Command::UpdateRca { problem_id, update } => {
                self.repos.problems.update_rca(problem_id, &update).await?;
                Ok(CommandResult::Ok)
            }
            Command::CloseProblem {
                problem_id,
                request,
            } => self
                .close_problem_at(problem_id, &request, now)
                .await
                .map(CommandResult::Closed),
            Command::SetRootCause {
                problem_id,
                request,
            } => {
                self.update_root_cause_at(problem_id, &request, now).await?;
                Ok(CommandResult::Ok)
            }
        }
    }

    /// Process commands and the expiry sweep until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<(), CoreError> {
        let Some(mut rx) = self.command_rx.lock().await.take() else {
            return Err(CoreError::precondition("problem engine is already running"));
        };

        let mut expiry = tokio::time::interval(self.config.sweep_interval);
        expiry.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        expiry.tick().await; // consume the immediate first tick

        info!("problem engine started");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                envelope = rx.recv() => {
                    let Some(envelope) = envelope else { break };
                    let result = self.route(envelope.command, Utc::now()).await;
                    let _ = envelope.response_tx.send(result);
                }
                _ = expiry.tick() => {
                    if let Err(e) = self.expire_at(Utc::now()).await {
                        warn!(error = %e, "problem expiry sweep failed");
                    }
                }
            }
        }
        info!("problem engine stopped");
        Ok(())
    }
}

/// Fold a fault point's evidence into `problem`.
fn attach(problem: &mut Problem, fp: &FaultPointObject, now: DateTime<Utc>) {
    problem.relation_fp_ids.insert(fp.fault_id);
    problem
        .relation_event_ids
        .extend(fp.relation_event_ids.iter().copied());
    problem
        .affected_entity_ids
        .insert(fp.entity_object_id.clone());
    problem.problem_occur_time = problem.problem_occur_time.min(fp.fault_occur_time);
    problem.problem_latest_time = problem.problem_latest_time.max(fp.fault_latest_time);
    problem.problem_level = problem.problem_level.min(fp.fault_level);
    problem.problem_duration = problem.duration_until(problem.problem_latest_time);
    problem.problem_update_time = now;
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_owned())
}

impl std::fmt::Debug for ProblemEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProblemEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::directory::StaticDirectory;
    use crate::fault::ProblemHandler;
    use crate::model::{CloseType, RawEvent, Severity};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap()
    }

    fn secs(n: i64) -> chrono::Duration {
        chrono::Duration::seconds(n)
    }

    /// e1 - e2 - e3, plus an isolated e9.
    fn directory() -> Arc<StaticDirectory> {
        Arc::new(
            StaticDirectory::new()
                .with_object("host", "e1", "h1")
                .with_object("host", "e2", "h2")
                .with_object("host", "e3", "h3")
                .with_object("host", "e9", "h9")
                .with_edge("e1", "connects_to", "e2")
                .with_edge("e2", "connects_to", "e3"),
        )
    }

    fn engine() -> (Arc<ProblemEngine>, Repositories) {
        let repos = Repositories::memory();
        let engine = ProblemEngine::new(
            repos.clone(),
            Arc::new(IdGenerator::new()),
            directory(),
            ProblemEngineConfig::default(),
        );
        (Arc::new(engine), repos)
    }

    /// Persist a fault point and its events as the fault engine would.
    async fn fault(
        repos: &Repositories,
        fault_id: u64,
        entity: &str,
        events: &[u64],
        at: DateTime<Utc>,
    ) -> FaultPointObject {
        let fp = FaultPointObject {
            fault_id,
            fault_name: format!("fault on {entity}"),
            fault_occur_time: at,
            fault_latest_time: at,
            entity_object_id: entity.into(),
            entity_object_class: "host".into(),
            relation_event_ids: events.iter().copied().collect(),
            fault_level: Severity::Major,
            ..FaultPointObject::default()
        };
        repos.fault_points.upsert(&fp).await.unwrap();
        for id in events {
            repos
                .raw_events
                .upsert(&RawEvent {
                    event_id: *id,
                    fault_id,
                    ..RawEvent::default()
                })
                .await
                .unwrap();
        }
        fp
    }

    async fn problem(repos: &Repositories, id: u64) -> Problem {
        repos.problems.find_by_ids(&[id]).await.unwrap().remove(0)
    }

    #[tokio::test]
    async fn first_fault_opens_problem_and_backfills() {
        let (engine, repos) = engine();
        let fp = fault(&repos, 100, "e1", &[1, 2], t0()).await;

        let pid = engine.handle_fault_point_at(&fp, t0()).await.unwrap();
        let p = problem(&repos, pid).await;
        assert_eq!(p.problem_name, "fault on e1");
        assert_eq!(p.relation_fp_ids.iter().copied().collect::<Vec<_>>(), vec![100]);
        assert_eq!(p.relation_event_ids.iter().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(p.rca_status, RcaStatus::Pending);
        assert_eq!(p.problem_level, Severity::Major);

        let fp = repos.fault_points.find_by_ids(&[100]).await.unwrap().remove(0);
        assert_eq!(fp.problem_id, pid);
        let events = repos.raw_events.find_by_ids(&[1, 2]).await.unwrap();
        assert!(events.iter().all(|e| e.problem_id == pid));
    }

    #[tokio::test]
    async fn neighbour_fault_attaches_within_window() {
        let (engine, repos) = engine();
        let a = fault(&repos, 100, "e1", &[1], t0()).await;
        let pid = engine.handle_fault_point_at(&a, t0()).await.unwrap();

        let b = fault(&repos, 101, "e2", &[2], t0() + secs(10)).await;
        assert_eq!(engine.handle_fault_point_at(&b, t0()).await.unwrap(), pid);

        let p = problem(&repos, pid).await;
        assert_eq!(
            p.affected_entity_ids.iter().cloned().collect::<Vec<_>>(),
            vec!["e1".to_owned(), "e2".to_owned()]
        );
        assert_eq!(p.problem_latest_time, t0() + secs(10));
        assert_eq!(p.problem_duration, 10);
    }

    #[tokio::test]
    async fn distant_or_unrelated_faults_open_new_problems() {
        let (engine, repos) = engine();
        let a = fault(&repos, 100, "e1", &[1], t0()).await;
        let first = engine.handle_fault_point_at(&a, t0()).await.unwrap();

        let isolated = fault(&repos, 101, "e9", &[2], t0()).await;
        let late = fault(&repos, 102, "e2", &[3], t0() + secs(301)).await;
        assert_ne!(engine.handle_fault_point_at(&isolated, t0()).await.unwrap(), first);
        assert_ne!(engine.handle_fault_point_at(&late, t0()).await.unwrap(), first);
    }

    #[tokio::test]
    async fn bridging_fault_merges_into_smallest_id() {
        let (engine, repos) = engine();
        let a = fault(&repos, 100, "e1", &[1], t0()).await;
        let c = fault(&repos, 101, "e3", &[2], t0()).await;
        let first = engine.handle_fault_point_at(&a, t0()).await.unwrap();
        let second = engine.handle_fault_point_at(&c, t0()).await.unwrap();
        assert!(first < second);

        let bridge = fault(&repos, 102, "e2", &[3], t0() + secs(5)).await;
        let survivor = engine.handle_fault_point_at(&bridge, t0()).await.unwrap();
        assert_eq!(survivor, first);

        let p = problem(&repos, first).await;
        assert_eq!(p.relation_fp_ids.len(), 3);
        assert_eq!(p.relation_event_ids.len(), 3);
        assert_eq!(p.affected_entity_ids.len(), 3);

        let merged = problem(&repos, second).await;
        assert_eq!(merged.problem_status, ProblemStatus::Merged);
        assert_eq!(merged.problem_close_type, Some(CloseType::System));
        assert!(merged.relation_fp_ids.is_empty());
        assert_eq!(merged.problem_close_notes, format!("merged into {first}"));

        let faults = repos.fault_points.find_by_ids(&[100, 101, 102]).await.unwrap();
        assert!(faults.iter().all(|f| f.problem_id == first));
        let events = repos.raw_events.find_by_ids(&[1, 2, 3]).await.unwrap();
        assert!(events.iter().all(|e| e.problem_id == first));
    }

    #[tokio::test]
    async fn owned_fault_refreshes_its_problem() {
        let (engine, repos) = engine();
        let mut fp = fault(&repos, 100, "e1", &[1], t0()).await;
        let pid = engine.handle_fault_point_at(&fp, t0()).await.unwrap();

        fp.problem_id = pid;
        fp.relation_event_ids.insert(2);
        fp.fault_latest_time = t0() + secs(30);
        fp.fault_level = Severity::Critical;
        repos.fault_points.upsert(&fp).await.unwrap();
        repos
            .raw_events
            .upsert(&RawEvent {
                event_id: 2,
                ..RawEvent::default()
            })
            .await
            .unwrap();

        assert_eq!(engine.handle_fault_point_at(&fp, t0()).await.unwrap(), pid);
        let p = problem(&repos, pid).await;
        assert_eq!(p.relation_event_ids.len(), 2);
        assert_eq!(p.problem_level, Severity::Critical);
        assert_eq!(p.problem_duration, 30);
        let event = repos.raw_events.find_by_ids(&[2]).await.unwrap().remove(0);
        assert_eq!(event.problem_id, pid);
    }

    #[tokio::test]
    async fn close_requires_open_problem() {
        let (engine, repos) = engine();
        let fp = fault(&repos, 100, "e1", &[1, 2], t0()).await;
        let pid = engine.handle_fault_point_at(&fp, t0()).await.unwrap();

        let summary = engine
            .close_problem_at(pid, &CloseRequest::manual("done", "alice"), t0() + secs(120))
            .await
            .unwrap();
        assert_eq!(summary.events_closed, 2);
        assert_eq!(summary.faults_closed, 1);

        let p = problem(&repos, pid).await;
        assert_eq!(p.problem_status, ProblemStatus::Closed);
        assert_eq!(p.problem_closed_by, "alice");
        assert_eq!(p.problem_duration, 120);

        let again = engine
            .close_problem_at(pid, &CloseRequest::manual("done", "alice"), t0())
            .await
            .unwrap_err();
        assert!(matches!(again, CoreError::PreconditionViolated { .. }));

        let missing = engine
            .close_problem_at(42, &CloseRequest::manual("x", "y"), t0())
            .await
            .unwrap_err();
        assert!(matches!(missing, CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn last_recovery_closes_problem() {
        let (engine, repos) = engine();
        let a = fault(&repos, 100, "e1", &[1], t0()).await;
        let b = fault(&repos, 101, "e2", &[2], t0()).await;
        let pid = engine.handle_fault_point_at(&a, t0()).await.unwrap();
        engine.handle_fault_point_at(&b, t0()).await.unwrap();

        let mut recovered = repos.fault_points.find_by_ids(&[100]).await.unwrap().remove(0);
        recovered.fault_status = FaultStatus::Recovered;
        recovered.relation_event_ids.insert(3);
        repos.fault_points.upsert(&recovered).await.unwrap();
        engine.handle_fault_point_recovered_at(100, t0()).await.unwrap();

        let p = problem(&repos, pid).await;
        assert!(p.is_open());
        assert!(p.relation_event_ids.contains(&3));

        repos.fault_points.make_expired(&[101], t0()).await.unwrap();
        engine.handle_fault_point_recovered_at(101, t0() + secs(60)).await.unwrap();
        let p = problem(&repos, pid).await;
        assert_eq!(p.problem_status, ProblemStatus::Closed);
        assert_eq!(p.problem_closed_by, "system");
        assert_eq!(p.problem_close_notes, "all fault points recovered");
    }

    #[tokio::test]
    async fn idle_problems_expire() {
        let (engine, repos) = engine();
        let fp = fault(&repos, 100, "e1", &[1], t0() - chrono::Duration::minutes(31)).await;
        let pid = engine.handle_fault_point_at(&fp, t0()).await.unwrap();

        assert_eq!(engine.expire_at(t0()).await.unwrap(), 1);
        assert_eq!(problem(&repos, pid).await.problem_status, ProblemStatus::Expired);
        assert_eq!(engine.expire_at(t0()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn callback_writes_results_and_causal_graph() {
        let (engine, repos) = engine();
        let fp = fault(&repos, 100, "e1", &[1], t0()).await;
        let pid = engine.handle_fault_point_at(&fp, t0()).await.unwrap();

        let progress = RcaCallback {
            problem_id: pid,
            in_progress: true,
            rca_status: RcaStatus::Running,
            ..RcaCallback::default()
        };
        engine.handle_rca_callback_at(&progress, t0()).await.unwrap();
        assert_eq!(problem(&repos, pid).await.rca_status, RcaStatus::Pending);

        let relation = FaultCausalRelation {
            relation_class: "has_cause".into(),
            source_object_id: "c1".into(),
            target_object_id: "c2".into(),
            ..FaultCausalRelation::default()
        };
        let done = RcaCallback {
            problem_id: pid,
            rca_status: RcaStatus::Success,
            rca_results: "{\"rca_id\":\"rca_1\"}".into(),
            root_cause_object_id: "e1".into(),
            root_cause_fault_id: 100,
            problem_name: "link flap".into(),
            fault_causals: vec![FaultCausalObject {
                causal_id: "c1".into(),
                causal_confidence: 0.8,
                causal_reason: "uplink down".into(),
                ..FaultCausalObject::default()
            }],
            fault_causal_relations: vec![relation.clone()],
            ..RcaCallback::default()
        };
        engine.handle_rca_callback_at(&done, t0()).await.unwrap();
        engine.handle_rca_callback_at(&done, t0()).await.unwrap();

        let p = problem(&repos, pid).await;
        assert!(p.is_open());
        assert_eq!(p.rca_status, RcaStatus::Success);
        assert_eq!(p.root_cause_fault_id, 100);
        assert_eq!(p.problem_name, "link flap");
        assert_eq!(p.rca_end_time, Some(t0()));

        let edges = repos
            .fault_causal_relations
            .find_by_entity_pair("c1", "c2")
            .await
            .unwrap();
        assert_eq!(edges.len(), 1);

        let mut weaker = done.fault_causals[0].clone();
        weaker.causal_confidence = 0.3;
        weaker.causal_reason = "cpu".into();
        engine.upsert_causal(&weaker, t0()).await.unwrap();
        let stored = repos.fault_causals.find_by_ids(&["c1".to_owned()]).await.unwrap();
        assert!((stored[0].causal_confidence - 0.8).abs() < f64::EPSILON);
        assert_eq!(stored[0].causal_reason, "cpu");
    }

    #[tokio::test]
    async fn commands_flow_through_processor() {
        let (engine, repos) = engine();
        let handle = engine.handle();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(&engine).run(cancel.clone()));

        let fp = fault(&repos, 100, "e1", &[1], Utc::now()).await;
        handle.handle_fault_point(fp).await.unwrap();
        let pid = repos.fault_points.find_by_ids(&[100]).await.unwrap()[0].problem_id;
        assert_ne!(pid, 0);

        handle
            .set_root_cause(
                pid,
                SetRootCauseRequest {
                    root_cause_object_id: "e1".into(),
                    root_cause_fault_id: 100,
                },
            )
            .await
            .unwrap();
        let summary = handle
            .close_problem(pid, CloseRequest::manual("resolved", "bob"))
            .await
            .unwrap();
        assert_eq!(summary.status, ProblemStatus::Closed);
        assert_eq!(problem(&repos, pid).await.root_cause_object_id, "e1");

        cancel.cancel();
        task.await.unwrap().unwrap();
        assert!(matches!(
            handle.close_problem(pid, CloseRequest::manual("x", "y")).await,
            Err(CoreError::Cancelled)
        ));
    }
}
