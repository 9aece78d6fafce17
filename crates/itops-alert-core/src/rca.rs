// ── RCA dispatcher ──
//
// Periodically picks up problems awaiting analysis, assembles their
// context (fault backtrace plus topology around the affected entities)
// and submits it to the external analyzer. Results come back later as
// callbacks through the problem engine.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use itops_alert_api::RcaClient;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::ProblemHandle;
use crate::directory::Directory;
use crate::error::CoreError;
use crate::model::{
    EntityRef, Fault, FaultPointObject, Occurrence, Problem, RcaContext, RcaNetwork, RcaNode,
    RcaRequest, RcaStatus, Topology,
};
use crate::store::{RcaUpdate, Repositories};

/// Outbound side of the analyzer.
#[async_trait]
pub trait RcaSubmitter: Send + Sync {
    async fn submit(&self, request: &RcaRequest) -> Result<(), CoreError>;
}

#[async_trait]
impl RcaSubmitter for RcaClient {
    async fn submit(&self, request: &RcaRequest) -> Result<(), CoreError> {
        RcaClient::submit(self, request).await.map_err(CoreError::from)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RcaDispatcherConfig {
    pub poll_interval: Duration,
    /// Problems younger than this are left to stabilize.
    pub min_age: Duration,
    /// Consecutive submission failures before a problem is pinned `failed`.
    pub max_failures: u32,
    /// Knowledge network the analyzer should reason over.
    pub knowledge_id: String,
}

impl Default for RcaDispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            min_age: Duration::from_secs(60),
            max_failures: 5,
            knowledge_id: String::new(),
        }
    }
}

/// Per-tick counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub submitted: usize,
    pub deferred: usize,
    pub pinned: usize,
}

pub struct RcaDispatcher {
    repos: Repositories,
    directory: Arc<dyn Directory>,
    submitter: Arc<dyn RcaSubmitter>,
    problems: ProblemHandle,
    config: RcaDispatcherConfig,
    failures: DashMap<u64, u32>,
}

impl RcaDispatcher {
    pub fn new(
        repos: Repositories,
        directory: Arc<dyn Directory>,
        submitter: Arc<dyn RcaSubmitter>,
        problems: ProblemHandle,
        config: RcaDispatcherConfig,
    ) -> Self {
        Self {
            repos,
            directory,
            submitter,
            problems,
            config,
            failures: DashMap::new(),
        }
    }

    /// Submit every problem that is pending and old enough.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<TickStats, CoreError> {
        let min_age = chrono::Duration::from_std(self.config.min_age)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let pending = self.repos.problems.find_pending_rca(now - min_age).await?;
        let mut stats = TickStats::default();
        for problem in &pending {
            match self.dispatch(problem, now).await {
                Ok(Dispatch::Submitted) => stats.submitted += 1,
                Ok(Dispatch::Deferred) => stats.deferred += 1,
                Ok(Dispatch::Pinned) => stats.pinned += 1,
                Err(e) => {
                    warn!(problem_id = problem.problem_id, error = %e, "rca dispatch failed");
                    stats.deferred += 1;
                }
            }
        }
        if !pending.is_empty() {
            info!(
                submitted = stats.submitted,
                deferred = stats.deferred,
                pinned = stats.pinned,
                "rca tick complete"
            );
        }
        Ok(stats)
    }

    async fn dispatch(&self, problem: &Problem, now: DateTime<Utc>) -> Result<Dispatch, CoreError> {
        let problem_id = problem.problem_id;
        let request = RcaRequest {
            problem_id,
            adp_kn_id: self.config.knowledge_id.clone(),
            rca_id: RcaRequest::rca_id_for(problem_id),
            rca_context: self.build_context(problem).await?,
        };

        self.problems
            .update_rca(
                problem_id,
                RcaUpdate {
                    rca_start_time: Some(now),
                    ..RcaUpdate::status(RcaStatus::Running)
                },
            )
            .await?;

        let Err(e) = self.submitter.submit(&request).await else {
            self.failures.remove(&problem_id);
            info!(problem_id, rca_id = %request.rca_id, "rca submitted");
            return Ok(Dispatch::Submitted);
        };

        let attempts = {
            let mut count = self.failures.entry(problem_id).or_insert(0);
            *count += 1;
            *count
        };
        if attempts >= self.config.max_failures {
            self.failures.remove(&problem_id);
            let results = serde_json::json!({ "error": e.to_string(), "attempts": attempts });
            self.problems
                .update_rca(
                    problem_id,
                    RcaUpdate {
                        rca_end_time: Some(now),
                        rca_results: Some(results.to_string()),
                        ..RcaUpdate::status(RcaStatus::Failed)
                    },
                )
                .await?;
            warn!(problem_id, attempts, error = %e, "rca submission abandoned");
            Ok(Dispatch::Pinned)
        } else {
            self.problems
                .update_rca(problem_id, RcaUpdate::status(RcaStatus::Pending))
                .await?;
            warn!(problem_id, attempts, error = %e, "rca submission failed, will retry");
            Ok(Dispatch::Deferred)
        }
    }

    /// Analysis context for one problem.
    pub async fn build_context(&self, problem: &Problem) -> Result<RcaContext, CoreError> {
        let fp_ids: Vec<u64> = problem.relation_fp_ids.iter().copied().collect();
        let mut faults = self.repos.fault_points.find_by_ids(&fp_ids).await?;
        faults.sort_by_key(|f| (f.fault_occur_time, f.fault_id));

        let anchors: Vec<EntityRef> = problem
            .affected_entity_ids
            .iter()
            .map(|id| {
                let class = faults
                    .iter()
                    .find(|f| &f.entity_object_id == id)
                    .map(|f| f.entity_object_class.clone())
                    .unwrap_or_default();
                EntityRef::new(id.clone(), class)
            })
            .collect();
        let topology = match self.directory.subgraph(&anchors).await {
            Ok(topology) => topology,
            Err(e) => {
                warn!(problem_id = problem.problem_id, error = %e, "topology unavailable for rca");
                Topology::default()
            }
        };
        debug!(
            problem_id = problem.problem_id,
            faults = faults.len(),
            nodes = topology.nodes.len(),
            "rca context assembled"
        );

        Ok(RcaContext {
            occurrence: occurrence(problem, &faults),
            backtrace: faults.iter().map(Fault::from).collect(),
            network: network(topology, &faults),
        })
    }

    /// Tick every poll interval until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<(), CoreError> {
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval.tick().await; // consume the immediate first tick

        info!(interval = ?self.config.poll_interval, "rca dispatcher started");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.tick_at(Utc::now()).await {
                        warn!(error = %e, "rca tick failed");
                    }
                }
            }
        }
        info!("rca dispatcher stopped");
        Ok(())
    }
}

impl std::fmt::Debug for RcaDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RcaDispatcher")
            .field("config", &self.config)
            .field("failing", &self.failures.len())
            .finish_non_exhaustive()
    }
}

enum Dispatch {
    Submitted,
    Deferred,
    Pinned,
}

// ── Context assembly ─────────────────────────────────────────────────

fn occurrence(problem: &Problem, faults: &[FaultPointObject]) -> Occurrence {
    let mut by_severity: Vec<&FaultPointObject> = faults.iter().collect();
    by_severity.sort_by_key(|f| (f.fault_level, f.fault_occur_time));
    let description = by_severity
        .iter()
        .map(|f| format!("[{}] {} on {}", f.fault_level, f.fault_name, f.entity_object_name))
        .collect::<Vec<_>>()
        .join("; ");
    Occurrence {
        name: problem.problem_name.clone(),
        description,
        impact: format!("{} entities affected", problem.affected_entity_ids.len()),
    }
}

/// Topology nodes annotated with the faults raised on them. Entities
/// with faults but absent from the topology are added as bare nodes.
fn network(topology: Topology, faults: &[FaultPointObject]) -> RcaNetwork {
    let mut per_entity: HashMap<&str, Vec<&FaultPointObject>> = HashMap::new();
    for fault in faults {
        per_entity
            .entry(fault.entity_object_id.as_str())
            .or_default()
            .push(fault);
    }

    let mut nodes: Vec<RcaNode> = topology
        .nodes
        .into_iter()
        .map(|n| RcaNode {
            s_id: n.s_id,
            name: n.name,
            object_class: n.object_class,
            ..RcaNode::default()
        })
        .collect();
    for fault in faults {
        if !nodes.iter().any(|n| n.s_id == fault.entity_object_id) {
            nodes.push(RcaNode {
                s_id: fault.entity_object_id.clone(),
                name: fault.entity_object_name.clone(),
                object_class: fault.entity_object_class.clone(),
                ..RcaNode::default()
            });
        }
    }
    for node in &mut nodes {
        let Some(on_node) = per_entity.get(node.s_id.as_str()) else {
            continue;
        };
        node.relation_fault_point_ids = on_node.iter().map(|f| f.fault_id).collect();
        node.relation_event_ids = on_node
            .iter()
            .flat_map(|f| f.relation_event_ids.iter().map(u64::to_string))
            .collect();
        node.object_impact_level = on_node.iter().map(|f| f.fault_level).min();
    }

    RcaNetwork {
        nodes,
        edges: topology.edges,
    }
}
