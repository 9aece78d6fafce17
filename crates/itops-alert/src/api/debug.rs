// ── Debug view ──
//
// Everything a problem was built from, plus a readable account of how
// the events became fault points and the fault points became the
// problem.

use std::collections::BTreeSet;

use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;

use itops_alert_core::{
    CoreError, FaultPointObject, FaultStatus, Problem, ProblemStatus, RawEvent, RcaStatus,
};

use super::handlers::parse_id;
use super::{ApiError, AppState};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProblemTree {
    pub problem: Problem,
    pub fault_points: Vec<FaultPointObject>,
    pub events: Vec<RawEvent>,
    pub statistics: TreeStatistics,
    pub trace_path: Vec<TraceStep>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TreeStatistics {
    pub fault_count: usize,
    pub event_count: usize,
    pub open_faults: usize,
    pub recovered_faults: usize,
    pub expired_faults: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceStep {
    pub step: usize,
    pub description: String,
}

pub(super) async fn problem_tree(
    State(state): State<AppState>,
    Path(problem_id): Path<String>,
) -> Result<Json<ProblemTree>, ApiError> {
    let problem_id = parse_id(&problem_id)?;
    let problem = state
        .repos
        .problems
        .find_by_ids(&[problem_id])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| CoreError::NotFound {
            entity_type: "problem",
            identifier: problem_id.to_string(),
        })?;

    let fault_ids: Vec<u64> = problem.relation_fp_ids.iter().copied().collect();
    let fault_points = state.repos.fault_points.find_by_ids(&fault_ids).await?;

    // Recovery events are linked to faults but not always to the problem.
    let mut event_ids: Vec<u64> = problem.relation_event_ids.iter().copied().collect();
    for fault in &fault_points {
        for id in &fault.relation_event_ids {
            if !event_ids.contains(id) {
                event_ids.push(*id);
            }
        }
    }
    let events = state.repos.raw_events.find_by_ids(&event_ids).await?;

    Ok(Json(build_tree(problem, fault_points, events)))
}

pub fn build_tree(
    problem: Problem,
    fault_points: Vec<FaultPointObject>,
    events: Vec<RawEvent>,
) -> ProblemTree {
    let count = |status: FaultStatus| {
        fault_points
            .iter()
            .filter(|f| f.fault_status == status)
            .count()
    };
    let statistics = TreeStatistics {
        fault_count: fault_points.len(),
        event_count: events.len(),
        open_faults: count(FaultStatus::Occurred),
        recovered_faults: count(FaultStatus::Recovered),
        expired_faults: count(FaultStatus::Expired),
    };
    let trace_path = trace(&problem, &fault_points, &events)
        .into_iter()
        .enumerate()
        .map(|(i, description)| TraceStep {
            step: i + 1,
            description,
        })
        .collect();

    ProblemTree {
        problem,
        fault_points,
        events,
        statistics,
        trace_path,
    }
}

fn trace(problem: &Problem, faults: &[FaultPointObject], events: &[RawEvent]) -> Vec<String> {
    let mut steps = Vec::new();

    let sources: BTreeSet<&str> = events
        .iter()
        .map(|e| e.event_source.as_str())
        .filter(|s| !s.is_empty())
        .collect();
    steps.push(format!(
        "{} raw events received from {}",
        events.len(),
        if sources.is_empty() {
            "unknown sources".to_owned()
        } else {
            sources.into_iter().collect::<Vec<_>>().join(", ")
        }
    ));

    for fault in faults {
        steps.push(format!(
            "fault point {} on {} ({}) collapsed {} events, {}",
            fault.fault_id,
            display_entity(fault),
            fault.fault_mode,
            fault.relation_event_ids.len(),
            fault.fault_status
        ));
    }

    steps.push(format!(
        "problem {} groups {} fault points across {} entities",
        problem.problem_id,
        problem.relation_fp_ids.len(),
        problem.affected_entity_ids.len()
    ));

    if problem.root_cause_fault_id != 0 {
        steps.push(format!(
            "root cause {} (fault point {}), analysis {}",
            problem.root_cause_object_id, problem.root_cause_fault_id, problem.rca_status
        ));
    } else if problem.rca_status != RcaStatus::Pending {
        steps.push(format!("root cause analysis {}", problem.rca_status));
    }

    if problem.problem_status != ProblemStatus::Open {
        let how = problem
            .problem_close_type
            .map_or_else(String::new, |t| format!(" ({t})"));
        steps.push(format!(
            "{}{how} by {}",
            problem.problem_status, problem.problem_closed_by
        ));
    }
    steps
}

fn display_entity(fault: &FaultPointObject) -> &str {
    if fault.entity_object_name.is_empty() {
        &fault.entity_object_id
    } else {
        &fault.entity_object_name
    }
}
