use axum::Json;
use axum::extract::rejection::{BytesRejection, JsonRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use itops_alert_core::broker::timestamp_key;
use itops_alert_core::{
    CloseProblemRequest, CloseSummary, FaultPointObject, Problem, RawEvent, RcaCallback,
    SetRootCauseRequest,
};

use super::{ApiError, AppState};

/// `{"items": [...]}` wrapper of the info routes.
#[derive(Debug, Serialize)]
pub struct Items<T> {
    pub items: Vec<T>,
}

// ── Path parameters ─────────────────────────────────────────────────

pub(super) fn parse_id(raw: &str) -> Result<u64, ApiError> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("invalid id {raw:?}")))
}

/// Comma-separated ids, kept in request order.
pub(super) fn parse_ids(raw: &str) -> Result<Vec<u64>, ApiError> {
    let ids = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_id)
        .collect::<Result<Vec<_>, _>>()?;
    if ids.is_empty() {
        return Err(ApiError::bad_request("at least one id is required"));
    }
    Ok(ids)
}

// ── Intake ──────────────────────────────────────────────────────────

pub(super) async fn ingest_event(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let body = body?;
    if body.is_empty() {
        return Err(ApiError::bad_request("request body is empty"));
    }
    let key = timestamp_key(Utc::now());
    let size = body.len();
    state.broker.publish(&key, body).await?;
    debug!(%key, size, "webhook payload queued");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "accepted", "key": key })),
    ))
}

// ── Lookups ─────────────────────────────────────────────────────────

pub(super) async fn events_info(
    State(state): State<AppState>,
    Path(event_ids): Path<String>,
) -> Result<Json<Items<RawEvent>>, ApiError> {
    let ids = parse_ids(&event_ids)?;
    let items = state.repos.raw_events.find_by_ids(&ids).await?;
    Ok(Json(Items { items }))
}

pub(super) async fn fault_points_info(
    State(state): State<AppState>,
    Path(fault_ids): Path<String>,
) -> Result<Json<Items<FaultPointObject>>, ApiError> {
    let ids = parse_ids(&fault_ids)?;
    let items = state.repos.fault_points.find_by_ids(&ids).await?;
    Ok(Json(Items { items }))
}

pub(super) async fn problems_info(
    State(state): State<AppState>,
    Path(problem_ids): Path<String>,
) -> Result<Json<Items<Problem>>, ApiError> {
    let ids = parse_ids(&problem_ids)?;
    let items = state.repos.problems.find_by_ids(&ids).await?;
    Ok(Json(Items { items }))
}

// ── Operator commands ───────────────────────────────────────────────

pub(super) async fn close_problem(
    State(state): State<AppState>,
    Path(problem_id): Path<String>,
    body: Result<Json<CloseProblemRequest>, JsonRejection>,
) -> Result<Json<CloseSummary>, ApiError> {
    let problem_id = parse_id(&problem_id)?;
    let Json(request) = body?;
    let closed_by = request.closed_by.clone();
    let summary = state
        .problems
        .close_problem(problem_id, request.into_close()?)
        .await?;
    info!(
        problem_id,
        %closed_by,
        events = summary.events_closed,
        faults = summary.faults_closed,
        "problem closed by operator"
    );
    Ok(Json(summary))
}

pub(super) async fn set_root_cause(
    State(state): State<AppState>,
    Path(problem_id): Path<String>,
    body: Result<Json<SetRootCauseRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let problem_id = parse_id(&problem_id)?;
    let Json(request) = body?;
    if request.root_cause_object_id.trim().is_empty() {
        return Err(ApiError::bad_request("root_cause_object_id must not be empty"));
    }
    state.problems.set_root_cause(problem_id, request).await?;
    Ok(Json(json!({ "status": "updated" })))
}

// ── Analyzer callback ───────────────────────────────────────────────

pub(super) async fn rca_callback(
    State(state): State<AppState>,
    Path(problem_id): Path<String>,
    body: Result<Json<RcaCallback>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let problem_id = parse_id(&problem_id)?;
    let Json(mut callback) = body?;
    if callback.problem_id != 0 && callback.problem_id != problem_id {
        return Err(ApiError::bad_request(format!(
            "body problem_id {} does not match path {problem_id}",
            callback.problem_id
        )));
    }
    callback.problem_id = problem_id;
    state.problems.rca_callback(callback).await?;
    Ok(Json(json!({ "problem_id": problem_id, "status": "accepted" })))
}

pub(super) async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
