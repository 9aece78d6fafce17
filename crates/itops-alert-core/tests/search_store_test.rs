#![allow(clippy::unwrap_used)]
// Integration tests for `SearchStore` against a wiremock search index.

use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use itops_alert_api::SearchClient;
use itops_alert_core::store::{FaultPointRepository, ProblemRepository, RawEventRepository};
use itops_alert_core::{
    CloseRequest, CoreError, FaultPointObject, Problem, ProblemStatus, SearchStore,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap()
}

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, SearchStore) {
    let server = MockServer::start().await;
    let client = SearchClient::with_client(
        reqwest::Client::new(),
        Url::parse(&server.uri()).unwrap(),
        None,
    );
    (server, SearchStore::new(client))
}

fn hits(sources: &[serde_json::Value]) -> serde_json::Value {
    let hits: Vec<_> = sources.iter().map(|s| json!({ "_source": s })).collect();
    json!({ "hits": { "hits": hits } })
}

fn open_problem(id: u64, entity: &str) -> Problem {
    Problem {
        problem_id: id,
        problem_name: "disk full".into(),
        problem_occur_time: t0(),
        problem_latest_time: t0(),
        affected_entity_ids: std::iter::once(entity.to_owned()).collect(),
        relation_fp_ids: std::iter::once(id + 1).collect(),
        ..Problem::default()
    }
}

// ── Writes ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_problem_upsert_replaces_document_by_id() {
    let (server, store) = setup().await;

    Mock::given(method("PUT"))
        .and(path("/itops_problem/_doc/42"))
        .and(query_param("refresh", "wait_for"))
        .and(body_string_contains("\"problem_name\":\"disk full\""))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "result": "created" })))
        .expect(1)
        .mount(&server)
        .await;

    ProblemRepository::upsert(&store, &open_problem(42, "e1")).await.unwrap();
}

#[tokio::test]
async fn test_back_references_use_bulk_partial_updates() {
    let (server, store) = setup().await;

    Mock::given(method("POST"))
        .and(path("/itops_raw_event/_bulk"))
        .and(body_string_contains(r#"{"update":{"_id":"1"}}"#))
        .and(body_string_contains(r#"{"update":{"_id":"2"}}"#))
        .and(body_string_contains(r#"{"doc":{"fault_id":9}}"#))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "errors": false, "items": [] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    store.update_fault_id(&[1, 2], 9).await.unwrap();
}

#[tokio::test]
async fn test_close_on_missing_problem_is_not_found() {
    let (server, store) = setup().await;

    Mock::given(method("POST"))
        .and(path("/itops_problem/_update/77"))
        .and(body_string_contains("\"problem_closed_by\":\"oncall\""))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "type": "document_missing_exception", "reason": "[77]: document missing" },
            "status": 404
        })))
        .expect(1)
        .mount(&server)
        .await;

    let close = CloseRequest::manual("fixed", "oncall");
    let err = store.mark_closed(77, &close, t0(), 60).await.unwrap_err();
    assert!(
        matches!(err, CoreError::NotFound { entity_type: "problem", ref identifier } if identifier == "77"),
        "got {err:?}"
    );
}

#[tokio::test]
async fn test_unavailable_store_is_transient() {
    let (server, store) = setup().await;

    Mock::given(method("POST"))
        .and(path("/itops_problem/_update/5"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": { "type": "cluster_block_exception", "reason": "no master" },
            "status": 503
        })))
        .mount(&server)
        .await;

    let err = store.clear_merged_problem_data(5, t0()).await.unwrap_err();
    assert!(err.is_transient(), "got {err:?}");
}

#[tokio::test]
async fn test_make_expired_computes_duration_per_fault() {
    let (server, store) = setup().await;

    let fault = FaultPointObject {
        fault_id: 3,
        fault_occur_time: t0(),
        fault_latest_time: t0() + chrono::Duration::minutes(5),
        entity_object_id: "e1".into(),
        ..FaultPointObject::default()
    };
    Mock::given(method("POST"))
        .and(path("/itops_fault_point/_mget"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "docs": [
                { "found": true, "_source": serde_json::to_value(&fault).unwrap() },
                { "found": false }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/itops_fault_point/_bulk"))
        .and(body_string_contains(r#"{"update":{"_id":"3"}}"#))
        .and(body_string_contains("\"fault_duration_time\":300"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "errors": false, "items": [] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let now = t0() + chrono::Duration::minutes(20);
    store.make_expired(&[3, 4], now).await.unwrap();
}

// ── Queries ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_find_correlated_filters_open_problems_by_entity_and_window() {
    let (server, store) = setup().await;

    Mock::given(method("POST"))
        .and(path("/itops_problem/_search"))
        .and(body_string_contains(r#"{"terms":{"affected_entity_ids":["e1","e2"]}}"#))
        .and(body_string_contains(r#""problem_status":"0""#))
        .and(body_string_contains("\"gte\":\"2025-06-01T09:55:00.000Z\""))
        .and(body_string_contains("\"lte\":\"2025-06-01T10:05:00.000Z\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(hits(&[
            serde_json::to_value(open_problem(10, "e1")).unwrap(),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let window = chrono::Duration::minutes(5);
    let found = store
        .find_correlated(&["e1".to_owned(), "e2".to_owned()], t0() - window, t0() + window)
        .await
        .unwrap();
    assert_eq!(found, vec![open_problem(10, "e1")]);
    assert_eq!(found[0].problem_status, ProblemStatus::Open);
}

#[tokio::test]
async fn test_find_correlated_without_entities_skips_the_store() {
    let (server, store) = setup().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let found = store.find_correlated(&[], t0(), t0()).await.unwrap();
    assert!(found.is_empty());
}

#[tokio::test]
async fn test_find_pending_rca_excludes_problems_with_root_cause() {
    let (server, store) = setup().await;

    Mock::given(method("POST"))
        .and(path("/itops_problem/_search"))
        .and(body_string_contains(r#""must_not":[{"range":{"root_cause_fault_id":{"gt":0}}}]"#))
        .and(body_string_contains(r#"{"term":{"rca_status":1}}"#))
        .respond_with(ResponseTemplate::new(200).set_body_json(hits(&[])))
        .expect(1)
        .mount(&server)
        .await;

    let found = store.find_pending_rca(t0()).await.unwrap();
    assert!(found.is_empty());
}

#[tokio::test]
async fn test_find_open_fault_by_entity_and_mode() {
    let (server, store) = setup().await;

    let fault = FaultPointObject {
        fault_id: 8,
        entity_object_id: "e1".into(),
        fault_mode: "icmpping".into(),
        fault_occur_time: t0(),
        fault_latest_time: t0(),
        ..FaultPointObject::default()
    };
    Mock::given(method("POST"))
        .and(path("/itops_fault_point/_search"))
        .and(body_string_contains(r#"{"term":{"entity_object_id":"e1"}}"#))
        .and(body_string_contains(r#"{"term":{"fault_mode":"icmpping"}}"#))
        .respond_with(ResponseTemplate::new(200).set_body_json(hits(&[
            serde_json::to_value(&fault).unwrap(),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let found = store.find_open_by_entity_and_mode("e1", "icmpping").await.unwrap();
    assert_eq!(found, vec![fault]);
}

#[tokio::test]
async fn test_raw_event_lookup_by_provider_id() {
    let (server, store) = setup().await;

    Mock::given(method("POST"))
        .and(path("/itops_raw_event/_search"))
        .and(body_string_contains(r#"{"term":{"event_provider_id":36512}}"#))
        .respond_with(ResponseTemplate::new(200).set_body_json(hits(&[json!({
            "event_id": 1,
            "event_provider_id": 36512,
            "fault_id": 8,
            "event_timestamp": "2025-06-01T10:00:00Z"
        })])))
        .expect(1)
        .mount(&server)
        .await;

    let events = store.find_by_provider_id(36512).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].fault_id, 8);
    assert_eq!(events[0].event_timestamp, t0());
}
