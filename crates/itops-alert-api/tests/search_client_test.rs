#![allow(clippy::unwrap_used)]
// Integration tests for `SearchClient` using wiremock.

use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use itops_alert_api::{BasicAuth, Error, SearchClient};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Doc {
    id: u64,
    name: String,
}

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, SearchClient) {
    let server = MockServer::start().await;
    let client = SearchClient::with_client(
        reqwest::Client::new(),
        Url::parse(&server.uri()).unwrap(),
        None,
    );
    (server, client)
}

// ── Writes ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_index_document_waits_for_refresh() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path("/itops_problem/_doc/42"))
        .and(query_param("refresh", "wait_for"))
        .and(body_json(json!({ "id": 42, "name": "disk full" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "result": "created" })))
        .expect(1)
        .mount(&server)
        .await;

    let doc = Doc {
        id: 42,
        name: "disk full".into(),
    };
    client.index_document("itops_problem", "42", &doc).await.unwrap();
}

#[tokio::test]
async fn test_update_document_wraps_partial_in_doc() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/itops_raw_event/_update/7"))
        .and(body_json(json!({ "doc": { "fault_id": 99 } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "updated" })))
        .expect(1)
        .mount(&server)
        .await;

    client
        .update_document("itops_raw_event", "7", &json!({ "fault_id": 99 }))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_bulk_update_sends_ndjson() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/itops_raw_event/_bulk"))
        .and(header("content-type", "application/x-ndjson"))
        .and(body_string_contains(r#"{"update":{"_id":"1"}}"#))
        .and(body_string_contains(r#"{"doc":{"problem_id":5}}"#))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "took": 3,
            "errors": false,
            "items": [
                { "update": { "_id": "1", "status": 200 } },
                { "update": { "_id": "2", "status": 200 } }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let updates = vec![
        ("1".to_owned(), json!({ "problem_id": 5 })),
        ("2".to_owned(), json!({ "problem_id": 5 })),
    ];
    client.bulk_update("itops_raw_event", &updates).await.unwrap();
}

#[tokio::test]
async fn test_bulk_update_reports_item_failures() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/itops_fault_point/_bulk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": true,
            "items": [
                { "update": { "_id": "1", "status": 200 } },
                { "update": { "_id": "2", "status": 404,
                    "error": { "type": "document_missing_exception", "reason": "[2]: document missing" } } }
            ]
        })))
        .mount(&server)
        .await;

    let updates = vec![
        ("1".to_owned(), json!({ "problem_id": 5 })),
        ("2".to_owned(), json!({ "problem_id": 5 })),
    ];
    let err = client
        .bulk_update("itops_fault_point", &updates)
        .await
        .unwrap_err();
    match err {
        Error::PartialFailure {
            failed,
            total,
            first_reason,
        } => {
            assert_eq!(failed, 1);
            assert_eq!(total, 2);
            assert_eq!(first_reason, "[2]: document missing");
        }
        other => panic!("expected PartialFailure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_bulk_update_is_noop() {
    let (_server, client) = setup().await;
    client.bulk_update("itops_problem", &[]).await.unwrap();
}

// ── Reads ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_mget_skips_missing_documents() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/itops_problem/_mget"))
        .and(body_json(json!({ "ids": ["1", "2", "3"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "docs": [
                { "_id": "1", "found": true, "_source": { "id": 1, "name": "a" } },
                { "_id": "2", "found": false },
                { "_id": "3", "found": true, "_source": { "id": 3, "name": "c" } }
            ]
        })))
        .mount(&server)
        .await;

    let ids = vec!["1".to_owned(), "2".to_owned(), "3".to_owned()];
    let docs: Vec<Doc> = client.mget("itops_problem", &ids).await.unwrap();
    assert_eq!(
        docs,
        vec![
            Doc {
                id: 1,
                name: "a".into()
            },
            Doc {
                id: 3,
                name: "c".into()
            },
        ]
    );
}

#[tokio::test]
async fn test_search_returns_sources() {
    let (server, client) = setup().await;

    let query = json!({
        "size": 10,
        "query": { "bool": { "filter": [ { "term": { "problem_status": "0" } } ] } }
    });

    Mock::given(method("POST"))
        .and(path("/itops_problem/_search"))
        .and(body_json(query.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hits": { "total": { "value": 1 }, "hits": [
                { "_id": "9", "_source": { "id": 9, "name": "open one" } }
            ] }
        })))
        .mount(&server)
        .await;

    let docs: Vec<Doc> = client.search("itops_problem", &query).await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].id, 9);
}

// ── Errors & auth ───────────────────────────────────────────────────

#[tokio::test]
async fn test_search_error_envelope_is_parsed() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/itops_problem/_search"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "root_cause": [],
                "type": "search_phase_execution_exception",
                "reason": "all shards failed"
            },
            "status": 400
        })))
        .mount(&server)
        .await;

    let result: Result<Vec<Doc>, Error> = client.search("itops_problem", &json!({})).await;
    let err = result.unwrap_err();
    assert!(!err.is_transient());
    match err {
        Error::Search { status, kind, reason } => {
            assert_eq!(status, 400);
            assert_eq!(kind, "search_phase_execution_exception");
            assert_eq!(reason, "all shards failed");
        }
        other => panic!("expected Search error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unavailable_store_is_transient() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path("/itops_problem/_doc/1"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client
        .index_document("itops_problem", "1", &json!({}))
        .await
        .unwrap_err();
    assert!(err.is_transient(), "503 should be retryable: {err:?}");
}

#[tokio::test]
async fn test_basic_auth_header_is_sent() {
    let server = MockServer::start().await;
    let client = SearchClient::with_client(
        reqwest::Client::new(),
        Url::parse(&server.uri()).unwrap(),
        Some(BasicAuth {
            username: "admin".into(),
            password: "secret".to_string().into(),
        }),
    );

    Mock::given(method("POST"))
        .and(path("/itops_problem/_mget"))
        .and(header("authorization", "Basic YWRtaW46c2VjcmV0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "docs": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let docs: Vec<Doc> = client
        .mget("itops_problem", &["1".to_owned()])
        .await
        .unwrap();
    assert!(docs.is_empty());
}
