#![allow(clippy::unwrap_used)]
// Integration tests for `RcaClient` using wiremock.

use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use itops_alert_api::{AuthProvider, Error, RcaClient};

async fn setup(auth: AuthProvider) -> (MockServer, RcaClient) {
    let server = MockServer::start().await;
    let endpoint = Url::parse(&server.uri())
        .unwrap()
        .join("/api/itops-rca/v1/analyses")
        .unwrap();
    let client = RcaClient::with_client(reqwest::Client::new(), endpoint, auth);
    (server, client)
}

#[tokio::test]
async fn test_submit_accepted() {
    let (server, client) =
        setup(AuthProvider::fixed("Bearer abc".to_string().into())).await;

    Mock::given(method("POST"))
        .and(path("/api/itops-rca/v1/analyses"))
        .and(header("authorization", "Bearer abc"))
        .and(body_json(json!({ "problem_id": 123 })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    client.submit(&json!({ "problem_id": 123 })).await.unwrap();
}

#[tokio::test]
async fn test_submit_rejected() {
    let (server, client) = setup(AuthProvider::anonymous()).await;

    Mock::given(method("POST"))
        .and(path("/api/itops-rca/v1/analyses"))
        .respond_with(ResponseTemplate::new(422).set_body_string("problem has no faults"))
        .mount(&server)
        .await;

    let err = client.submit(&json!({ "problem_id": 1 })).await.unwrap_err();
    assert!(!err.is_transient());
    match err {
        Error::Rca { status, message } => {
            assert_eq!(status, 422);
            assert_eq!(message, "problem has no faults");
        }
        other => panic!("expected Rca error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_submit_unavailable_is_transient() {
    let (server, client) = setup(AuthProvider::anonymous()).await;

    Mock::given(method("POST"))
        .and(path("/api/itops-rca/v1/analyses"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client.submit(&json!({ "problem_id": 1 })).await.unwrap_err();
    assert!(err.is_transient());
}
