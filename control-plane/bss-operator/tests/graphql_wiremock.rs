use std::time::Duration;

use bss_operator::query_client::{ClusterQuery, GraphQlClient, QueryError};
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, header, method, path},
};

fn cluster_json(id: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": format!("cluster-{id}"),
        "replicas": 3,
        "version": "1.4.2",
        "state": "RUNNING",
        "readyReplicas": 2,
        "createdAt": "2026-01-15T09:30:00Z",
        "lastUpdateTime": "2026-01-15T09:35:00Z"
    })
}

fn client(server: &MockServer) -> GraphQlClient {
    GraphQlClient::new(format!("{}/graphql", server.uri()), Duration::from_secs(5))
        .expect("client")
}

#[tokio::test]
async fn get_cluster_sends_id_variable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(json!({ "variables": { "id": "c-1" } })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": { "cluster": cluster_json("c-1") } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let rec = client(&server).get_cluster("c-1").await.unwrap().unwrap();
    assert_eq!(rec.id, "c-1");
    assert_eq!(rec.ready_replicas, 2);
    assert_eq!(rec.last_update_time.to_rfc3339(), "2026-01-15T09:35:00+00:00");
}

#[tokio::test]
async fn get_cluster_null_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "cluster": null } })))
        .mount(&server)
        .await;

    assert_eq!(client(&server).get_cluster("nope").await.unwrap(), None);
}

#[tokio::test]
async fn list_clusters_decodes_all() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "clusters": [cluster_json("a"), cluster_json("b")] }
        })))
        .mount(&server)
        .await;

    let all = client(&server).list_clusters().await.unwrap();
    let ids: Vec<_> = all.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[tokio::test]
async fn null_cluster_list_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "clusters": null } })))
        .mount(&server)
        .await;

    assert!(client(&server).list_clusters().await.unwrap().is_empty());
}

#[tokio::test]
async fn null_record_fields_decode_to_zero_values() {
    let server = MockServer::start().await;
    let mut rec = cluster_json("c-2");
    rec["readyReplicas"] = json!(null);
    rec["version"] = json!(null);
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "cluster": rec } })))
        .mount(&server)
        .await;

    let rec = client(&server).get_cluster("c-2").await.unwrap().unwrap();
    assert_eq!(rec.id, "c-2");
    assert_eq!(rec.replicas, 3);
    assert_eq!(rec.ready_replicas, 0);
    assert_eq!(rec.version, "");
}

#[tokio::test]
async fn non_200_carries_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
        .mount(&server)
        .await;

    match client(&server).list_clusters().await {
        Err(QueryError::Status { code, body }) => {
            assert_eq!(code, 503);
            assert_eq!(body, "upstream down");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn graphql_errors_are_remote_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": null,
            "errors": [{ "message": "cluster store unavailable", "path": ["clusters"] }]
        })))
        .mount(&server)
        .await;

    match client(&server).list_clusters().await {
        Err(QueryError::Remote(msgs)) => {
            assert_eq!(msgs, vec!["cluster store unavailable".to_string()]);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn garbage_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    assert!(matches!(
        client(&server).list_clusters().await,
        Err(QueryError::Decode(_))
    ));
}
