use super::*;
use crate::config::WikiConfig;
use serde_json::{Value, json};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn wiki_config(server_uri: &str) -> WikiConfig {
    WikiConfig {
        domain: format!("{}/wiki", server_uri),
        username: "ops".to_string(),
        password: "secret".to_string(),
        timeout_seconds: 5,
        max_retries: 2,
        backoff_base_ms: 1,
    }
}

fn page(title: &str, storage: &str) -> Value {
    json!({
        "title": title,
        "body": {"storage": {"value": storage}, "view": {"value": ""}}
    })
}

async fn mount_page(server: &MockServer, id: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(format!("/wiki/rest/api/content/{}", id)))
        .respond_with(response)
        .mount(server)
        .await;
}

async fn mount_children(server: &MockServer, parent: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/wiki/rest/api/content/search"))
        .and(query_param("cql", format!("parent={}", parent)))
        .respond_with(response)
        .mount(server)
        .await;
}

async fn fetch(server: &MockServer, root_id: &'static str) -> Result<Vec<Document>> {
    let client = WikiClient::new(&wiki_config(&server.uri())).expect("client");
    tokio::task::spawn_blocking(move || client.fetch_document_set(root_id))
        .await
        .expect("blocking task should not panic")
}

#[tokio::test]
async fn fetches_root_then_children() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "100",
        ResponseTemplate::new(200).set_body_json(page("A", "<p>restart nginx</p>")),
    )
    .await;
    mount_children(
        &server,
        "100",
        ResponseTemplate::new(200).set_body_json(json!({
            "results": [page("B", "<p>backup db</p>"), page("C", "<p>deploy app</p>")]
        })),
    )
    .await;

    let documents = fetch(&server, "100").await.expect("fetch should succeed");

    assert_eq!(
        documents,
        vec![
            Document::new("A", "restart nginx"),
            Document::new("B", "backup db"),
            Document::new("C", "deploy app"),
        ]
    );
}

#[tokio::test]
async fn sends_basic_auth_and_expand() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wiki/rest/api/content/7"))
        .and(header("Authorization", "Basic b3BzOnNlY3JldA=="))
        .and(query_param("expand", "body.storage,body.view"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page("Runbook", "<p>x</p>")))
        .expect(1)
        .mount(&server)
        .await;

    let client = WikiClient::new(&wiki_config(&server.uri())).expect("client");
    let document = tokio::task::spawn_blocking(move || client.fetch_page("7"))
        .await
        .expect("blocking task should not panic")
        .expect("fetch should succeed");

    assert_eq!(document, Some(Document::new("Runbook", "x")));
}

#[tokio::test]
async fn view_is_used_when_storage_is_empty() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "100",
        ResponseTemplate::new(200).set_body_json(json!({
            "title": "A",
            "body": {"storage": {"value": "  "}, "view": {"value": "<div>rendered</div>"}}
        })),
    )
    .await;
    mount_children(
        &server,
        "100",
        ResponseTemplate::new(200).set_body_json(json!({"results": []})),
    )
    .await;

    let documents = fetch(&server, "100").await.expect("fetch should succeed");
    assert_eq!(documents, vec![Document::new("A", "rendered")]);
}

#[tokio::test]
async fn pages_without_body_are_skipped() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "100",
        ResponseTemplate::new(200).set_body_json(json!({"title": "Empty root"})),
    )
    .await;
    mount_children(
        &server,
        "100",
        ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"title": "no body"}, page("B", "<p>backup</p>")]
        })),
    )
    .await;

    let documents = fetch(&server, "100").await.expect("fetch should succeed");
    assert_eq!(documents, vec![Document::new("B", "backup")]);
}

#[tokio::test]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wiki/rest/api/content/100"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_page(
        &server,
        "100",
        ResponseTemplate::new(200).set_body_json(page("A", "<p>restart</p>")),
    )
    .await;

    let client = WikiClient::new(&wiki_config(&server.uri())).expect("client");
    let document = tokio::task::spawn_blocking(move || client.fetch_page("100"))
        .await
        .expect("blocking task should not panic")
        .expect("retry should succeed");

    assert_eq!(document, Some(Document::new("A", "restart")));
}

#[tokio::test]
async fn retries_are_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wiki/rest/api/content/100"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .expect(3)
        .mount(&server)
        .await;

    let client = WikiClient::new(&wiki_config(&server.uri())).expect("client");
    let result = tokio::task::spawn_blocking(move || client.fetch_page("100"))
        .await
        .expect("blocking task should not panic");

    assert!(matches!(
        result,
        Err(RagError::ContentSource { status: 502, ref body }) if body == "bad gateway"
    ));
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wiki/rest/api/content/404"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such page"))
        .expect(1)
        .mount(&server)
        .await;

    let client = WikiClient::new(&wiki_config(&server.uri())).expect("client");
    let result = tokio::task::spawn_blocking(move || client.fetch_page("404"))
        .await
        .expect("blocking task should not panic");

    assert!(matches!(result, Err(RagError::ContentSource { status: 404, .. })));
}

#[tokio::test]
async fn children_survive_failing_root() {
    let server = MockServer::start().await;
    mount_page(&server, "100", ResponseTemplate::new(403)).await;
    mount_children(
        &server,
        "100",
        ResponseTemplate::new(200).set_body_json(json!({"results": [page("B", "<p>b</p>")]})),
    )
    .await;

    let documents = fetch(&server, "100").await.expect("children should be used");
    assert_eq!(documents, vec![Document::new("B", "b")]);
}

#[tokio::test]
async fn root_survives_failing_children() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "100",
        ResponseTemplate::new(200).set_body_json(page("A", "<p>a</p>")),
    )
    .await;
    mount_children(&server, "100", ResponseTemplate::new(400)).await;

    let documents = fetch(&server, "100").await.expect("root should be used");
    assert_eq!(documents, vec![Document::new("A", "a")]);
}

#[tokio::test]
async fn both_failing_returns_root_error() {
    let server = MockServer::start().await;
    mount_page(&server, "100", ResponseTemplate::new(401).set_body_string("denied")).await;
    mount_children(&server, "100", ResponseTemplate::new(400)).await;

    let result = fetch(&server, "100").await;
    assert!(matches!(
        result,
        Err(RagError::ContentSource { status: 401, ref body }) if body == "denied"
    ));
}

#[tokio::test]
async fn malformed_json_is_reported() {
    let server = MockServer::start().await;
    mount_page(&server, "100", ResponseTemplate::new(200).set_body_string("<html>")).await;

    let client = WikiClient::new(&wiki_config(&server.uri())).expect("client");
    let result = tokio::task::spawn_blocking(move || client.fetch_page("100"))
        .await
        .expect("blocking task should not panic");

    assert!(matches!(result, Err(RagError::MalformedResponse(_))));
}
