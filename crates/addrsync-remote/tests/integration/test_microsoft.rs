//! Integration tests for the Microsoft Graph contacts client
//!
//! - Full delta across `@odata.nextLink` pages
//! - Stored delta link requested verbatim
//! - 404/410 on a stale delta link restarts a full sync

use addrsync_remote::http::HttpSettings;
use addrsync_remote::MicrosoftContactsClient;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DELTA: &str = "/me/contacts/delta";

fn client(server: &MockServer) -> MicrosoftContactsClient {
    MicrosoftContactsClient::with_base_url("graph-token", server.uri(), &HttpSettings::default())
        .expect("client")
}

fn contact(id: &str, name: &str, email: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "displayName": name,
        "emailAddresses": [{ "name": name, "address": email }]
    })
}

/// Mounts a full delta answering with one page and the given delta token
///
/// Mount it after any token-specific mock so those take precedence.
async fn mount_full_delta(server: &MockServer, items: serde_json::Value, delta_token: &str) {
    Mock::given(method("GET"))
        .and(path(DELTA))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": items,
            "@odata.deltaLink": format!("{}{DELTA}?$deltatoken={delta_token}", server.uri())
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_sync_follows_next_links() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DELTA))
        .and(query_param("$skiptoken", "page2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [contact("c2", "Bob", "bob@example.com")],
            "@odata.deltaLink": format!("{}{DELTA}?$deltatoken=d1", server.uri())
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(DELTA))
        .and(header("Authorization", "Bearer graph-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [contact("c1", "Alice", "Alice@Example.com")],
            "@odata.nextLink": format!("{}{DELTA}?$skiptoken=page2", server.uri())
        })))
        .mount(&server)
        .await;

    let batch = client(&server).fetch("").await.expect("delta failed");

    assert!(batch.is_full_sync);
    assert_eq!(batch.updated.len(), 2);
    assert_eq!(batch.updated[0].email, "alice@example.com");
    assert_eq!(batch.updated[0].href, "c1");
    assert_eq!(
        batch.next_checkpoint,
        format!("{}{DELTA}?$deltatoken=d1", server.uri())
    );
}

#[tokio::test]
async fn test_incremental_uses_delta_link_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DELTA))
        .and(query_param("$deltatoken", "d1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [
                contact("c3", "Carol", "carol@example.com"),
                { "id": "c2", "@removed": { "reason": "deleted" } }
            ],
            "@odata.deltaLink": format!("{}{DELTA}?$deltatoken=d2", server.uri())
        })))
        .mount(&server)
        .await;

    let link = format!("{}{DELTA}?$deltatoken=d1", server.uri());
    let batch = client(&server).fetch(&link).await.expect("delta failed");

    assert!(!batch.is_full_sync);
    assert_eq!(batch.deleted, vec!["c2"]);
    assert_eq!(batch.updated.len(), 1);
    assert!(batch.next_checkpoint.ends_with("$deltatoken=d2"));
}

#[tokio::test]
async fn test_gone_delta_link_restarts_full_sync() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DELTA))
        .and(query_param("$deltatoken", "old"))
        .respond_with(ResponseTemplate::new(410))
        .expect(1)
        .mount(&server)
        .await;
    mount_full_delta(&server, serde_json::json!([contact("c1", "Alice", "alice@example.com")]), "fresh").await;

    let link = format!("{}{DELTA}?$deltatoken=old", server.uri());
    let batch = client(&server).fetch(&link).await.expect("recovery failed");

    assert!(batch.is_full_sync);
    assert_eq!(batch.updated.len(), 1);
    assert!(batch.next_checkpoint.ends_with("$deltatoken=fresh"));
}

#[tokio::test]
async fn test_not_found_delta_link_restarts_full_sync() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DELTA))
        .and(query_param("$deltatoken", "old"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    mount_full_delta(&server, serde_json::json!([]), "fresh").await;

    let link = format!("{}{DELTA}?$deltatoken=old", server.uri());
    let batch = client(&server).fetch(&link).await.expect("recovery failed");

    assert!(batch.is_full_sync);
    assert!(batch.updated.is_empty());
}

#[tokio::test]
async fn test_missing_delta_link_leaves_empty_checkpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DELTA))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [contact("c1", "Alice", "alice@example.com")]
        })))
        .mount(&server)
        .await;

    let batch = client(&server).fetch("").await.expect("delta failed");
    assert_eq!(batch.next_checkpoint, "");
    assert_eq!(batch.updated.len(), 1);
}

#[tokio::test]
async fn test_server_error_on_full_sync_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DELTA))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let err = client(&server).fetch("").await.unwrap_err();
    assert_eq!(err.to_string(), "HTTP 503: unavailable");
}
