//! Integration tests for the Google People client
//!
//! - Full listing across pages
//! - Sync token sent on the first page only
//! - Expired-token recovery (410 and 400 EXPIRED_SYNC_TOKEN)
//! - Credential failures are not retried

use addrsync_remote::http::HttpSettings;
use addrsync_remote::{GoogleContactsClient, RemoteError};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CONNECTIONS: &str = "/people/me/connections";

fn client(server: &MockServer) -> GoogleContactsClient {
    GoogleContactsClient::with_base_url("google-token", server.uri(), &HttpSettings::default())
        .expect("client")
}

fn person(id: &str, name: &str, emails: &[&str]) -> serde_json::Value {
    let addresses: Vec<serde_json::Value> = emails
        .iter()
        .map(|e| serde_json::json!({ "value": e }))
        .collect();
    serde_json::json!({
        "resourceName": format!("people/{id}"),
        "etag": format!("etag-{id}"),
        "names": [{ "displayName": name, "metadata": { "primary": true } }],
        "emailAddresses": addresses
    })
}

#[tokio::test]
async fn test_full_sync_follows_pages() {
    let server = MockServer::start().await;

    // page 2 is mounted first so it wins for requests carrying pageToken
    Mock::given(method("GET"))
        .and(path(CONNECTIONS))
        .and(query_param("pageToken", "p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "connections": [person("c2", "Bob", &["bob@example.com"])],
            "nextSyncToken": "sync-1"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CONNECTIONS))
        .and(header("Authorization", "Bearer google-token"))
        .and(query_param("requestSyncToken", "true"))
        .and(query_param("pageSize", "1000"))
        .and(query_param("personFields", "names,emailAddresses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "connections": [person("c1", "Alice", &["alice@example.com", "a@work.example"])],
            "nextPageToken": "p2"
        })))
        .mount(&server)
        .await;

    let batch = client(&server).fetch("").await.expect("listing failed");

    assert!(batch.is_full_sync);
    assert_eq!(batch.next_checkpoint, "sync-1");
    assert_eq!(batch.updated.len(), 3);
    assert_eq!(batch.updated_records(), 2);
    assert_eq!(batch.updated[0].href, "people/c1");
    assert_eq!(batch.updated[0].etag, "etag-c1");
    assert_eq!(batch.updated[2].display_name, "Bob");
}

#[tokio::test]
async fn test_sync_token_sent_on_first_page_only() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONNECTIONS))
        .and(query_param("pageToken", "p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "connections": [{ "resourceName": "people/c9", "metadata": { "deleted": true } }],
            "nextSyncToken": "sync-3"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CONNECTIONS))
        .and(query_param("syncToken", "sync-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "connections": [person("c1", "Alice", &["alice@new.example"])],
            "nextPageToken": "p2"
        })))
        .mount(&server)
        .await;

    let batch = client(&server).fetch("sync-2").await.expect("listing failed");

    assert!(!batch.is_full_sync);
    assert_eq!(batch.next_checkpoint, "sync-3");
    assert_eq!(batch.deleted, vec!["people/c9"]);
    assert_eq!(batch.updated[0].email, "alice@new.example");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    let second_query = requests[1].url.query().unwrap_or_default().to_string();
    assert!(second_query.contains("pageToken=p2"));
    assert!(!second_query.contains("syncToken="));
}

#[tokio::test]
async fn test_gone_restarts_full_sync_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONNECTIONS))
        .and(query_param("syncToken", "old"))
        .respond_with(ResponseTemplate::new(410))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CONNECTIONS))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "connections": [person("c1", "Alice", &["alice@example.com"])],
            "nextSyncToken": "fresh"
        })))
        .mount(&server)
        .await;

    let batch = client(&server).fetch("old").await.expect("recovery failed");

    assert!(batch.is_full_sync);
    assert_eq!(batch.next_checkpoint, "fresh");
    assert_eq!(batch.updated.len(), 1);
}

#[tokio::test]
async fn test_expired_sync_token_reason_restarts_full_sync() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONNECTIONS))
        .and(query_param("syncToken", "old"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": {
                "code": 400,
                "message": "Sync token is expired. Clear local cache and retry call without the sync token.",
                "status": "FAILED_PRECONDITION",
                "details": [{
                    "@type": "type.googleapis.com/google.rpc.ErrorInfo",
                    "reason": "EXPIRED_SYNC_TOKEN"
                }]
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CONNECTIONS))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "connections": [],
            "nextSyncToken": "fresh"
        })))
        .mount(&server)
        .await;

    let batch = client(&server).fetch("old").await.expect("recovery failed");
    assert!(batch.is_full_sync);
    assert_eq!(batch.next_checkpoint, "fresh");
}

#[tokio::test]
async fn test_other_bad_request_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONNECTIONS))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": { "code": 400, "message": "Invalid personFields", "details": [] }
        })))
        .mount(&server)
        .await;

    let err = client(&server).fetch("tok").await.unwrap_err();
    assert!(matches!(err, RemoteError::Http { status: 400, .. }), "got {err:?}");
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unauthorized_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONNECTIONS))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client(&server).fetch("tok").await.unwrap_err();
    assert!(err.is_auth(), "got {err:?}");
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_gone_without_token_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONNECTIONS))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;

    let err = client(&server).fetch("").await.unwrap_err();
    assert!(matches!(err, RemoteError::Http { status: 410, .. }), "got {err:?}");
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}
