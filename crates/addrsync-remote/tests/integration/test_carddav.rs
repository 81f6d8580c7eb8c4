//! Integration tests for the CardDAV client
//!
//! - Discovery through principal and home set, and through `.well-known`
//! - Full and incremental `sync-collection`
//! - Fallbacks: stale token, missing RFC 6578 support, missing address data
//! - Manual redirect handling

use addrsync_remote::RemoteError;
use wiremock::matchers::{basic_auth, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{
    card_response, carddav_client, collection_response, deleted_response, mount_home_set,
    mount_listing, mount_principal, multistatus, multistatus_reply, vcard,
};

#[tokio::test]
async fn test_discovery_via_principal_and_home_set() {
    let server = MockServer::start().await;
    mount_principal(&server, "/dav/", "/principals/alice/").await;
    mount_home_set(&server, "/principals/alice/", "/addressbooks/alice/").await;
    mount_listing(
        &server,
        "/addressbooks/alice/",
        &[
            collection_response("/addressbooks/alice/", None, false),
            collection_response("/addressbooks/alice/contacts/", Some("Contacts"), true),
            collection_response("/addressbooks/alice/work/", None, true),
            collection_response("/addressbooks/alice/inbox/", Some("Inbox"), false),
        ],
    )
    .await;

    let client = carddav_client(&server, "/dav/");
    let books = client.discover().await.expect("discovery failed");

    assert_eq!(books.len(), 2);
    assert_eq!(books[0].path, "/addressbooks/alice/contacts/");
    assert_eq!(books[0].display_name, "Contacts");
    assert_eq!(books[1].path, "/addressbooks/alice/work/");
    assert_eq!(books[1].display_name, "work");
}

#[tokio::test]
async fn test_discovery_falls_back_to_well_known() {
    let server = MockServer::start().await;

    // the configured path answers 404 (no mock); .well-known redirects
    Mock::given(method("PROPFIND"))
        .and(path("/.well-known/carddav"))
        .respond_with(ResponseTemplate::new(301).append_header("Location", "/remote.php/dav/"))
        .mount(&server)
        .await;
    mount_principal(&server, "/remote.php/dav/", "/remote.php/dav/principals/alice/").await;
    mount_home_set(
        &server,
        "/remote.php/dav/principals/alice/",
        "/remote.php/dav/addressbooks/alice/",
    )
    .await;
    mount_listing(
        &server,
        "/remote.php/dav/addressbooks/alice/",
        &[collection_response(
            "/remote.php/dav/addressbooks/alice/default/",
            Some("Default"),
            true,
        )],
    )
    .await;

    let client = carddav_client(&server, "/not-here/");
    let books = client.discover().await.expect("discovery failed");

    assert_eq!(books.len(), 1);
    assert_eq!(books[0].path, "/remote.php/dav/addressbooks/alice/default/");
}

#[tokio::test]
async fn test_discovery_stops_on_rejected_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("PROPFIND"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = carddav_client(&server, "/dav/");
    let err = client.discover().await.unwrap_err();
    assert!(matches!(err, RemoteError::Unauthorized(_)), "got {err:?}");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
}

#[tokio::test]
async fn test_discovery_without_addressbooks_fails() {
    let server = MockServer::start().await;

    let client = carddav_client(&server, "/dav/");
    let err = client.discover().await.unwrap_err();
    assert!(matches!(err, RemoteError::Discovery(_)), "got {err:?}");
}

#[tokio::test]
async fn test_full_sync_collection() {
    let server = MockServer::start().await;
    let body = multistatus(
        &[
            collection_response("/ab/", Some("AB"), true),
            card_response(
                "/ab/alice.vcf",
                "\"a1\"",
                Some(&vcard("Alice", &["alice@example.com", "Alice@Work.example"])),
            ),
            card_response("/ab/bob.vcf", "\"b1\"", Some(&vcard("Bob", &["bob@example.com"]))),
        ],
        Some("tok-1"),
    );
    Mock::given(method("REPORT"))
        .and(path("/ab/"))
        .and(header("Depth", "0"))
        .and(basic_auth("alice", "secret"))
        .and(body_string_contains("<d:sync-token/>"))
        .respond_with(multistatus_reply(body))
        .mount(&server)
        .await;

    let client = carddav_client(&server, "/dav/");
    let batch = client.fetch("/ab/", "").await.expect("sync failed");

    assert!(batch.is_full_sync);
    assert_eq!(batch.next_checkpoint, "tok-1");
    assert_eq!(batch.updated.len(), 3);
    assert_eq!(batch.updated_records(), 2);
    assert!(batch.deleted.is_empty());

    let work = batch
        .updated
        .iter()
        .find(|c| c.email == "alice@work.example")
        .expect("second address of alice");
    assert_eq!(work.href, "/ab/alice.vcf");
    assert_eq!(work.etag, "\"a1\"");
    assert_eq!(work.display_name, "Alice");
}

#[tokio::test]
async fn test_incremental_sync_reports_changes_and_deletions() {
    let server = MockServer::start().await;
    let body = multistatus(
        &[
            card_response("/ab/carol.vcf", "\"c2\"", Some(&vcard("Carol", &["carol@example.com"]))),
            deleted_response("/ab/bob.vcf"),
        ],
        Some("tok-2"),
    );
    Mock::given(method("REPORT"))
        .and(path("/ab/"))
        .and(body_string_contains("<d:sync-token>tok-1</d:sync-token>"))
        .respond_with(multistatus_reply(body))
        .mount(&server)
        .await;

    let client = carddav_client(&server, "/");
    let batch = client.fetch("/ab/", "tok-1").await.expect("sync failed");

    assert!(!batch.is_full_sync);
    assert_eq!(batch.next_checkpoint, "tok-2");
    assert_eq!(batch.deleted, vec!["/ab/bob.vcf"]);
    assert_eq!(batch.updated.len(), 1);
    assert_eq!(batch.updated[0].email, "carol@example.com");
}

#[tokio::test]
async fn test_stale_token_falls_back_to_full_sync() {
    let server = MockServer::start().await;
    Mock::given(method("REPORT"))
        .and(path("/ab/"))
        .and(body_string_contains("<d:sync-token>stale</d:sync-token>"))
        .respond_with(ResponseTemplate::new(403).set_body_string(
            r#"<d:error xmlns:d="DAV:"><d:valid-sync-token/></d:error>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("REPORT"))
        .and(path("/ab/"))
        .and(body_string_contains("<d:sync-token/>"))
        .respond_with(multistatus_reply(multistatus(
            &[card_response("/ab/a.vcf", "\"1\"", Some(&vcard("A", &["a@example.com"])))],
            Some("tok-fresh"),
        )))
        .mount(&server)
        .await;

    let client = carddav_client(&server, "/");
    let batch = client.fetch("/ab/", "stale").await.expect("fallback failed");

    assert!(batch.is_full_sync);
    assert_eq!(batch.next_checkpoint, "tok-fresh");
    assert_eq!(batch.updated.len(), 1);
}

#[tokio::test]
async fn test_addressbook_query_when_sync_collection_unsupported() {
    let server = MockServer::start().await;
    Mock::given(method("REPORT"))
        .and(path("/ab/"))
        .and(body_string_contains("sync-collection"))
        .respond_with(ResponseTemplate::new(501))
        .mount(&server)
        .await;
    Mock::given(method("REPORT"))
        .and(path("/ab/"))
        .and(header("Depth", "1"))
        .and(body_string_contains("addressbook-query"))
        .respond_with(multistatus_reply(multistatus(
            &[
                card_response("/ab/a.vcf", "\"1\"", Some(&vcard("A", &["a@example.com"]))),
                card_response("/ab/b.vcf", "\"1\"", Some(&vcard("B", &["b@example.com"]))),
            ],
            None,
        )))
        .mount(&server)
        .await;

    let client = carddav_client(&server, "/");
    let batch = client.fetch("/ab/", "").await.expect("query failed");

    assert!(batch.is_full_sync);
    assert_eq!(batch.next_checkpoint, "");
    assert_eq!(batch.updated.len(), 2);
}

#[tokio::test]
async fn test_multiget_fetches_cards_listed_without_data() {
    let server = MockServer::start().await;
    Mock::given(method("REPORT"))
        .and(path("/ab/"))
        .and(body_string_contains("sync-collection"))
        .respond_with(multistatus_reply(multistatus(
            &[
                card_response("/ab/a.vcf", "\"1\"", None),
                card_response("/ab/b.vcf", "\"2\"", None),
            ],
            Some("tok-1"),
        )))
        .mount(&server)
        .await;
    Mock::given(method("REPORT"))
        .and(path("/ab/"))
        .and(body_string_contains("addressbook-multiget"))
        .and(body_string_contains("<d:href>/ab/a.vcf</d:href>"))
        .and(body_string_contains("<d:href>/ab/b.vcf</d:href>"))
        .respond_with(multistatus_reply(multistatus(
            &[
                card_response("/ab/a.vcf", "\"1\"", Some(&vcard("A", &["a@example.com"]))),
                card_response("/ab/b.vcf", "\"2\"", Some(&vcard("B", &["b@example.com"]))),
            ],
            None,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let client = carddav_client(&server, "/");
    let batch = client.fetch("/ab/", "").await.expect("sync failed");

    assert_eq!(batch.next_checkpoint, "tok-1");
    let mut emails: Vec<&str> = batch.updated.iter().map(|c| c.email.as_str()).collect();
    emails.sort_unstable();
    assert_eq!(emails, vec!["a@example.com", "b@example.com"]);
}

#[tokio::test]
async fn test_report_follows_redirect_with_method_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("REPORT"))
        .and(path("/old/"))
        .respond_with(ResponseTemplate::new(308).append_header("Location", "/new/"))
        .mount(&server)
        .await;
    Mock::given(method("REPORT"))
        .and(path("/new/"))
        .and(body_string_contains("sync-collection"))
        .respond_with(multistatus_reply(multistatus(
            &[card_response("/new/a.vcf", "\"1\"", Some(&vcard("A", &["a@example.com"])))],
            Some("tok-1"),
        )))
        .mount(&server)
        .await;

    let client = carddav_client(&server, "/");
    let batch = client.fetch("/old/", "").await.expect("sync failed");

    assert_eq!(batch.updated.len(), 1);
    assert_eq!(batch.updated[0].href, "/new/a.vcf");
}

#[tokio::test]
async fn test_redirect_loop_is_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("PROPFIND"))
        .and(path("/loop/"))
        .respond_with(ResponseTemplate::new(302).append_header("Location", "/loop/"))
        .mount(&server)
        .await;

    let client = carddav_client(&server, "/loop/");
    let err = client.check_connection().await.unwrap_err();
    assert!(matches!(err, RemoteError::Configuration(_)), "got {err:?}");

    // initial request plus the allowed redirects
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 6);
}

#[tokio::test]
async fn test_connection_check() {
    let server = MockServer::start().await;
    mount_principal(&server, "/dav/", "/principals/alice/").await;

    let ok = carddav_client(&server, "/dav/");
    assert!(ok.check_connection().await.is_ok());

    let missing = carddav_client(&server, "/missing/");
    let err = missing.check_connection().await.unwrap_err();
    assert!(matches!(err, RemoteError::Http { status: 404, .. }), "got {err:?}");
}

#[tokio::test]
async fn test_home_set_on_another_host_is_synced_there() {
    let front = MockServer::start().await;
    let storage = MockServer::start().await;

    mount_principal(&front, "/dav/", "/principals/alice/").await;
    mount_home_set(
        &front,
        "/principals/alice/",
        &format!("{}/addressbooks/alice/", storage.uri()),
    )
    .await;
    mount_listing(
        &storage,
        "/addressbooks/alice/",
        &[collection_response("/addressbooks/alice/contacts/", Some("Contacts"), true)],
    )
    .await;
    Mock::given(method("REPORT"))
        .and(path("/addressbooks/alice/contacts/"))
        .respond_with(multistatus_reply(multistatus(
            &[card_response(
                "/addressbooks/alice/contacts/a.vcf",
                "\"1\"",
                Some(&vcard("A", &["a@example.com"])),
            )],
            Some("tok-1"),
        )))
        .mount(&storage)
        .await;

    let client = carddav_client(&front, "/dav/");
    let books = client.discover().await.expect("discovery failed");

    assert_eq!(books.len(), 1);
    assert_eq!(
        books[0].path,
        format!("{}/addressbooks/alice/contacts/", storage.uri())
    );

    let batch = client.fetch(&books[0].path, "").await.expect("sync failed");
    assert_eq!(batch.next_checkpoint, "tok-1");
    assert_eq!(batch.updated.len(), 1);
    assert_eq!(batch.updated[0].href, "/addressbooks/alice/contacts/a.vcf");

    let front_reports = front
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method.as_str() == "REPORT")
        .count();
    assert_eq!(front_reports, 0);
}
