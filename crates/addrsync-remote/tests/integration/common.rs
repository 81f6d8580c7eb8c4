//! Shared test helpers for provider integration tests
//!
//! Builds multistatus documents and vCards, and mounts WebDAV endpoints on
//! a wiremock server.

use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use addrsync_remote::http::HttpSettings;
use addrsync_remote::CardDavClient;

/// Returns a CardDAV client whose configured URL is `{server}{url_path}`
pub fn carddav_client(server: &MockServer, url_path: &str) -> CardDavClient {
    CardDavClient::new(
        &format!("{}{}", server.uri(), url_path),
        "alice",
        "secret",
        &HttpSettings::default(),
    )
    .expect("client")
}

/// A minimal vCard with the given name and addresses
pub fn vcard(name: &str, emails: &[&str]) -> String {
    let mut card = format!("BEGIN:VCARD\r\nVERSION:3.0\r\nFN:{name}\r\n");
    for email in emails {
        card.push_str(&format!("EMAIL;TYPE=INTERNET:{email}\r\n"));
    }
    card.push_str("END:VCARD\r\n");
    card
}

/// `<response>` carrying an etag and, optionally, the card itself
pub fn card_response(href: &str, etag: &str, card: Option<&str>) -> String {
    let data = card
        .map(|c| format!("<card:address-data>{c}</card:address-data>"))
        .unwrap_or_default();
    format!(
        "<d:response><d:href>{href}</d:href><d:propstat><d:prop>\
         <d:getetag>{etag}</d:getetag>{data}</d:prop>\
         <d:status>HTTP/1.1 200 OK</d:status></d:propstat></d:response>"
    )
}

/// `<response>` reporting a removed member
pub fn deleted_response(href: &str) -> String {
    format!(
        "<d:response><d:href>{href}</d:href>\
         <d:status>HTTP/1.1 404 Not Found</d:status></d:response>"
    )
}

/// `<response>` describing a collection
pub fn collection_response(href: &str, display_name: Option<&str>, addressbook: bool) -> String {
    let name = display_name
        .map(|n| format!("<d:displayname>{n}</d:displayname>"))
        .unwrap_or_default();
    let kind = if addressbook { "<card:addressbook/>" } else { "" };
    format!(
        "<d:response><d:href>{href}</d:href><d:propstat><d:prop>{name}\
         <d:resourcetype><d:collection/>{kind}</d:resourcetype></d:prop>\
         <d:status>HTTP/1.1 200 OK</d:status></d:propstat></d:response>"
    )
}

/// Wraps responses into a multistatus document
pub fn multistatus(responses: &[String], sync_token: Option<&str>) -> String {
    let token = sync_token
        .map(|t| format!("<d:sync-token>{t}</d:sync-token>"))
        .unwrap_or_default();
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:" xmlns:card="urn:ietf:params:xml:ns:carddav">{}{token}</d:multistatus>"#,
        responses.concat()
    )
}

/// 207 Multi-Status with an XML body
pub fn multistatus_reply(body: String) -> ResponseTemplate {
    ResponseTemplate::new(207)
        .set_body_string(body)
        .append_header("Content-Type", "application/xml; charset=utf-8")
}

/// Mounts a PROPFIND answering with `current-user-principal`
pub async fn mount_principal(server: &MockServer, at: &str, principal: &str) {
    let body = multistatus(
        &[format!(
            "<d:response><d:href>{at}</d:href><d:propstat><d:prop>\
             <d:current-user-principal><d:href>{principal}</d:href></d:current-user-principal>\
             </d:prop><d:status>HTTP/1.1 200 OK</d:status></d:propstat></d:response>"
        )],
        None,
    );
    Mock::given(method("PROPFIND"))
        .and(path(at))
        .and(body_string_contains("current-user-principal"))
        .respond_with(multistatus_reply(body))
        .mount(server)
        .await;
}

/// Mounts a PROPFIND answering with `addressbook-home-set`
pub async fn mount_home_set(server: &MockServer, principal: &str, home: &str) {
    let body = multistatus(
        &[format!(
            "<d:response><d:href>{principal}</d:href><d:propstat><d:prop>\
             <card:addressbook-home-set><d:href>{home}</d:href></card:addressbook-home-set>\
             </d:prop><d:status>HTTP/1.1 200 OK</d:status></d:propstat></d:response>"
        )],
        None,
    );
    Mock::given(method("PROPFIND"))
        .and(path(principal))
        .and(body_string_contains("addressbook-home-set"))
        .respond_with(multistatus_reply(body))
        .mount(server)
        .await;
}

/// Mounts the Depth 1 listing of a home set
pub async fn mount_listing(server: &MockServer, home: &str, responses: &[String]) {
    Mock::given(method("PROPFIND"))
        .and(path(home))
        .and(body_string_contains("resourcetype"))
        .respond_with(multistatus_reply(multistatus(responses, None)))
        .mount(server)
        .await;
}
