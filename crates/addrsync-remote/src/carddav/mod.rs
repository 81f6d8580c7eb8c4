//! CardDAV client
//!
//! Speaks RFC 6352 over HTTP Basic auth. Sync strategy per addressbook:
//!
//! 1. With a stored token: `sync-collection` REPORT. Any failure falls back
//!    to a full sync.
//! 2. Full sync: `sync-collection` with an empty token, which also yields a
//!    fresh token.
//! 3. Servers without RFC 6578: `addressbook-query` (no token).
//!
//! Entries returned without `address-data` are fetched in bulk through
//! `addressbook-multiget`. Redirects are followed by hand so the WebDAV
//! method and body survive them.

pub mod discovery;
pub mod xml;

use addrsync_core::domain::{DiscoveredAddressbook, SourceType};
use addrsync_core::ports::{ICardDavProvider, IContactProvider, RemoteContactBatch};
use addrsync_core::vcard::contacts_from_vcard;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{Client, Method, StatusCode};
use tracing::{debug, info, warn};
use url::Url;

use crate::http::{error_from_response, HttpSettings};
use crate::RemoteError;
use xml::DavResponse;

/// Hrefs per `addressbook-multiget` request
const MULTIGET_CHUNK: usize = 100;

/// Upper bound on `507 Insufficient Storage` continuation rounds
const MAX_SYNC_ROUNDS: usize = 50;

/// A successful WebDAV exchange
#[derive(Debug)]
pub(crate) struct DavReply {
    /// URL that finally answered, after redirects
    pub url: Url,
    pub body: String,
}

/// CardDAV protocol client bound to one server account
pub struct CardDavClient {
    http: Client,
    base_url: Url,
    username: String,
    password: String,
    max_redirects: u32,
}

impl CardDavClient {
    /// Creates a client for the configured server URL
    ///
    /// # Arguments
    /// * `url` - Server or addressbook URL as entered by the user
    /// * `username` / `password` - HTTP Basic credentials
    /// * `settings` - Timeout, user agent and redirect limit
    pub fn new(
        url: &str,
        username: impl Into<String>,
        password: impl Into<String>,
        settings: &HttpSettings,
    ) -> Result<Self, RemoteError> {
        Self::with_client(url, username, password, settings.webdav_client()?, settings.max_redirects)
    }

    /// Creates a client reusing an existing HTTP client
    ///
    /// The client must not follow redirects on its own.
    pub fn with_client(
        url: &str,
        username: impl Into<String>,
        password: impl Into<String>,
        http: Client,
        max_redirects: u32,
    ) -> Result<Self, RemoteError> {
        let base_url = Url::parse(url)
            .map_err(|e| RemoteError::Configuration(format!("Invalid CardDAV URL '{url}': {e}")))?;
        Ok(Self {
            http,
            base_url,
            username: username.into(),
            password: password.into(),
            max_redirects,
        })
    }

    /// The configured server URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Sends a WebDAV request, following up to `max_redirects` redirects
    pub(crate) async fn dav_request(
        &self,
        method_name: &str,
        url: Url,
        depth: &str,
        body: String,
    ) -> Result<DavReply, RemoteError> {
        let method = Method::from_bytes(method_name.as_bytes()).map_err(|e| {
            RemoteError::Configuration(format!("Invalid HTTP method {method_name}: {e}"))
        })?;

        let mut current = url;
        for _ in 0..=self.max_redirects {
            debug!(method = method_name, url = %current, depth, "WebDAV request");

            let response = self
                .http
                .request(method.clone(), current.clone())
                .basic_auth(&self.username, Some(&self.password))
                .header(CONTENT_TYPE, "application/xml; charset=utf-8")
                .header("Depth", depth)
                .body(body.clone())
                .send()
                .await?;

            let status = response.status();
            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| {
                        RemoteError::InvalidResponse(format!(
                            "{status} from {current} without Location header"
                        ))
                    })?;
                let next = current.join(location).map_err(|e| {
                    RemoteError::InvalidResponse(format!("Bad redirect target '{location}': {e}"))
                })?;
                debug!(from = %current, to = %next, "Following WebDAV redirect");
                current = next;
                continue;
            }

            if status.is_success() || status == StatusCode::MULTI_STATUS {
                let body = response.text().await?;
                return Ok(DavReply { url: current, body });
            }

            return Err(error_from_response(response).await);
        }

        Err(RemoteError::Configuration(format!(
            "Too many redirects (more than {}) starting at {method_name} request",
            self.max_redirects
        )))
    }

    /// Stored form of a collection URL
    ///
    /// A path when the collection lives on the configured origin, the
    /// absolute URL otherwise (home sets may point at another host).
    pub(crate) fn collection_path(&self, url: &Url) -> String {
        if url.origin() == self.base_url.origin() {
            url.path().to_string()
        } else {
            url.to_string()
        }
    }

    fn resolve(&self, path: &str) -> Result<Url, RemoteError> {
        self.base_url
            .join(path)
            .map_err(|e| RemoteError::Configuration(format!("Invalid addressbook path '{path}': {e}")))
    }

    /// Fetches changes for one addressbook
    ///
    /// Never fails because of an unusable token; only a failing full sync
    /// surfaces as an error.
    pub async fn fetch(
        &self,
        addressbook_path: &str,
        sync_token: &str,
    ) -> Result<RemoteContactBatch, RemoteError> {
        let collection = self.resolve(addressbook_path)?;

        if !sync_token.is_empty() {
            match self.sync_collection(&collection, sync_token).await {
                Ok(batch) => return Ok(batch),
                Err(e) => {
                    warn!(
                        addressbook = addressbook_path,
                        error = %e,
                        "Incremental sync failed, falling back to full sync"
                    );
                }
            }
        }

        match self.sync_collection(&collection, "").await {
            Ok(batch) => Ok(batch),
            Err(e) if e.is_auth() => Err(e),
            Err(e) => {
                info!(
                    addressbook = addressbook_path,
                    error = %e,
                    "sync-collection not available, using addressbook-query"
                );
                self.query_all(&collection).await
            }
        }
    }

    /// Runs `sync-collection`, following truncated (507) results
    async fn sync_collection(
        &self,
        collection: &Url,
        sync_token: &str,
    ) -> Result<RemoteContactBatch, RemoteError> {
        let mut batch = RemoteContactBatch::new(SourceType::CardDav, sync_token.is_empty());
        let mut missing = Vec::new();
        let mut token = sync_token.to_string();

        for _ in 0..MAX_SYNC_ROUNDS {
            let reply = self
                .dav_request("REPORT", collection.clone(), "0", xml::sync_collection(&token))
                .await?;
            let multistatus = xml::parse_multistatus(&reply.body)?;

            let mut truncated = false;
            for response in multistatus.responses {
                let href = resolve_href(&reply.url, &response.href)?;
                if is_collection_href(&href, collection) {
                    truncated |= response.status == Some(507);
                    continue;
                }
                if response.status == Some(404) {
                    batch.deleted.push(href);
                } else {
                    absorb(&mut batch, &mut missing, href, response);
                }
            }

            let next = multistatus.sync_token.unwrap_or_default();
            if !truncated || next.is_empty() || next == token {
                token = next;
                break;
            }
            debug!(collection = %collection, "sync-collection truncated, continuing");
            token = next;
        }

        self.fetch_missing(collection, &mut batch, missing).await?;
        batch.next_checkpoint = token;

        debug!(
            collection = %collection,
            full = batch.is_full_sync,
            updated = batch.updated.len(),
            deleted = batch.deleted.len(),
            "sync-collection complete"
        );
        Ok(batch)
    }

    /// Full listing through `addressbook-query`; yields no token
    async fn query_all(&self, collection: &Url) -> Result<RemoteContactBatch, RemoteError> {
        let reply = self
            .dav_request("REPORT", collection.clone(), "1", xml::addressbook_query())
            .await?;
        let multistatus = xml::parse_multistatus(&reply.body)?;

        let mut batch = RemoteContactBatch::new(SourceType::CardDav, true);
        let mut missing = Vec::new();
        for response in multistatus.responses {
            let href = resolve_href(&reply.url, &response.href)?;
            if is_collection_href(&href, collection) || response.status.is_some_and(|s| s >= 300) {
                continue;
            }
            absorb(&mut batch, &mut missing, href, response);
        }

        self.fetch_missing(collection, &mut batch, missing).await?;
        Ok(batch)
    }

    /// Downloads cards that were listed without `address-data`
    async fn fetch_missing(
        &self,
        collection: &Url,
        batch: &mut RemoteContactBatch,
        missing: Vec<String>,
    ) -> Result<(), RemoteError> {
        for chunk in missing.chunks(MULTIGET_CHUNK) {
            debug!(collection = %collection, count = chunk.len(), "addressbook-multiget");
            let reply = self
                .dav_request(
                    "REPORT",
                    collection.clone(),
                    "1",
                    xml::addressbook_multiget(chunk),
                )
                .await?;
            let multistatus = xml::parse_multistatus(&reply.body)?;

            for response in multistatus.responses {
                let href = resolve_href(&reply.url, &response.href)?;
                if response.status.is_some_and(|s| s >= 300) {
                    if response.status == Some(404) && !batch.is_full_sync {
                        batch.deleted.push(href);
                    }
                    continue;
                }
                let Some(data) = response.address_data.as_deref() else {
                    warn!(href = %href, "Multiget returned no address data");
                    continue;
                };
                push_card(batch, &href, response.etag.as_deref().unwrap_or_default(), data);
            }
        }
        Ok(())
    }

    /// PROPFIND on the configured URL; succeeds when the server answers
    pub async fn check_connection(&self) -> Result<(), RemoteError> {
        self.dav_request(
            "PROPFIND",
            self.base_url.clone(),
            "0",
            xml::propfind_current_user_principal(),
        )
        .await?;
        Ok(())
    }
}

/// Either parses the embedded card or queues the href for multiget
fn absorb(
    batch: &mut RemoteContactBatch,
    missing: &mut Vec<String>,
    href: String,
    response: DavResponse,
) {
    match response.address_data.as_deref() {
        Some(data) if !data.is_empty() => {
            push_card(batch, &href, response.etag.as_deref().unwrap_or_default(), data)
        }
        _ => missing.push(href),
    }
}

fn push_card(batch: &mut RemoteContactBatch, href: &str, etag: &str, data: &str) {
    let rows = contacts_from_vcard(data, href, etag);
    if rows.is_empty() && !batch.is_full_sync {
        // card lost its last address; drop whatever was stored for it
        batch.deleted.push(href.to_string());
    }
    batch.updated.extend(rows);
}

/// Resolves an href against the answering URL and returns its path
pub(crate) fn resolve_href(base: &Url, href: &str) -> Result<String, RemoteError> {
    base.join(href)
        .map(|u| u.path().to_string())
        .map_err(|e| RemoteError::InvalidResponse(format!("Bad href '{href}': {e}")))
}

/// True for the collection itself or any sub-collection
fn is_collection_href(href: &str, collection: &Url) -> bool {
    href.ends_with('/') || href.trim_end_matches('/') == collection.path().trim_end_matches('/')
}

#[async_trait::async_trait]
impl IContactProvider for CardDavClient {
    fn kind(&self) -> SourceType {
        SourceType::CardDav
    }

    async fn fetch_changes(
        &self,
        addressbook_path: &str,
        checkpoint: &str,
    ) -> anyhow::Result<RemoteContactBatch> {
        Ok(self.fetch(addressbook_path, checkpoint).await?)
    }
}

#[async_trait::async_trait]
impl ICardDavProvider for CardDavClient {
    async fn discover_addressbooks(&self) -> anyhow::Result<Vec<DiscoveredAddressbook>> {
        Ok(self.discover().await?)
    }

    async fn test_connection(&self) -> anyhow::Result<()> {
        Ok(self.check_connection().await?)
    }
}
