//! Google People API connections client
//!
//! Lists `people/me/connections` with `requestSyncToken=true`, following
//! `nextPageToken` until the last page, whose `nextSyncToken` becomes the
//! checkpoint. A stored token is sent on the first page only.
//!
//! Google reports an expired sync token either as `410 Gone` or as
//! `400` with reason `EXPIRED_SYNC_TOKEN`; both restart the listing once
//! without a token.

use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use addrsync_core::domain::{ParsedContact, SourceType};
use addrsync_core::ports::{IContactProvider, RemoteContactBatch};

use crate::http::{error_from_response, HttpSettings};
use crate::RemoteError;

/// Default base URL for the People API
pub const PEOPLE_BASE_URL: &str = "https://people.googleapis.com/v1";

/// Path for the connections listing relative to the base URL
const CONNECTIONS_PATH: &str = "/people/me/connections";

/// Fields requested on each person
const PERSON_FIELDS: &str = "names,emailAddresses";

/// Error reason Google uses for an expired sync token
const EXPIRED_SYNC_TOKEN: &str = "EXPIRED_SYNC_TOKEN";

/// Maximum page size accepted by the API
const MAX_PAGE_SIZE: u32 = 1000;

// ============================================================================
// People API response types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionsPage {
    #[serde(default)]
    connections: Vec<Person>,
    next_page_token: Option<String>,
    next_sync_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Person {
    resource_name: String,
    #[serde(default)]
    etag: Option<String>,
    #[serde(default)]
    metadata: Option<PersonMetadata>,
    #[serde(default)]
    names: Vec<PersonName>,
    #[serde(default)]
    email_addresses: Vec<PersonEmail>,
}

#[derive(Debug, Deserialize)]
struct PersonMetadata {
    #[serde(default)]
    deleted: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersonName {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    given_name: Option<String>,
    #[serde(default)]
    family_name: Option<String>,
    #[serde(default)]
    metadata: Option<FieldMetadata>,
}

#[derive(Debug, Deserialize)]
struct FieldMetadata {
    #[serde(default)]
    primary: bool,
}

#[derive(Debug, Deserialize)]
struct PersonEmail {
    #[serde(default)]
    value: Option<String>,
}

/// `{"error": {...}}` envelope of Google API errors
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    reason: Option<String>,
}

impl Person {
    /// Primary name's display form, else the first name, else given + family
    fn display_name(&self) -> String {
        let name = self
            .names
            .iter()
            .find(|n| n.metadata.as_ref().is_some_and(|m| m.primary))
            .or_else(|| self.names.first());

        let Some(name) = name else {
            return String::new();
        };
        if let Some(display) = name.display_name.as_deref().filter(|d| !d.trim().is_empty()) {
            return display.trim().to_string();
        }
        [name.given_name.as_deref(), name.family_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn is_deleted(&self) -> bool {
        self.metadata.as_ref().is_some_and(|m| m.deleted)
    }
}

// ============================================================================
// GoogleContactsClient
// ============================================================================

/// Google People API client for one bearer token
pub struct GoogleContactsClient {
    http: Client,
    base_url: String,
    access_token: String,
    page_size: u32,
}

impl GoogleContactsClient {
    /// Creates a client against the public People API endpoint
    pub fn new(access_token: impl Into<String>) -> Result<Self, RemoteError> {
        Self::with_base_url(access_token, PEOPLE_BASE_URL, &HttpSettings::default())
    }

    /// Creates a client with a custom base URL (useful for testing)
    pub fn with_base_url(
        access_token: impl Into<String>,
        base_url: impl Into<String>,
        settings: &HttpSettings,
    ) -> Result<Self, RemoteError> {
        Ok(Self::with_client(
            settings.rest_client()?,
            access_token,
            base_url,
        ))
    }

    /// Creates a client reusing an existing HTTP client
    pub fn with_client(
        http: Client,
        access_token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            page_size: MAX_PAGE_SIZE,
        }
    }

    /// Sets the number of connections requested per page (1..=1000)
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Fetches changes since `sync_token`, or everything when it is empty
    ///
    /// An expired token triggers exactly one full-sync retry.
    pub async fn fetch(&self, sync_token: &str) -> Result<RemoteContactBatch, RemoteError> {
        match self.fetch_all(sync_token).await {
            Err(RemoteError::CheckpointExpired(reason)) if !sync_token.is_empty() => {
                warn!(reason = %reason, "Sync token expired, restarting with a full sync");
                self.fetch_all("").await
            }
            other => other,
        }
    }

    async fn fetch_all(&self, sync_token: &str) -> Result<RemoteContactBatch, RemoteError> {
        let is_full_sync = sync_token.is_empty();
        let mut batch = RemoteContactBatch::new(SourceType::Google, is_full_sync);
        let mut page_token: Option<String> = None;
        let mut page_count: u32 = 0;

        debug!(full = is_full_sync, "Starting connections listing");

        loop {
            page_count += 1;
            let token_for_page = (page_count == 1 && !is_full_sync).then_some(sync_token);
            let page = self.get_page(token_for_page, page_token.as_deref()).await?;

            debug!(
                page = page_count,
                items = page.connections.len(),
                has_next = page.next_page_token.is_some(),
                "Received connections page"
            );

            for person in page.connections {
                apply_person(&mut batch, person);
            }

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => {
                    batch.next_checkpoint = page.next_sync_token.unwrap_or_default();
                    break;
                }
            }
        }

        if batch.next_checkpoint.is_empty() {
            warn!("Connections listing completed without a sync token; next sync will be full");
        }

        debug!(
            pages = page_count,
            updated = batch.updated.len(),
            deleted = batch.deleted.len(),
            "Connections listing complete"
        );
        Ok(batch)
    }

    async fn get_page(
        &self,
        sync_token: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<ConnectionsPage, RemoteError> {
        let page_size = self.page_size.to_string();
        let mut query: Vec<(&str, &str)> = vec![
            ("personFields", PERSON_FIELDS),
            ("pageSize", page_size.as_str()),
            ("requestSyncToken", "true"),
        ];
        if let Some(token) = sync_token {
            query.push(("syncToken", token));
        }
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        let response = self
            .http
            .get(format!("{}{CONNECTIONS_PATH}", self.base_url))
            .bearer_auth(&self.access_token)
            .query(&query)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(classify_error(response, sync_token.is_some()).await);
        }

        response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(format!("Failed to parse connections: {e}")))
    }
}

/// Maps a failed response, recognising expired sync tokens
async fn classify_error(response: Response, sent_sync_token: bool) -> RemoteError {
    let status = response.status();
    if !sent_sync_token || !(status == StatusCode::GONE || status == StatusCode::BAD_REQUEST) {
        return error_from_response(response).await;
    }
    if status == StatusCode::GONE {
        return RemoteError::CheckpointExpired("sync token rejected with 410 Gone".into());
    }

    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope)
            if envelope
                .error
                .details
                .iter()
                .any(|d| d.reason.as_deref() == Some(EXPIRED_SYNC_TOKEN)) =>
        {
            RemoteError::CheckpointExpired(envelope.error.message)
        }
        _ if body.contains(EXPIRED_SYNC_TOKEN) => {
            RemoteError::CheckpointExpired("sync token expired".into())
        }
        _ => RemoteError::Http {
            status: status.as_u16(),
            body,
        },
    }
}

/// Folds one person into the batch
fn apply_person(batch: &mut RemoteContactBatch, person: Person) {
    if person.is_deleted() {
        batch.deleted.push(person.resource_name);
        return;
    }

    let name = person.display_name();
    let etag = person.etag.clone().unwrap_or_default();
    let mut rows: Vec<ParsedContact> = Vec::new();
    for address in person.email_addresses.iter().filter_map(|e| e.value.as_deref()) {
        let row = ParsedContact::new(person.resource_name.as_str(), etag.as_str(), address, name.clone());
        if row.is_storable() && !rows.iter().any(|r| r.email == row.email) {
            rows.push(row);
        }
    }

    if rows.is_empty() && !batch.is_full_sync {
        batch.deleted.push(person.resource_name);
    }
    batch.updated.extend(rows);
}

#[async_trait::async_trait]
impl IContactProvider for GoogleContactsClient {
    fn kind(&self) -> SourceType {
        SourceType::Google
    }

    async fn fetch_changes(
        &self,
        _addressbook_path: &str,
        checkpoint: &str,
    ) -> anyhow::Result<RemoteContactBatch> {
        Ok(self.fetch(checkpoint).await?)
    }
}
