//! Microsoft Graph contacts delta client
//!
//! ## Delta Query Flow
//!
//! 1. **Full sync**: `GET /me/contacts/delta` without a token
//! 2. **Follow pages**: `@odata.nextLink` URLs are followed verbatim
//! 3. **Checkpoint**: the final page's `@odata.deltaLink` is stored as-is
//! 4. **Incremental sync**: the stored delta link is requested verbatim
//!
//! A 404 or 410 on a stored delta link means the link is no longer valid;
//! the client then restarts once without it.

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use addrsync_core::domain::{ParsedContact, SourceType};
use addrsync_core::ports::{IContactProvider, RemoteContactBatch};

use crate::http::{check_status, HttpSettings};
use crate::RemoteError;

/// Default base URL for Microsoft Graph v1.0
pub const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Path for the contacts delta endpoint relative to the base URL
const DELTA_PATH: &str = "/me/contacts/delta";

// ============================================================================
// Graph API response types
// ============================================================================

/// One page of `/me/contacts/delta`
#[derive(Debug, Deserialize)]
struct GraphContactsPage {
    #[serde(default)]
    value: Vec<GraphContact>,

    /// URL for the next page (present when more pages exist)
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,

    /// Checkpoint for the next sync (last page only)
    #[serde(rename = "@odata.deltaLink")]
    delta_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphContact {
    id: String,

    #[serde(default)]
    display_name: Option<String>,

    #[serde(default)]
    email_addresses: Vec<GraphEmailAddress>,

    /// Present when the contact was removed since the delta link
    #[serde(rename = "@removed")]
    removed: Option<GraphRemoved>,
}

#[derive(Debug, Deserialize)]
struct GraphEmailAddress {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphRemoved {
    #[serde(default)]
    reason: Option<String>,
}

// ============================================================================
// MicrosoftContactsClient
// ============================================================================

/// Microsoft Graph contacts client for one bearer token
pub struct MicrosoftContactsClient {
    http: Client,
    base_url: String,
    access_token: String,
}

impl MicrosoftContactsClient {
    /// Creates a client against the public Graph endpoint
    pub fn new(access_token: impl Into<String>) -> Result<Self, RemoteError> {
        Self::with_base_url(access_token, GRAPH_BASE_URL, &HttpSettings::default())
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
        }
    }

    /// Fetches changes since `delta_link`, or everything when it is empty
    ///
    /// An expired delta link triggers exactly one full-sync retry.
    pub async fn fetch(&self, delta_link: &str) -> Result<RemoteContactBatch, RemoteError> {
        match self.fetch_all(delta_link).await {
            Err(RemoteError::CheckpointExpired(reason)) if !delta_link.is_empty() => {
                warn!(reason = %reason, "Delta link expired, restarting with a full sync");
                self.fetch_all("").await
            }
            other => other,
        }
    }

    async fn fetch_all(&self, delta_link: &str) -> Result<RemoteContactBatch, RemoteError> {
        let is_full_sync = delta_link.is_empty();
        let mut batch = RemoteContactBatch::new(SourceType::Microsoft, is_full_sync);

        let mut url = if is_full_sync {
            format!("{}{DELTA_PATH}", self.base_url)
        } else {
            delta_link.to_string()
        };

        debug!(full = is_full_sync, "Starting contacts delta query");

        let mut page_count: u32 = 0;
        loop {
            page_count += 1;
            let page = self.get_page(&url, !is_full_sync).await?;
            debug!(
                page = page_count,
                items = page.value.len(),
                has_next = page.next_link.is_some(),
                "Received contacts delta page"
            );

            for contact in page.value {
                apply_contact(&mut batch, contact);
            }

            match (page.next_link, page.delta_link) {
                (Some(next), _) => url = next,
                (None, Some(delta)) => {
                    batch.next_checkpoint = delta;
                    break;
                }
                (None, None) => {
                    warn!("Contacts delta completed without a deltaLink; next sync will be full");
                    break;
                }
            }
        }

        debug!(
            pages = page_count,
            updated = batch.updated.len(),
            deleted = batch.deleted.len(),
            "Contacts delta complete"
        );
        Ok(batch)
    }

    async fn get_page(&self, url: &str, incremental: bool) -> Result<GraphContactsPage, RemoteError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        // 404/410 before the generic mapping: the delta link is stale
        let status = response.status();
        if incremental && (status == StatusCode::GONE || status == StatusCode::NOT_FOUND) {
            return Err(RemoteError::CheckpointExpired(format!(
                "delta link rejected with {status}"
            )));
        }

        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(format!("Failed to parse contacts delta: {e}")))
    }
}

/// Folds one delta entry into the batch
fn apply_contact(batch: &mut RemoteContactBatch, contact: GraphContact) {
    if let Some(removed) = contact.removed {
        debug!(id = %contact.id, reason = ?removed.reason, "Contact removed");
        batch.deleted.push(contact.id);
        return;
    }

    let contact_name = contact.display_name.unwrap_or_default();
    let mut rows: Vec<ParsedContact> = Vec::new();
    for entry in contact.email_addresses {
        let Some(address) = entry.address else {
            continue;
        };
        let name = if contact_name.trim().is_empty() {
            entry.name.unwrap_or_default()
        } else {
            contact_name.clone()
        };
        let row = ParsedContact::new(contact.id.as_str(), "", &address, name);
        if row.is_storable() && !rows.iter().any(|r| r.email == row.email) {
            rows.push(row);
        }
    }

    if rows.is_empty() && !batch.is_full_sync {
        batch.deleted.push(contact.id);
    }
    batch.updated.extend(rows);
}

#[async_trait::async_trait]
impl IContactProvider for MicrosoftContactsClient {
    fn kind(&self) -> SourceType {
        SourceType::Microsoft
    }

    async fn fetch_changes(
        &self,
        _addressbook_path: &str,
        checkpoint: &str,
    ) -> anyhow::Result<RemoteContactBatch> {
        Ok(self.fetch(checkpoint).await?)
    }
}
