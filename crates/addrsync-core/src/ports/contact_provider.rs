//! Remote contact provider ports
//!
//! Every protocol client returns the same [`RemoteContactBatch`], so callers
//! never branch on the provider beyond picking a client.
//!
//! ## Design Notes
//!
//! - Checkpoints are opaque strings; an empty checkpoint requests a full sync.
//! - Clients recover from expired checkpoints themselves (one full-sync
//!   retry) and report it through `is_full_sync`.

use serde::{Deserialize, Serialize};

use crate::domain::{DiscoveredAddressbook, ParsedContact, SourceType};

/// Changes returned by one provider call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteContactBatch {
    /// Provider that produced the batch
    pub provider: SourceType,
    /// New or changed rows, one per email address
    pub updated: Vec<ParsedContact>,
    /// Hrefs / resource ids removed since the checkpoint
    pub deleted: Vec<String>,
    /// Checkpoint to store after the batch is applied; may be empty
    pub next_checkpoint: String,
    /// When true, `updated` is the complete contact set of the addressbook
    pub is_full_sync: bool,
}

impl RemoteContactBatch {
    /// Creates an empty batch
    pub fn new(provider: SourceType, is_full_sync: bool) -> Self {
        Self {
            provider,
            updated: Vec::new(),
            deleted: Vec::new(),
            next_checkpoint: String::new(),
            is_full_sync,
        }
    }

    /// Number of distinct hrefs among updated rows
    pub fn updated_records(&self) -> usize {
        let mut hrefs: Vec<&str> = self.updated.iter().map(|c| c.href.as_str()).collect();
        hrefs.sort_unstable();
        hrefs.dedup();
        hrefs.len()
    }
}

/// A remote contact protocol
#[async_trait::async_trait]
pub trait IContactProvider: Send + Sync {
    /// Which provider this client speaks to
    fn kind(&self) -> SourceType;

    /// Exchanges a checkpoint for changes
    ///
    /// # Arguments
    /// * `addressbook_path` - Collection path (CardDAV) or `"/"` (OAuth)
    /// * `checkpoint` - Stored sync token or delta link; empty for a full sync
    async fn fetch_changes(
        &self,
        addressbook_path: &str,
        checkpoint: &str,
    ) -> anyhow::Result<RemoteContactBatch>;
}

/// CardDAV-specific operations on top of [`IContactProvider`]
#[async_trait::async_trait]
pub trait ICardDavProvider: IContactProvider {
    /// Finds the addressbook collections of the authenticated principal
    async fn discover_addressbooks(&self) -> anyhow::Result<Vec<DiscoveredAddressbook>>;

    /// Verifies that the server is reachable and accepts the credentials
    async fn test_connection(&self) -> anyhow::Result<()>;
}

/// Builds protocol clients
pub trait IProviderFactory: Send + Sync {
    /// CardDAV client with HTTP Basic credentials
    fn carddav(
        &self,
        url: &str,
        username: &str,
        password: &str,
    ) -> anyhow::Result<std::sync::Arc<dyn ICardDavProvider>>;

    /// Google People client with a bearer token
    fn google(&self, access_token: &str) -> anyhow::Result<std::sync::Arc<dyn IContactProvider>>;

    /// Microsoft Graph client with a bearer token
    fn microsoft(&self, access_token: &str)
        -> anyhow::Result<std::sync::Arc<dyn IContactProvider>>;
}
