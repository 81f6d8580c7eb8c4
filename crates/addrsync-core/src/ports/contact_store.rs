//! Contact store port (driven/secondary port)
//!
//! Persistence of sources, addressbooks and synced contacts.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific.
//!   A busy/locked database must stay recognizable in the error chain
//!   (its message contains "database is locked") so callers can retry.
//! - Password material never passes through this port.

use serde::{Deserialize, Serialize};

use crate::domain::{
    Addressbook, AddressbookId, ContactSource, ParsedContact, SourceId, SyncedContact,
};

/// Outcome of a best-effort bulk write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Rows written
    pub written: usize,
    /// Rows logged and skipped (empty email/href or a failing statement)
    pub skipped: usize,
}

impl std::ops::AddAssign for BatchReport {
    fn add_assign(&mut self, rhs: Self) {
        self.written += rhs.written;
        self.skipped += rhs.skipped;
    }
}

/// Port trait for the contact source store
#[async_trait::async_trait]
pub trait IContactStore: Send + Sync {
    // --- Source operations ---

    /// Validates and inserts a new source
    async fn create_source(&self, source: &ContactSource) -> anyhow::Result<()>;

    /// Validates and updates an existing source's configuration
    async fn update_source(&self, source: &ContactSource) -> anyhow::Result<()>;

    /// Retrieves a source by ID
    async fn get_source(&self, id: &SourceId) -> anyhow::Result<Option<ContactSource>>;

    /// Lists all sources ordered by name
    async fn list_sources(&self) -> anyhow::Result<Vec<ContactSource>>;

    /// Deletes a source with its addressbooks and contacts
    ///
    /// Returns false if the source did not exist.
    async fn delete_source(&self, id: &SourceId) -> anyhow::Result<bool>;

    /// Sources whose last sync failed
    async fn list_source_errors(&self) -> anyhow::Result<Vec<ContactSource>>;

    /// Records the outcome of a sync
    ///
    /// An empty `error` clears the error fields and sets `last_synced_at` to
    /// now. A non-empty `error` sets the error fields and leaves
    /// `last_synced_at` untouched.
    async fn update_source_sync_status(&self, id: &SourceId, error: &str) -> anyhow::Result<()>;

    // --- Addressbook operations ---

    /// Registers a discovered collection, keeping any stored sync token
    async fn upsert_addressbook(
        &self,
        source_id: &SourceId,
        path: &str,
        display_name: &str,
    ) -> anyhow::Result<Addressbook>;

    /// Returns the addressbook at `path`, creating it with an empty token if missing
    async fn get_or_create_addressbook(
        &self,
        source_id: &SourceId,
        path: &str,
        display_name: &str,
    ) -> anyhow::Result<Addressbook>;

    /// Lists the addressbooks of a source ordered by path
    async fn list_addressbooks(&self, source_id: &SourceId) -> anyhow::Result<Vec<Addressbook>>;

    /// Deletes addressbooks of a source whose path is not in `keep_paths`
    ///
    /// Returns the number of addressbooks removed.
    async fn prune_addressbooks(
        &self,
        source_id: &SourceId,
        keep_paths: &[String],
    ) -> anyhow::Result<u64>;

    /// Stores a new checkpoint and marks the addressbook as synced
    async fn update_addressbook_sync_token(
        &self,
        id: AddressbookId,
        token: &str,
    ) -> anyhow::Result<()>;

    // --- Contact operations ---

    /// Inserts or replaces rows by `(href, email)` in one transaction
    ///
    /// All existing rows for each href in the batch are replaced, so an
    /// address removed from a remote record disappears locally.
    async fn upsert_contacts_batch(
        &self,
        addressbook_id: AddressbookId,
        contacts: &[ParsedContact],
    ) -> anyhow::Result<BatchReport>;

    /// Deletes rows whose href is in `hrefs`; returns the number of rows removed
    async fn delete_contacts_by_hrefs(
        &self,
        addressbook_id: AddressbookId,
        hrefs: &[String],
    ) -> anyhow::Result<u64>;

    /// Deletes every row of an addressbook
    async fn delete_contacts_for_addressbook(
        &self,
        addressbook_id: AddressbookId,
    ) -> anyhow::Result<u64>;

    /// Replaces the whole contact set of an addressbook in one transaction
    async fn replace_addressbook_contacts(
        &self,
        addressbook_id: AddressbookId,
        contacts: &[ParsedContact],
    ) -> anyhow::Result<BatchReport>;

    /// Lists rows of an addressbook ordered by email
    async fn list_contacts(&self, addressbook_id: AddressbookId)
        -> anyhow::Result<Vec<SyncedContact>>;
}
