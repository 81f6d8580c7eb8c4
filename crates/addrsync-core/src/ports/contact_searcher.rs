//! Autocomplete backend ports

use crate::domain::{ContactSuggestion, LocalContact};

/// A backend that can answer an autocomplete query
///
/// Implementations are registered with the autocomplete service at
/// construction time.
#[async_trait::async_trait]
pub trait IContactSearcher: Send + Sync {
    /// Short label used in logs
    fn name(&self) -> &str;

    /// Returns up to `limit` suggestions whose email or name contains `query`
    async fn search(&self, query: &str, limit: usize) -> anyhow::Result<Vec<ContactSuggestion>>;
}

/// Recipients learned from outgoing mail
#[async_trait::async_trait]
pub trait ILocalContactStore: Send + Sync {
    /// Upserts a recipient, incrementing `send_count` and setting `last_used` to now
    ///
    /// A non-empty `display_name` replaces the stored one.
    async fn record_sent(&self, email: &str, display_name: &str) -> anyhow::Result<LocalContact>;

    /// Matches email or display name, ordered by `send_count DESC, last_used DESC`
    async fn search(&self, query: &str, limit: usize) -> anyhow::Result<Vec<LocalContact>>;

    /// Removes a recipient; returns false if it was not present
    async fn delete(&self, email: &str) -> anyhow::Result<bool>;

    /// Lists all recipients in ranking order
    async fn list(&self) -> anyhow::Result<Vec<LocalContact>>;
}
