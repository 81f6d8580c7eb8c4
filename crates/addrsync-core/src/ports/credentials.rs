//! Credential collaborator port
//!
//! Token acquisition and refresh happen elsewhere; the sync engine only asks
//! for the current secret right before it talks to a provider.

/// Supplies secrets for remote providers
#[async_trait::async_trait]
pub trait ICredentialProvider: Send + Sync {
    /// Returns a current OAuth bearer token
    ///
    /// `owner_id` is the linked email account of the source, or the source
    /// ID when the source is not linked to an account.
    async fn access_token(&self, owner_id: &str) -> anyhow::Result<String>;

    /// Returns the CardDAV password for a source
    async fn carddav_password(&self, source_id: &str) -> anyhow::Result<String>;
}
