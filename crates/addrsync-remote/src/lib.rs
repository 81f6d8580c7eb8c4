//! addrsync Remote - Contact protocol clients
//!
//! Provides async clients that turn a stored checkpoint into a
//! [`RemoteContactBatch`](addrsync_core::ports::RemoteContactBatch):
//! - CardDAV (RFC 6352) with `sync-collection` (RFC 6578) and fallbacks
//! - Google People API `people.connections.list` with sync tokens
//! - Microsoft Graph `/me/contacts/delta`
//!
//! ## Modules
//!
//! - [`carddav`] - WebDAV discovery, incremental sync and multistatus parsing
//! - [`google`] - Google People API client
//! - [`microsoft`] - Microsoft Graph contacts client
//! - [`http`] - Shared HTTP client construction and status mapping
//! - [`factory`] - [`IProviderFactory`](addrsync_core::ports::IProviderFactory) implementation

pub mod carddav;
pub mod factory;
pub mod google;
pub mod http;
pub mod microsoft;

pub use carddav::CardDavClient;
pub use factory::ProviderFactory;
pub use google::GoogleContactsClient;
pub use microsoft::MicrosoftContactsClient;

use thiserror::Error;

/// Errors that can occur when talking to a contact provider
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Credentials were rejected (401/403)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The stored sync token or delta link is no longer accepted
    #[error("Checkpoint expired: {0}")]
    CheckpointExpired(String),

    /// Any other non-success status
    #[error("HTTP {status}: {body}")]
    Http {
        /// Response status code
        status: u16,
        /// Response body, truncated
        body: String,
    },

    /// A network-level error occurred
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The response could not be parsed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// No addressbook collection could be located
    #[error("Discovery failed: {0}")]
    Discovery(String),

    /// Client construction failed (bad URL, redirect loop, ...)
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl RemoteError {
    /// Returns true when retrying with the same credentials cannot succeed
    pub fn is_auth(&self) -> bool {
        matches!(self, RemoteError::Unauthorized(_))
    }
}
