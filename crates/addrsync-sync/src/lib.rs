//! addrsync Sync - Contact sync orchestrator
//!
//! Provides:
//! - Per-source sync dispatch (CardDAV discovery + per-addressbook sync, OAuth virtual addressbook)
//! - Full vs incremental strategy driven by the provider's batch
//! - Bounded retry of store writes on busy/locked errors
//! - Per-source serialization and cooperative cancellation
//!
//! ## Modules
//!
//! - [`engine`] - [`SyncOrchestrator`] and its reports
//! - [`lock`] - Keyed per-source mutex
//! - [`retry`] - Exponential backoff for store contention

pub mod engine;
pub mod lock;
pub mod retry;

pub use engine::{AddressbookReport, SyncOrchestrator, SyncReport, SyncSettings};
pub use lock::{SourceGuard, SourceLocks};
pub use retry::{is_busy_error, with_retry, RetryPolicy};

use addrsync_core::domain::SourceId;
use thiserror::Error;

/// Errors returned by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// No source with this ID exists
    #[error("Source not found: {0}")]
    SourceNotFound(SourceId),

    /// The source configuration is incomplete; sync was not attempted
    #[error("Invalid source configuration: {0}")]
    Configuration(String),

    /// The credential collaborator could not supply a secret
    #[error("Credentials unavailable: {0}")]
    Credentials(String),

    /// The remote provider failed (network, protocol, authorization)
    #[error("Provider error: {0}")]
    Provider(String),

    /// A store operation failed, possibly after exhausting retries
    #[error("Store error: {0}")]
    Store(String),

    /// The caller cancelled the sync before results were written
    #[error("Sync cancelled")]
    Cancelled,

    /// Some addressbooks or sources failed while others succeeded
    #[error("{} sync failure(s): {}", .failures.len(), .failures.join("; "))]
    Partial {
        /// One message per failed addressbook or source
        failures: Vec<String>,
    },
}

impl SyncError {
    pub(crate) fn store(err: anyhow::Error) -> Self {
        SyncError::Store(format!("{err:#}"))
    }

    pub(crate) fn provider(err: anyhow::Error) -> Self {
        SyncError::Provider(format!("{err:#}"))
    }

    pub(crate) fn credentials(err: anyhow::Error) -> Self {
        SyncError::Credentials(format!("{err:#}"))
    }
}
