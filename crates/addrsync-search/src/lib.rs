//! addrsync Search - Recipient autocomplete
//!
//! Provides:
//! - Fan-out of a query to the send history and every registered searcher
//! - A TTL-cached index of local vCard files
//! - Deduplication and ranking of the combined results
//!
//! ## Modules
//!
//! - [`service`] - [`AutocompleteService`]
//! - [`vcard_cache`] - [`VCardCache`], an `IContactSearcher` over `.vcf` files
//! - [`merge`] - [`merge_results`]
//!
//! Searchers are injected at construction, so this crate never depends on
//! the store or the protocol clients directly.

pub mod merge;
pub mod service;
pub mod vcard_cache;

pub use merge::merge_results;
pub use service::AutocompleteService;
pub use vcard_cache::{VCardCache, VCardEntry};

use thiserror::Error;

/// Errors returned by the autocomplete service
#[derive(Debug, Error)]
pub enum SearchError {
    /// The address given to record or forget is malformed
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    /// The send-history store failed
    #[error("Store error: {0}")]
    Store(String),

    /// Scanning vCard directories failed
    #[error("vCard scan failed: {0}")]
    Scan(String),
}
